//! Errors for malformed or foreign bytecode.

use thiserror::Error;

/// A structural problem found in a body or its encoded form.
///
/// Positions are word indices into the body being checked.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("empty code body")]
    Empty,
    #[error("word {pos}: expected an opcode")]
    ExpectedOpcode { pos: usize },
    #[error("word {pos}: {opcode} expects a {expected} operand")]
    OperandKind {
        pos: usize,
        opcode: &'static str,
        expected: char,
    },
    #[error("word {pos}: expected a {expected} operand")]
    BadOperand { pos: usize, expected: char },
    #[error("word {pos}: {opcode} is truncated")]
    Truncated { pos: usize, opcode: &'static str },
    #[error("word {pos}: symbol {raw} is out of range ({count} symbols)")]
    SymbolOutOfRange { pos: usize, raw: u32, count: usize },
    #[error("word {pos}: jump to {target} leaves the body (length {len})")]
    JumpOutOfRange { pos: usize, target: i64, len: usize },
    #[error("word {pos}: jump target {target} is not the start of an instruction")]
    JumpIntoOperand { pos: usize, target: usize },
    #[error("body does not end with a stop word")]
    MissingStop,
    #[error("unknown opcode id {id}")]
    UnknownOpcode { id: u16 },
    #[error("encoded symbol index {index} has no entry in the symbol table")]
    UnknownSymbolIndex { index: u32 },
    #[error("label used before it was bound")]
    UnboundLabel,
    #[error("image format: {0}")]
    Image(String),
}
