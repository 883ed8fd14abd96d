//! Well-formedness check for bodies from outside the interpreter.
//!
//! A body is a flat sequence of instructions and `Stop` words. Checking it
//! once before first execution means the engine never meets a truncated
//! instruction, a symbol id outside the arena, or a jump into the middle of
//! another instruction's operands.

use crate::{Code, CodeError, Inst, Opcode, OperandKind};

/// Validate `code` against the opcode table.
///
/// `symbol_count` is the size of the symbol arena the body will run against;
/// every symbol operand must index into it.
pub fn validate(code: &Code, symbol_count: usize) -> Result<(), CodeError> {
    let words = code.words();
    if words.is_empty() {
        return Err(CodeError::Empty);
    }

    let mut starts = vec![false; words.len()];
    let mut jumps = Vec::new();
    let mut pos = 0;
    while pos < words.len() {
        starts[pos] = true;
        let op = match &words[pos] {
            Inst::Stop => {
                pos += 1;
                continue;
            }
            Inst::Op(op) => *op,
            _ => return Err(CodeError::ExpectedOpcode { pos }),
        };
        for (k, kind) in op.operands().enumerate() {
            let at = pos + 1 + k;
            let word = words.get(at).ok_or(CodeError::Truncated {
                pos,
                opcode: op.name(),
            })?;
            check_operand(op, at, kind, word, symbol_count)?;
            if let Inst::Rel(offset) = word {
                if *offset != 0 || !is_optional_target(op, k) {
                    jumps.push((at, *offset));
                }
            }
        }
        pos += 1 + op.arity();
    }

    if !words.last().is_some_and(Inst::is_stop) {
        return Err(CodeError::MissingStop);
    }

    for (at, offset) in jumps {
        let target = i64::try_from(at).unwrap_or(i64::MAX) + i64::from(offset);
        let index = usize::try_from(target)
            .ok()
            .filter(|t| *t < words.len())
            .ok_or(CodeError::JumpOutOfRange {
                pos: at,
                target,
                len: words.len(),
            })?;
        if !starts[index] {
            return Err(CodeError::JumpIntoOperand {
                pos: at,
                target: index,
            });
        }
    }
    Ok(())
}

fn check_operand(
    op: Opcode,
    at: usize,
    kind: OperandKind,
    word: &Inst,
    symbol_count: usize,
) -> Result<(), CodeError> {
    let matches = match (kind, word) {
        (OperandKind::Symbol, Inst::Sym(sym)) => {
            if sym.index() >= symbol_count {
                return Err(CodeError::SymbolOutOfRange {
                    pos: at,
                    raw: sym.raw(),
                    count: symbol_count,
                });
            }
            true
        }
        (OperandKind::Int, Inst::Int(_))
        | (OperandKind::Rel, Inst::Rel(_))
        | (OperandKind::Cache, Inst::Cache(_)) => true,
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(CodeError::OperandKind {
            pos: at,
            opcode: op.name(),
            expected: kind.as_char(),
        })
    }
}

/// Relative operands where a zero offset means "absent".
fn is_optional_target(op: Opcode, operand: usize) -> bool {
    matches!((op, operand), (Opcode::If, 1) | (Opcode::For, 2))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
mod tests;
