//! hoc IR - bytecode for the hoc interpreter
//!
//! This crate holds everything that describes a procedure body independently
//! of the machine that runs it:
//! - `SymbolId`, `TemplateId` and `ObjectId` arena indices
//! - the opcode table (`Opcode`), generated once with each opcode's operand
//!   signature
//! - `Inst` words, `Code` bodies and the `CodeBuilder` used by front ends
//! - `validate`, the well-formedness pass run before first execution
//! - the `(opcode-id, operands...)` encoding used by checkpoint writers and
//!   the CLI image format
//! - a digest of the opcode table for build compatibility checks
//!
//! # Relative offsets
//!
//! A `Rel(n)` operand stored at word `p` targets word `p + n`. Bodies, loop
//! conditions and branch arms are each terminated by an `Inst::Stop` word.

mod code;
mod digest;
mod encode;
mod error;
mod ids;
mod opcode;
mod validate;

pub use code::{CachedMember, Code, CodeBuilder, Inst, Label, MemberCache};
pub use digest::{opcode_table_digest, DigestBuilder, TableDigest};
pub use encode::{decode_body, encode_body, EncodedBody, EncodedWord};
pub use error::CodeError;
pub use ids::{ObjectId, SymbolId, TemplateId};
pub use opcode::{ComponentFlags, Opcode, OperandKind};
pub use validate::validate;
