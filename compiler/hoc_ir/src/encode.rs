//! `(opcode-id, operand...)` encoding of bodies.
//!
//! The encoder walks a body using only the opcode signatures, so any consumer
//! holding the same opcode table can read it back. Symbol operands are
//! translated through caller-supplied maps: checkpoint writers map symbols to
//! their traversal ids, the image format maps them to names. Member caches are
//! runtime state and are written as empty slots.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{Code, CodeError, Inst, Opcode, OperandKind, SymbolId};

/// One encoded word.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodedWord {
    Op(u16),
    Sym(u32),
    Int(i32),
    Rel(i32),
    Cache,
    Stop,
}

/// Encode `code`, mapping each symbol operand through `map_symbol`.
pub fn encode_body<F>(code: &Code, mut map_symbol: F) -> Result<Vec<EncodedWord>, CodeError>
where
    F: FnMut(SymbolId) -> Result<u32, CodeError>,
{
    let words = code.words();
    let mut out = Vec::with_capacity(words.len());
    let mut pos = 0;
    while pos < words.len() {
        let op = match &words[pos] {
            Inst::Stop => {
                out.push(EncodedWord::Stop);
                pos += 1;
                continue;
            }
            Inst::Op(op) => *op,
            _ => return Err(CodeError::ExpectedOpcode { pos }),
        };
        out.push(EncodedWord::Op(op.id()));
        for (k, kind) in op.operands().enumerate() {
            let at = pos + 1 + k;
            let word = match kind {
                OperandKind::Symbol => EncodedWord::Sym(map_symbol(code.symbol_at(at)?)?),
                OperandKind::Int => EncodedWord::Int(code.int_at(at)?),
                OperandKind::Rel => match code.get(at) {
                    Some(Inst::Rel(offset)) => EncodedWord::Rel(*offset),
                    _ => return Err(CodeError::BadOperand { pos: at, expected: 'r' }),
                },
                OperandKind::Cache => {
                    code.cache_at(at)?;
                    EncodedWord::Cache
                }
            };
            out.push(word);
        }
        pos += 1 + op.arity();
    }
    Ok(out)
}

/// Decode words produced by [`encode_body`], resolving symbols with `resolve`.
pub fn decode_body<F>(words: &[EncodedWord], mut resolve: F) -> Result<Code, CodeError>
where
    F: FnMut(u32) -> Result<SymbolId, CodeError>,
{
    let mut out = Vec::with_capacity(words.len());
    let mut pos = 0;
    while pos < words.len() {
        let op = match &words[pos] {
            EncodedWord::Stop => {
                out.push(Inst::Stop);
                pos += 1;
                continue;
            }
            EncodedWord::Op(id) => Opcode::from_id(*id).ok_or(CodeError::UnknownOpcode { id: *id })?,
            _ => return Err(CodeError::ExpectedOpcode { pos }),
        };
        out.push(Inst::Op(op));
        for (k, kind) in op.operands().enumerate() {
            let at = pos + 1 + k;
            let word = words.get(at).ok_or(CodeError::Truncated {
                pos,
                opcode: op.name(),
            })?;
            let inst = match (kind, word) {
                (OperandKind::Symbol, EncodedWord::Sym(raw)) => Inst::Sym(resolve(*raw)?),
                (OperandKind::Int, EncodedWord::Int(value)) => Inst::Int(*value),
                (OperandKind::Rel, EncodedWord::Rel(offset)) => Inst::Rel(*offset),
                (OperandKind::Cache, EncodedWord::Cache) => Inst::Cache(crate::MemberCache::new()),
                _ => {
                    return Err(CodeError::OperandKind {
                        pos: at,
                        opcode: op.name(),
                        expected: kind.as_char(),
                    })
                }
            };
            out.push(inst);
        }
        pos += 1 + op.arity();
    }
    Ok(Code::from_words(out))
}

/// A self-describing body: symbol operands refer to entries of `symbols` by
/// position, and `table_digest` names the opcode table it was written with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBody {
    pub table_digest: String,
    pub symbols: Vec<String>,
    pub words: Vec<EncodedWord>,
}

impl EncodedBody {
    /// Encode `code`, naming each symbol operand with `name_of`.
    pub fn from_code<F>(code: &Code, mut name_of: F) -> Result<Self, CodeError>
    where
        F: FnMut(SymbolId) -> Option<String>,
    {
        let mut symbols = Vec::new();
        let mut index: FxHashMap<SymbolId, u32> = FxHashMap::default();
        let words = encode_body(code, |sym| {
            if let Some(&slot) = index.get(&sym) {
                return Ok(slot);
            }
            let name = name_of(sym).ok_or(CodeError::UnknownSymbolIndex { index: sym.raw() })?;
            let slot = u32::try_from(symbols.len())
                .map_err(|_| CodeError::Image("too many symbols".to_string()))?;
            symbols.push(name);
            index.insert(sym, slot);
            Ok(slot)
        })?;
        Ok(EncodedBody {
            table_digest: crate::opcode_table_digest().to_string(),
            symbols,
            words,
        })
    }

    /// Decode back into a body, resolving each symbol name with `resolve`.
    ///
    /// Fails if the body was written with a different opcode table.
    pub fn to_code<F>(&self, mut resolve: F) -> Result<Code, CodeError>
    where
        F: FnMut(&str) -> Result<SymbolId, CodeError>,
    {
        let expected = crate::opcode_table_digest().to_string();
        if self.table_digest != expected {
            return Err(CodeError::Image(format!(
                "opcode table mismatch: image {}, engine {expected}",
                self.table_digest
            )));
        }
        let mut resolved: Vec<Option<SymbolId>> = vec![None; self.symbols.len()];
        decode_body(&self.words, |raw| {
            let slot = usize::try_from(raw).unwrap_or(usize::MAX);
            let name = self
                .symbols
                .get(slot)
                .ok_or(CodeError::UnknownSymbolIndex { index: raw })?;
            if let Some(Some(sym)) = resolved.get(slot) {
                return Ok(*sym);
            }
            let sym = resolve(name)?;
            resolved[slot] = Some(sym);
            Ok(sym)
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodeError> {
        bincode::serialize(self).map_err(|e| CodeError::Image(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodeError> {
        bincode::deserialize(bytes).map_err(|e| CodeError::Image(e.to_string()))
    }
}
