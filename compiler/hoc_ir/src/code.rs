//! Bytecode words, bodies and the builder used by front ends.

use std::cell::Cell;

use crate::{CodeError, Opcode, SymbolId, TemplateId};

/// The resolved member for the last template seen at a dispatch site.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CachedMember {
    pub template: TemplateId,
    pub member: SymbolId,
}

/// Per-site cache for `ObjectComponent` and `ObjectIter`.
///
/// Interior mutability lets the engine update the cache while the body is
/// shared through an `Rc`. A stale entry is harmless: the engine compares the
/// cached template with the live object's template before trusting it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberCache(Cell<Option<CachedMember>>);

impl MemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached member if it was resolved for `template`.
    #[inline]
    pub fn lookup(&self, template: TemplateId) -> Option<SymbolId> {
        self.0
            .get()
            .filter(|cached| cached.template == template)
            .map(|cached| cached.member)
    }

    #[inline]
    pub fn store(&self, template: TemplateId, member: SymbolId) {
        self.0.set(Some(CachedMember { template, member }));
    }

    pub fn get(&self) -> Option<CachedMember> {
        self.0.get()
    }

    pub fn clear(&self) {
        self.0.set(None);
    }
}

/// One bytecode word.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inst {
    Op(Opcode),
    Sym(SymbolId),
    Int(i32),
    Rel(i32),
    Cache(MemberCache),
    /// Terminates a body, a branch arm or a loop condition.
    Stop,
}

impl Inst {
    #[inline]
    pub fn is_stop(&self) -> bool {
        matches!(self, Inst::Stop)
    }
}

/// An immutable procedure or statement body.
///
/// Bodies are built once and shared by reference; only the member caches
/// change after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Code {
    words: Box<[Inst]>,
}

impl Code {
    /// Wrap raw words without validating them.
    ///
    /// Use [`crate::validate`] before executing words from an untrusted source.
    pub fn from_words(words: Vec<Inst>) -> Self {
        Code {
            words: words.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn words(&self) -> &[Inst] {
        &self.words
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    pub fn get(&self, pos: usize) -> Option<&Inst> {
        self.words.get(pos)
    }

    pub fn opcode_at(&self, pos: usize) -> Result<Opcode, CodeError> {
        match self.words.get(pos) {
            Some(Inst::Op(op)) => Ok(*op),
            _ => Err(CodeError::ExpectedOpcode { pos }),
        }
    }

    pub fn symbol_at(&self, pos: usize) -> Result<SymbolId, CodeError> {
        match self.words.get(pos) {
            Some(Inst::Sym(sym)) => Ok(*sym),
            _ => Err(CodeError::BadOperand { pos, expected: 's' }),
        }
    }

    pub fn int_at(&self, pos: usize) -> Result<i32, CodeError> {
        match self.words.get(pos) {
            Some(Inst::Int(i)) => Ok(*i),
            _ => Err(CodeError::BadOperand { pos, expected: 'i' }),
        }
    }

    /// Non-negative integer operand, as a count or index.
    pub fn count_at(&self, pos: usize) -> Result<usize, CodeError> {
        let value = self.int_at(pos)?;
        usize::try_from(value).map_err(|_| CodeError::BadOperand { pos, expected: 'i' })
    }

    /// Absolute target of the relative operand at `pos`.
    pub fn target_at(&self, pos: usize) -> Result<usize, CodeError> {
        match self.words.get(pos) {
            Some(Inst::Rel(offset)) => self.resolve(pos, *offset),
            _ => Err(CodeError::BadOperand { pos, expected: 'r' }),
        }
    }

    /// Like [`Code::target_at`], with a zero offset meaning "no target".
    pub fn optional_target_at(&self, pos: usize) -> Result<Option<usize>, CodeError> {
        match self.words.get(pos) {
            Some(Inst::Rel(0)) => Ok(None),
            Some(Inst::Rel(offset)) => self.resolve(pos, *offset).map(Some),
            _ => Err(CodeError::BadOperand { pos, expected: 'r' }),
        }
    }

    pub fn cache_at(&self, pos: usize) -> Result<&MemberCache, CodeError> {
        match self.words.get(pos) {
            Some(Inst::Cache(cache)) => Ok(cache),
            _ => Err(CodeError::BadOperand { pos, expected: 'c' }),
        }
    }

    /// Forget every cached member dispatch in this body.
    pub fn clear_caches(&self) {
        for word in self.words.iter() {
            if let Inst::Cache(cache) = word {
                cache.clear();
            }
        }
    }

    fn resolve(&self, pos: usize, offset: i32) -> Result<usize, CodeError> {
        let target = i64::try_from(pos).unwrap_or(i64::MAX) + i64::from(offset);
        match usize::try_from(target) {
            Ok(t) if t < self.words.len() => Ok(t),
            _ => Err(CodeError::JumpOutOfRange {
                pos,
                target,
                len: self.words.len(),
            }),
        }
    }
}

/// A forward or backward jump target inside a [`CodeBuilder`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label(usize);

/// Emits words and patches relative offsets once labels are bound.
///
/// ```text
/// let mut b = CodeBuilder::new();
/// let (then, next) = (b.label(), b.label());
/// b.op(Opcode::If).rel(then).no_target().rel(next);
/// // condition
/// b.op(Opcode::PushZero).stop();
/// b.bind(then);
/// // then arm
/// b.stop();
/// b.bind(next);
/// b.stop();
/// let code = b.finish()?;
/// ```
#[derive(Default)]
pub struct CodeBuilder {
    words: Vec<Inst>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of the next emitted word.
    #[inline]
    pub fn pos(&self) -> usize {
        self.words.len()
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.words.push(Inst::Op(op));
        self
    }

    pub fn sym(&mut self, sym: SymbolId) -> &mut Self {
        self.words.push(Inst::Sym(sym));
        self
    }

    pub fn int(&mut self, value: i32) -> &mut Self {
        self.words.push(Inst::Int(value));
        self
    }

    /// Emit a fresh, empty member cache slot.
    pub fn cache(&mut self) -> &mut Self {
        self.words.push(Inst::Cache(MemberCache::new()));
        self
    }

    pub fn stop(&mut self) -> &mut Self {
        self.words.push(Inst::Stop);
        self
    }

    /// Emit a zero offset, meaning "no target" for optional operands.
    pub fn no_target(&mut self) -> &mut Self {
        self.words.push(Inst::Rel(0));
        self
    }

    /// Emit a relative offset to `label`, patched by [`CodeBuilder::finish`].
    pub fn rel(&mut self, label: Label) -> &mut Self {
        self.fixups.push((self.words.len(), label));
        self.words.push(Inst::Rel(0));
        self
    }

    /// Create an unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current position.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(self.words.len());
        }
        self
    }

    /// Patch all offsets and produce the body.
    pub fn finish(mut self) -> Result<Code, CodeError> {
        for (pos, label) in std::mem::take(&mut self.fixups) {
            let target = self
                .labels
                .get(label.0)
                .copied()
                .flatten()
                .ok_or(CodeError::UnboundLabel)?;
            let offset = i64::try_from(target).unwrap_or(i64::MAX)
                - i64::try_from(pos).unwrap_or(i64::MAX);
            let offset = i32::try_from(offset).map_err(|_| CodeError::JumpOutOfRange {
                pos,
                target: offset,
                len: self.words.len(),
            })?;
            self.words[pos] = Inst::Rel(offset);
        }
        Ok(Code::from_words(self.words))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
mod tests;
