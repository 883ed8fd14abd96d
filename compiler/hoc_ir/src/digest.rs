//! Digests used to decide whether two engine builds can share images.
//!
//! Encoded bodies and checkpoints embed opcode ids and symbol traversal ids,
//! which are only meaningful between builds with the same opcode table and
//! the same built-in symbols. Both sides compare SHA-256 digests of those
//! tables before trusting each other's ids.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::Opcode;

/// A SHA-256 digest, displayed as lowercase hex.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct TableDigest([u8; 32]);

impl TableDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Start a digest over some table.
    pub fn builder() -> DigestBuilder {
        DigestBuilder(Sha256::new())
    }
}

impl fmt::Display for TableDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TableDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableDigest({self})")
    }
}

/// Incremental digest. Each field is terminated so that adjacent fields
/// cannot run together.
pub struct DigestBuilder(Sha256);

impl DigestBuilder {
    pub fn field(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update(bytes);
        self.0.update([0xff]);
        self
    }

    pub fn text(&mut self, s: &str) -> &mut Self {
        self.field(s.as_bytes())
    }

    pub fn finish(self) -> TableDigest {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0.finalize());
        TableDigest(out)
    }
}

/// Digest of every opcode's id, name and signature.
pub fn opcode_table_digest() -> TableDigest {
    let mut builder = TableDigest::builder();
    for op in Opcode::ALL {
        builder
            .field(&op.id().to_le_bytes())
            .text(op.name())
            .text(op.signature());
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_digest_is_stable_within_a_build() {
        assert_eq!(opcode_table_digest(), opcode_table_digest());
    }

    #[test]
    fn display_is_64_hex_chars() {
        let hex = opcode_table_digest().to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn field_boundaries_matter() {
        let mut a = TableDigest::builder();
        a.text("ab").text("c");
        let mut b = TableDigest::builder();
        b.text("a").text("bc");
        assert_ne!(a.finish(), b.finish());
    }
}
