use std::fmt;

use serde::{Deserialize, Serialize};

/// Domain-separated BLAKE3 fingerprint of node content.
///
/// Child nodes carry no name, so their identity across snapshots is derived
/// from what they contain. Two nodes with identical kind and content always
/// produce the same `ContentHash`, whatever their position in the entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Domain tag for child node fingerprints.
    pub const CHILD_DOMAIN: &'static str = "mapmerge-child-v1";

    /// Fingerprint a child node from its kind tag and serialized content.
    ///
    /// The kind is length-prefixed so that `("ab", "c")` and `("a", "bc")`
    /// never collide.
    pub fn of_child(kind: &str, content: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(Self::CHILD_DOMAIN.as_bytes());
        hasher.update(b":");
        hasher.update(&(kind.len() as u64).to_le_bytes());
        hasher.update(kind.as_bytes());
        hasher.update(content.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_fingerprint_is_deterministic() {
        let a = ContentHash::of_child("brush", "( 0 0 0 ) ( 64 0 0 )");
        let b = ContentHash::of_child("brush", "( 0 0 0 ) ( 64 0 0 )");
        assert_eq!(a, b);
    }

    #[test]
    fn kind_participates_in_fingerprint() {
        let brush = ContentHash::of_child("brush", "x");
        let patch = ContentHash::of_child("patch", "x");
        assert_ne!(brush, patch);
    }

    #[test]
    fn kind_boundary_is_unambiguous() {
        let a = ContentHash::of_child("ab", "c");
        let b = ContentHash::of_child("a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_short_hex() {
        let hash = ContentHash::of_child("brush", "b");
        assert_eq!(format!("{hash}").len(), 8);
    }
}
