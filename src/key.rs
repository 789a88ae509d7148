//! Call fingerprint derivation.
//!
//! A fingerprint identifies one logical call: the wrapper's own unique
//! identifier plus a canonical serialization of the call arguments (and, for
//! the method form, the owning instance's identity and the method name).
//! Parts are joined and pushed through SHA-256, so fingerprints are opaque,
//! fixed-length, and collision-resistant across wrappers with identical
//! argument shapes.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate the per-wrap unique identifier.
///
/// Every wrapper instance gets its own identifier at construction so two
/// wrappers around the same function never share cache entries.
pub fn unique_identifier() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Derives opaque cache keys from call identity parts.
pub struct KeyDeriver;

impl KeyDeriver {
    /// Derive the fingerprint for a sequence of identity parts.
    ///
    /// Parts are joined with `|` and digested with SHA-256; the result is the
    /// lowercase hex form of the digest (64 characters).
    pub fn derive(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(parts.join("|").as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|byte| format!("{:02x}", byte)).collect()
    }
}

/// Cache scope for the method form of wrapping.
///
/// Identifies (type × instance × method) explicitly rather than serializing
/// the whole instance, which breaks down under cyclic instance graphs. Two
/// instances, or two distinct types whose methods share a name, never share
/// cache entries as long as their scopes differ.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodScope {
    type_tag: String,
    instance_tag: String,
    method: String,
}

impl MethodScope {
    /// Create a scope from a type tag (usually the type name), a stable
    /// per-instance identity string, and the method name.
    pub fn new(
        type_tag: impl Into<String>,
        instance_tag: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        MethodScope {
            type_tag: type_tag.into(),
            instance_tag: instance_tag.into(),
            method: method.into(),
        }
    }

    /// The method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The combined instance identity (type tag + instance tag).
    pub fn identity(&self) -> String {
        format!("{}{}", self.type_tag, self.instance_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = KeyDeriver::derive(&["id", "[1,2]"]);
        let b = KeyDeriver::derive(&["id", "[1,2]"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_is_hex_shaped() {
        let key = KeyDeriver::derive(&["anything"]);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_derive_separates_parts() {
        // Different identity parts must never collapse to the same key.
        let a = KeyDeriver::derive(&["wrapper-a", "[1]"]);
        let b = KeyDeriver::derive(&["wrapper-b", "[1]"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unique_identifier_is_unique() {
        assert_ne!(unique_identifier(), unique_identifier());
    }

    #[test]
    fn test_method_scope_identity() {
        let scope = MethodScope::new("Doctor", "{\"id\":1}", "visit");
        assert_eq!(scope.method(), "visit");
        assert_eq!(scope.identity(), "Doctor{\"id\":1}");
    }

    #[test]
    fn test_method_scopes_with_same_method_name_differ() {
        let a = MethodScope::new("Doctor", "{}", "load");
        let b = MethodScope::new("Patient", "{}", "load");
        let key_a = KeyDeriver::derive(&[a.method(), "uid", &a.identity(), "[]"]);
        let key_b = KeyDeriver::derive(&[b.method(), "uid", &b.identity(), "[]"]);
        assert_ne!(key_a, key_b);
    }
}
