//! String-hashed identifiers
//!
//! Uniform bindings are addressed by the hash of their shader-side name so
//! per-frame lookups never touch string data. Hashing is FNV-1a and `const`,
//! so ids for literals are computed at compile time.

/// Hash of a uniform's shader-side name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformId(pub u32);

impl std::fmt::Display for UniformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Compute the [`UniformId`] for a uniform name (32-bit FNV-1a).
pub const fn uniform_id(name: &str) -> UniformId {
    let bytes = name.as_bytes();
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    UniformId(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_id() {
        assert_eq!(uniform_id("globalData"), uniform_id("globalData"));
    }

    #[test]
    fn different_names_differ() {
        assert_ne!(uniform_id("globalData"), uniform_id("objectData"));
        assert_ne!(uniform_id(""), uniform_id("a"));
    }

    #[test]
    fn id_is_const_evaluable() {
        const GLOBAL: UniformId = uniform_id("globalData");
        assert_eq!(GLOBAL, uniform_id("globalData"));
    }

    #[test]
    fn known_fnv1a_vector() {
        // FNV-1a 32-bit of the empty string is the offset basis.
        assert_eq!(uniform_id("").0, 0x811c_9dc5);
    }
}
