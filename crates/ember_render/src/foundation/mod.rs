//! Foundation utilities shared across the engine
//!
//! Math types, string-hashed identifiers, and fixed-capacity collections.

pub mod bounded;
pub mod hash;
pub mod math;
