//! Fixed-capacity collections
//!
//! Batch accumulators have deliberately fixed capacities: overflow is a
//! caller contract violation and fails closed instead of growing or
//! silently dropping entries.

/// Error returned when a [`BoundedVec`] is pushed past its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("capacity exceeded: {capacity} elements")]
pub struct CapacityError {
    /// The fixed capacity that was exceeded
    pub capacity: usize,
}

/// Vector with a hard upper bound on its length.
///
/// Backed by a `Vec` that pre-allocates `N` slots; `push` never reallocates
/// and never exceeds `N`.
#[derive(Debug, Clone)]
pub struct BoundedVec<T, const N: usize> {
    items: Vec<T>,
}

impl<T, const N: usize> BoundedVec<T, N> {
    /// Create an empty bounded vector with capacity `N`.
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(N),
        }
    }

    /// The fixed capacity.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Append an element, failing closed when full.
    pub fn push(&mut self, item: T) -> Result<(), CapacityError> {
        if self.items.len() >= N {
            return Err(CapacityError { capacity: N });
        }
        self.items.push(item);
        Ok(())
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no slots are occupied.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop all elements, keeping the allocation.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// View the occupied slots.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Iterate over the occupied slots.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Get an element by index.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }
}

impl<T, const N: usize> Default for BoundedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a BoundedVec<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_up_to_capacity_succeeds() {
        let mut v: BoundedVec<u32, 4> = BoundedVec::new();
        for i in 0..4 {
            assert!(v.push(i).is_ok());
            assert_eq!(v.len(), (i + 1) as usize);
        }
    }

    #[test]
    fn push_past_capacity_fails_closed() {
        let mut v: BoundedVec<u32, 2> = BoundedVec::new();
        v.push(0).unwrap();
        v.push(1).unwrap();
        let err = v.push(2).unwrap_err();
        assert_eq!(err.capacity, 2);
        // Contents are untouched by the failed push.
        assert_eq!(v.as_slice(), &[0, 1]);
    }

    #[test]
    fn clear_resets_length_and_is_idempotent() {
        let mut v: BoundedVec<u32, 4> = BoundedVec::new();
        v.push(7).unwrap();
        v.clear();
        assert!(v.is_empty());
        v.clear();
        assert!(v.is_empty());
        assert!(v.push(1).is_ok());
    }
}
