use derive_more::{From, Into};

/// An identity token for a physical scene point tracked across views.
///
/// Two features are equal iff their ids are equal. The id either comes from
/// storage (correspondences loaded from disk) or from a [`FeatureIdAllocator`]
/// owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct Feature(pub u64);

impl Feature {
    /// Creates a feature with an externally supplied id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Hands out fresh, unique feature ids.
///
/// The allocator is a monotonic counter, so feature creation is deterministic
/// and free of global state. Uniqueness holds within one allocator; ids loaded
/// from storage should be kept out of the allocated range by starting the
/// allocator past the largest loaded id.
#[derive(Debug, Clone, Default)]
pub struct FeatureIdAllocator {
    next: u64,
}

impl FeatureIdAllocator {
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates an allocator whose first id is `next`.
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    pub fn allocate(&mut self) -> Feature {
        let id = self.next;
        self.next += 1;
        Feature(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_monotonic() {
        let mut alloc = FeatureIdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_ne!(a, b);
        assert_eq!(a.id() + 1, b.id());
    }

    #[test]
    fn equality_is_by_id() {
        assert_eq!(Feature::new(7), Feature(7));
        assert_ne!(Feature::new(7), Feature::new(8));
    }
}
