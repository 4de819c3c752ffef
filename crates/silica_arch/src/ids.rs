//! Opaque ID newtypes for architecture entities.
//!
//! All architecture entities live in arenas owned by
//! [`Architecture`](crate::Architecture); these ids are thin `u32` indices
//! into them.

use silica_common::define_id;

define_id!(
    /// Opaque, copyable ID for a primitive model.
    ModelId
);

define_id!(
    /// Opaque, copyable ID for a pb-type template.
    PbTypeId
);

define_id!(
    /// Opaque, copyable ID for an instantiated pb-graph node.
    PbGraphNodeId
);

define_id!(
    /// Opaque, copyable ID for a pin of a pb-graph node.
    PbGraphPinId
);

define_id!(
    /// Opaque, copyable ID for a top-level block type (CLB, I/O, ...).
    BlockTypeId
);

define_id!(
    /// Opaque, copyable ID for a pack pattern.
    PatternId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn roundtrip() {
        let id = PbGraphNodeId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
    }

    #[test]
    fn hash_in_set() {
        let mut set = HashSet::new();
        set.insert(ModelId::from_raw(1));
        set.insert(ModelId::from_raw(2));
        set.insert(ModelId::from_raw(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn ordering_follows_raw_index() {
        assert!(PbGraphPinId::from_raw(3) < PbGraphPinId::from_raw(10));
    }
}
