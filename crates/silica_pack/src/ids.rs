//! Opaque ID newtypes for packer entities.

use silica_common::define_id;

define_id!(
    /// Opaque, copyable ID for a pb instance within a cluster's arena.
    PbId
);

define_id!(
    /// Opaque, copyable ID for a finalized or in-progress cluster.
    ClusterId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        assert_eq!(PbId::from_raw(3).as_raw(), 3);
        assert_eq!(ClusterId::from_raw(0).as_raw(), 0);
    }
}
