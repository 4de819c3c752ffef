//! Opaque ID newtypes for atom netlist entities.

use silica_common::define_id;

define_id!(
    /// Opaque, copyable ID for an atom (a primitive netlist block).
    AtomId
);

define_id!(
    /// Opaque, copyable ID for an atom pin.
    PinId
);

define_id!(
    /// Opaque, copyable ID for an atom net.
    NetId
);

define_id!(
    /// Opaque, copyable ID for a molecule.
    MoleculeId
);
