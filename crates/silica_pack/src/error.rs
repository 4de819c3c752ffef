//! Error types for the packer core.
//!
//! Only genuinely unrecoverable conditions are errors; the
//! `FailedFeasible`/`FailedRoute`/`FailedBlockPack` statuses returned by
//! `try_pack_molecule` are ordinary values driving the controller's retry
//! loops.

/// Errors that abort packing.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// A clock net fans into a combinational data input.
    #[error("clock net '{net}' drives a non-clock input of combinational atom '{atom}'")]
    ClockIntoLogic {
        /// The clock net name.
        net: String,
        /// The offending sink atom.
        atom: String,
    },

    /// No block type in the architecture can implement a molecule.
    #[error("no logic block can implement molecule rooted at atom '{root_atom}'")]
    MoleculeUnhostable {
        /// The molecule's root atom name.
        root_atom: String,
    },

    /// The netlist uses a model no block type hosts.
    #[error("no block type can host primitives of model '{model}'")]
    UnhostableModel {
        /// The model name.
        model: String,
    },

    /// Device growth exceeded the representable grid range.
    #[error("circuit cannot pack: device size {nx} x {ny} exceeds packer range")]
    DeviceTooLarge {
        /// Grid width reached.
        nx: i32,
        /// Grid height reached.
        ny: i32,
    },

    /// A post-packing invariant was violated (a bug in the packer).
    #[error(transparent)]
    Internal(#[from] silica_common::InternalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_clock_into_logic() {
        let err = PackError::ClockIntoLogic {
            net: "clk".to_string(),
            atom: "lut_7".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "clock net 'clk' drives a non-clock input of combinational atom 'lut_7'"
        );
    }

    #[test]
    fn display_device_too_large() {
        let err = PackError::DeviceTooLarge { nx: 40000, ny: 40000 };
        assert!(format!("{err}").contains("40000 x 40000"));
    }
}
