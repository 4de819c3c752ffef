//! Error types for netlist construction and packed-netlist validation.

/// Errors raised while constructing a netlist or validating a packed
/// netlist against the loaded atom netlist.
#[derive(Debug, thiserror::Error)]
pub enum NetlistError {
    /// An atom references a primitive model the architecture does not know.
    #[error("unknown primitive model '{0}'")]
    UnknownPrimitive(String),

    /// An atom port name does not exist on the atom's model.
    #[error("atom '{atom}' has no port named '{port}'")]
    UnknownPort {
        /// The atom name.
        atom: String,
        /// The missing port name.
        port: String,
    },

    /// A pin index exceeds the port width.
    #[error("atom '{atom}' port '{port}' has no pin {bit}")]
    PinOutOfRange {
        /// The atom name.
        atom: String,
        /// The port name.
        port: String,
        /// The out-of-range bit index.
        bit: u32,
    },

    /// Two output pins drive the same net.
    #[error("net '{net}' has multiple drivers")]
    MultipleDrivers {
        /// The net name.
        net: String,
    },

    /// A net with sinks has no driver.
    #[error("net '{net}' has sinks but no driver")]
    UndrivenNet {
        /// The net name.
        net: String,
    },

    /// Two blocks share a name.
    #[error("duplicate block '{0}'")]
    DuplicateBlock(String),

    /// A packed-netlist block names a mode its pb-type does not have.
    #[error("block '{block}' selects unknown mode '{mode}'")]
    UnknownMode {
        /// The block name.
        block: String,
        /// The missing mode name.
        mode: String,
    },

    /// A packed netlist was generated for a different top instance.
    #[error("packed netlist top instance '{found}' does not match '{expected}'")]
    MismatchedTop {
        /// The expected top instance name.
        expected: String,
        /// The name found in the file.
        found: String,
    },

    /// A packed-netlist file could not be parsed.
    #[error("{file}:{line}: failed to parse packed netlist: {message}")]
    Parse {
        /// The offending file.
        file: String,
        /// The 1-based line number.
        line: u32,
        /// Parser detail.
        message: String,
    },

    /// A packed-netlist block does not exist in the current netlist.
    #[error("block '{0}' does not exist in the current netlist")]
    UnknownBlock(String),

    /// A packed-netlist block's model disagrees with the netlist.
    #[error("block '{block}' has model '{found}' but the netlist says '{expected}'")]
    ModelMismatch {
        /// The block name.
        block: String,
        /// The model the netlist records.
        expected: String,
        /// The model found in the file.
        found: String,
    },

    /// A packed-netlist pin connection disagrees with the netlist.
    #[error("block '{block}' pin '{port}[{bit}]' connects to '{found}' but the netlist says '{expected}'")]
    PinMismatch {
        /// The block name.
        block: String,
        /// The port name.
        port: String,
        /// The bit index.
        bit: u32,
        /// The net the netlist records ("open" when disconnected).
        expected: String,
        /// The net found in the file ("open" when disconnected).
        found: String,
    },

    /// A connected pin is absent from the packed netlist.
    #[error("block '{block}' is missing pin '{port}[{bit}]'")]
    MissingPin {
        /// The block name.
        block: String,
        /// The port name.
        port: String,
        /// The bit index.
        bit: u32,
    },

    /// Provenance fingerprints do not match the loaded inputs.
    #[error("{file}: {what} fingerprint mismatch (expected {expected}, found {found})")]
    StaleFile {
        /// The offending file.
        file: String,
        /// What fingerprint mismatched (netlist or architecture).
        what: String,
        /// The expected fingerprint.
        expected: String,
        /// The fingerprint found in the file.
        found: String,
    },
}
