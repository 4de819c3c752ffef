//! Error types for architecture construction and validation.

/// Errors raised while building or validating an architecture description.
#[derive(Debug, thiserror::Error)]
pub enum ArchError {
    /// A pb-type, model or block type name was referenced but never defined.
    #[error("unknown architecture entity '{0}'")]
    UnknownEntity(String),

    /// A primitive pb-type references a model that does not exist.
    #[error("pb-type '{pb_type}' references unknown model '{model}'")]
    UnknownModel {
        /// The referencing pb-type.
        pb_type: String,
        /// The missing model name.
        model: String,
    },

    /// A port name was not found on a pb-type.
    #[error("pb-type '{pb_type}' has no port named '{port}'")]
    UnknownPort {
        /// The pb-type searched.
        pb_type: String,
        /// The missing port name.
        port: String,
    },

    /// A pb-type declares both modes and a model, or neither.
    #[error("pb-type '{0}' must be either a primitive (model, no modes) or a container (modes, no model)")]
    MalformedPbType(String),

    /// A container hosting clocked primitives exposes no clock pins.
    #[error("pb-type '{pb_type}' hosts clocked primitives but has no clock port")]
    NoClockPath {
        /// The offending container pb-type.
        pb_type: String,
    },

    /// A pack pattern's slots cannot be hosted by any block type.
    #[error("pack pattern '{pattern}' has no hosting block type")]
    PatternWithoutHost {
        /// The pattern name.
        pattern: String,
    },

    /// No block type can host a model used by the netlist.
    #[error("no block type can host primitives of model '{0}'")]
    UnhostableModel(String),
}
