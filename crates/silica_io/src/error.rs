//! Error types for placement-file reading.

/// Errors raised while reading or validating a placement file.
#[derive(Debug, thiserror::Error)]
pub enum PlacementFileError {
    /// An I/O error occurred while reading the file.
    #[error("failed to read placement file: {0}")]
    Io(#[from] std::io::Error),

    /// The netlist fingerprint header appeared twice.
    #[error("{file}:{line}: duplicate netlist fingerprint header")]
    DuplicateNetlistHeader {
        /// The placement file.
        file: String,
        /// The offending line.
        line: u32,
    },

    /// The device grid header appeared twice.
    #[error("{file}:{line}: duplicate device grid dimensions specification")]
    DuplicateGridHeader {
        /// The placement file.
        file: String,
        /// The offending line.
        line: u32,
    },

    /// A block record appeared before the grid header.
    #[error("{file}:{line}: missing device grid size specification")]
    MissingGridHeader {
        /// The placement file.
        file: String,
        /// The offending line.
        line: u32,
    },

    /// The placement was generated for a different device size.
    #[error("{file}:{line}: current device size ({nx} x {ny}) differs from placement file ({file_nx} x {file_ny})")]
    GridMismatch {
        /// The placement file.
        file: String,
        /// The offending line.
        line: u32,
        /// Expected grid width.
        nx: i32,
        /// Expected grid height.
        ny: i32,
        /// Grid width found in the file.
        file_nx: i32,
        /// Grid height found in the file.
        file_ny: i32,
    },

    /// A placed block does not exist in the current netlist.
    #[error("{file}:{line}: block '{block}' does not exist in the current netlist")]
    UnknownBlock {
        /// The placement file.
        file: String,
        /// The offending line.
        line: u32,
        /// The unknown block name.
        block: String,
    },

    /// A block location lies outside the device grid.
    #[error("{file}:{line}: block '{block}' location ({x}, {y}) is out of range")]
    OutOfRange {
        /// The placement file.
        file: String,
        /// The offending line.
        line: u32,
        /// The block name.
        block: String,
        /// The out-of-range x coordinate.
        x: i32,
        /// The out-of-range y coordinate.
        y: i32,
    },

    /// A line matched no recognized form.
    #[error("{file}:{line}: invalid line '{content}' in placement file")]
    InvalidLine {
        /// The placement file.
        file: String,
        /// The offending line.
        line: u32,
        /// The unparsable content.
        content: String,
    },

    /// The placement was generated from a different packed netlist and
    /// fingerprint verification is on.
    #[error("{file}:{line}: placement was generated from netlist '{found}', current netlist is '{expected}'")]
    StaleNetlist {
        /// The placement file.
        file: String,
        /// The offending line.
        line: u32,
        /// The expected netlist fingerprint.
        expected: String,
        /// The fingerprint found in the file.
        found: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_grid_mismatch() {
        let err = PlacementFileError::GridMismatch {
            file: "top.place".to_string(),
            line: 2,
            nx: 3,
            ny: 3,
            file_nx: 4,
            file_ny: 4,
        };
        assert_eq!(
            format!("{err}"),
            "top.place:2: current device size (3 x 3) differs from placement file (4 x 4)"
        );
    }

    #[test]
    fn display_unknown_block() {
        let err = PlacementFileError::UnknownBlock {
            file: "top.place".to_string(),
            line: 7,
            block: "cb.u9".to_string(),
        };
        assert!(format!("{err}").contains("cb.u9"));
    }
}
