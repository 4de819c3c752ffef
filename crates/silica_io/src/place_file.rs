//! Placement file reader and writer.
//!
//! The format is line-oriented:
//!
//! ```text
//! Netlist_File: top.net.json Netlist_ID: 4f2a...
//! Array size: 3 x 3 logic blocks
//!
//! cb.u0     1  1  0  # 0
//! cb.u4     2  1  0  # 1
//! ```
//!
//! The fingerprint line is optional (other tools may omit it); the grid
//! header is mandatory and must precede every block record. Duplicate
//! headers are rejected. A fingerprint mismatch is fatal when
//! `verify_file_digests` is set, a warning otherwise.

use crate::error::PlacementFileError;
use silica_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// One placed block record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedBlock {
    /// The cluster name.
    pub name: String,
    /// Grid column.
    pub x: i32,
    /// Grid row.
    pub y: i32,
    /// Sub-position within the grid tile.
    pub subblock: i32,
}

/// A parsed placement file.
#[derive(Clone, Debug, Default)]
pub struct PlacementFile {
    /// The packed-netlist file named in the provenance header.
    pub netlist_file: Option<String>,
    /// The packed-netlist fingerprint from the provenance header.
    pub netlist_id: Option<String>,
    /// Device grid width.
    pub nx: i32,
    /// Device grid height.
    pub ny: i32,
    /// Block records in file order.
    pub blocks: Vec<PlacedBlock>,
}

/// What the reader validates the file against.
pub struct PlacementExpectations<'a> {
    /// The current packed-netlist fingerprint.
    pub netlist_id: &'a str,
    /// Expected grid width.
    pub nx: i32,
    /// Expected grid height.
    pub ny: i32,
    /// Names of blocks in the current netlist.
    pub block_names: &'a HashSet<String>,
}

/// Reads and validates a placement file.
pub fn read_placement(
    path: &Path,
    expected: &PlacementExpectations<'_>,
    verify_file_digests: bool,
    sink: &DiagnosticSink,
) -> Result<PlacementFile, PlacementFileError> {
    let file_name = path.display().to_string();
    let reader = BufReader::new(std::fs::File::open(path)?);

    let mut result = PlacementFile::default();
    let mut seen_netlist_id = false;
    let mut seen_grid = false;
    let mut lineno: u32 = 0;

    for line in reader.lines() {
        let line = line?;
        lineno += 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens.is_empty() || tokens[0].starts_with('#') {
            continue;
        }

        if tokens.len() == 4 && tokens[0] == "Netlist_File:" && tokens[2] == "Netlist_ID:" {
            if seen_netlist_id {
                return Err(PlacementFileError::DuplicateNetlistHeader {
                    file: file_name,
                    line: lineno,
                });
            }
            seen_netlist_id = true;
            let place_netlist_file = tokens[1].to_string();
            let place_netlist_id = tokens[3].to_string();

            if place_netlist_id != expected.netlist_id {
                if verify_file_digests {
                    return Err(PlacementFileError::StaleNetlist {
                        file: file_name,
                        line: lineno,
                        expected: expected.netlist_id.to_string(),
                        found: place_netlist_id,
                    });
                }
                sink.emit(
                    Diagnostic::warning(
                        DiagnosticCode::new(Category::File, 1),
                        format!(
                            "placement was generated from netlist '{place_netlist_id}', \
                             current netlist is '{}'",
                            expected.netlist_id
                        ),
                    )
                    .in_file(&file_name)
                    .at_line(lineno)
                    .with_note("pass --verify_file_digests to make this an error"),
                );
            }
            result.netlist_file = Some(place_netlist_file);
            result.netlist_id = Some(place_netlist_id);
        } else if tokens.len() == 7
            && tokens[0] == "Array"
            && tokens[1] == "size:"
            && tokens[3] == "x"
            && tokens[5] == "logic"
            && tokens[6] == "blocks"
        {
            if seen_grid {
                return Err(PlacementFileError::DuplicateGridHeader {
                    file: file_name,
                    line: lineno,
                });
            }
            seen_grid = true;
            let file_nx: i32 = tokens[2].parse().map_err(|_| invalid(&file_name, lineno, &line))?;
            let file_ny: i32 = tokens[4].parse().map_err(|_| invalid(&file_name, lineno, &line))?;
            if file_nx != expected.nx || file_ny != expected.ny {
                return Err(PlacementFileError::GridMismatch {
                    file: file_name,
                    line: lineno,
                    nx: expected.nx,
                    ny: expected.ny,
                    file_nx,
                    file_ny,
                });
            }
            result.nx = file_nx;
            result.ny = file_ny;
        } else if tokens.len() == 4 || (tokens.len() >= 5 && tokens[4].starts_with('#')) {
            if !seen_grid {
                return Err(PlacementFileError::MissingGridHeader {
                    file: file_name,
                    line: lineno,
                });
            }
            let name = tokens[0].to_string();
            let x: i32 = tokens[1].parse().map_err(|_| invalid(&file_name, lineno, &line))?;
            let y: i32 = tokens[2].parse().map_err(|_| invalid(&file_name, lineno, &line))?;
            let subblock: i32 =
                tokens[3].parse().map_err(|_| invalid(&file_name, lineno, &line))?;

            if !expected.block_names.contains(&name) {
                return Err(PlacementFileError::UnknownBlock {
                    file: file_name,
                    line: lineno,
                    block: name,
                });
            }
            if x < 0 || x > result.nx + 1 || y < 0 || y > result.ny + 1 {
                return Err(PlacementFileError::OutOfRange {
                    file: file_name,
                    line: lineno,
                    block: name,
                    x,
                    y,
                });
            }
            result.blocks.push(PlacedBlock { name, x, y, subblock });
        } else {
            return Err(invalid(&file_name, lineno, &line));
        }
    }

    Ok(result)
}

fn invalid(file: &str, line: u32, content: &str) -> PlacementFileError {
    PlacementFileError::InvalidLine {
        file: file.to_string(),
        line,
        content: content.to_string(),
    }
}

/// Writes a placement file with provenance and grid headers.
pub fn write_placement(
    path: &Path,
    netlist_file: &str,
    netlist_id: &str,
    nx: i32,
    ny: i32,
    blocks: &[PlacedBlock],
) -> std::io::Result<()> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(out, "Netlist_File: {netlist_file} Netlist_ID: {netlist_id}")?;
    writeln!(out, "Array size: {nx} x {ny} logic blocks")?;
    writeln!(out)?;
    writeln!(out, "#block name\tx\ty\tsubblk\tblock number")?;
    writeln!(out, "#----------\t--\t--\t------\t------------")?;
    for (index, block) in blocks.iter().enumerate() {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t# {}",
            block.name, block.x, block.y, block.subblock, index
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn write_file(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("test.place");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn roundtrip() {
        let dir = tempdir().unwrap();
        let blocks = vec![
            PlacedBlock {
                name: "cb.u0".to_string(),
                x: 1,
                y: 1,
                subblock: 0,
            },
            PlacedBlock {
                name: "cb.u4".to_string(),
                x: 2,
                y: 1,
                subblock: 0,
            },
        ];
        let path = dir.path().join("out.place");
        write_placement(&path, "top.net.json", "abcd", 3, 3, &blocks).unwrap();

        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "abcd",
            nx: 3,
            ny: 3,
            block_names: &names(&["cb.u0", "cb.u4"]),
        };
        let parsed = read_placement(&path, &expected, true, &sink).unwrap();
        assert_eq!(parsed.netlist_id.as_deref(), Some("abcd"));
        assert_eq!(parsed.blocks, blocks);
        assert!(!sink.has_errors());
    }

    #[test]
    fn duplicate_grid_header_rejected() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "Array size: 3 x 3 logic blocks\nArray size: 3 x 3 logic blocks\n",
        );
        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "abcd",
            nx: 3,
            ny: 3,
            block_names: &names(&[]),
        };
        let err = read_placement(&path, &expected, true, &sink);
        assert!(matches!(
            err,
            Err(PlacementFileError::DuplicateGridHeader { line: 2, .. })
        ));
    }

    #[test]
    fn duplicate_netlist_header_rejected() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "Netlist_File: a Netlist_ID: x\nNetlist_File: a Netlist_ID: x\n",
        );
        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "x",
            nx: 1,
            ny: 1,
            block_names: &names(&[]),
        };
        assert!(matches!(
            read_placement(&path, &expected, true, &sink),
            Err(PlacementFileError::DuplicateNetlistHeader { .. })
        ));
    }

    #[test]
    fn record_before_grid_header_rejected() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "cb.u0 1 1 0\n");
        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "x",
            nx: 1,
            ny: 1,
            block_names: &names(&["cb.u0"]),
        };
        assert!(matches!(
            read_placement(&path, &expected, true, &sink),
            Err(PlacementFileError::MissingGridHeader { .. })
        ));
    }

    #[test]
    fn grid_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "Array size: 4 x 4 logic blocks\n");
        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "x",
            nx: 3,
            ny: 3,
            block_names: &names(&[]),
        };
        assert!(matches!(
            read_placement(&path, &expected, true, &sink),
            Err(PlacementFileError::GridMismatch { .. })
        ));
    }

    #[test]
    fn unknown_block_rejected() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "Array size: 3 x 3 logic blocks\nghost 1 1 0\n",
        );
        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "x",
            nx: 3,
            ny: 3,
            block_names: &names(&["cb.u0"]),
        };
        assert!(matches!(
            read_placement(&path, &expected, true, &sink),
            Err(PlacementFileError::UnknownBlock { .. })
        ));
    }

    #[test]
    fn out_of_range_rejected() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "Array size: 3 x 3 logic blocks\ncb.u0 9 1 0\n",
        );
        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "x",
            nx: 3,
            ny: 3,
            block_names: &names(&["cb.u0"]),
        };
        assert!(matches!(
            read_placement(&path, &expected, true, &sink),
            Err(PlacementFileError::OutOfRange { .. })
        ));
    }

    #[test]
    fn stale_netlist_warns_without_verify() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "Netlist_File: a Netlist_ID: old\nArray size: 3 x 3 logic blocks\n",
        );
        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "new",
            nx: 3,
            ny: 3,
            block_names: &names(&[]),
        };
        let parsed = read_placement(&path, &expected, false, &sink).unwrap();
        assert_eq!(parsed.netlist_id.as_deref(), Some("old"));
        assert_eq!(sink.diagnostics().len(), 1);
        assert!(!sink.has_errors());
    }

    #[test]
    fn stale_netlist_fatal_with_verify() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "Netlist_File: a Netlist_ID: old\nArray size: 3 x 3 logic blocks\n",
        );
        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "new",
            nx: 3,
            ny: 3,
            block_names: &names(&[]),
        };
        assert!(matches!(
            read_placement(&path, &expected, true, &sink),
            Err(PlacementFileError::StaleNetlist { .. })
        ));
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "# a comment\n\nArray size: 2 x 2 logic blocks\ncb.u0 1 1 0 # 0\n",
        );
        let sink = DiagnosticSink::new();
        let expected = PlacementExpectations {
            netlist_id: "x",
            nx: 2,
            ny: 2,
            block_names: &names(&["cb.u0"]),
        };
        let parsed = read_placement(&path, &expected, true, &sink).unwrap();
        assert_eq!(parsed.blocks.len(), 1);
    }
}
