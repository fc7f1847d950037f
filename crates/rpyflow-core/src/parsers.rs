//! Parser for blob files.
//!
//! The format follows the XYZ layout with forces appended:
//! ```text
//! <num_blobs>
//! <comment line>
//! <x> <y> <z> <fx> <fy> <fz>
//! ...
//! ```
//!
//! Blank lines after the header are skipped. A missing force triple is an
//! error; extra columns are ignored.

use std::path::Path;

use thiserror::Error;

use crate::types::ParticleSet;

/// Errors during blob file parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },
}

const COLUMNS: [&str; 6] = ["x", "y", "z", "fx", "fy", "fz"];

/// Parse blob positions and forces from a string.
pub fn parse_blobs(content: &str) -> Result<ParticleSet, ParseError> {
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < 2 {
        return Err(ParseError::FormatError {
            line: 1,
            message: "Blob file must start with a count line and a comment line".into(),
        });
    }

    let num_blobs: usize = lines[0].trim().parse().map_err(|_| ParseError::FormatError {
        line: 1,
        message: "First line must be the number of blobs".into(),
    })?;

    // The header is untrusted; never reserve more rows than the file has.
    let capacity = num_blobs.min(lines.len() - 2);
    let mut positions = Vec::with_capacity(capacity);
    let mut forces = Vec::with_capacity(capacity);
    for (idx, line) in lines[2..].iter().enumerate() {
        let line_no = idx + 3;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < COLUMNS.len() {
            return Err(ParseError::FormatError {
                line: line_no,
                message: format!("Expected 'x y z fx fy fz', got '{line}'"),
            });
        }

        let mut values = [0.0; 6];
        for (c, name) in COLUMNS.iter().enumerate() {
            values[c] = parts[c].parse().map_err(|_| ParseError::FormatError {
                line: line_no,
                message: format!("Invalid {name}: {}", parts[c]),
            })?;
        }
        positions.push([values[0], values[1], values[2]]);
        forces.push([values[3], values[4], values[5]]);
    }

    if positions.len() != num_blobs {
        return Err(ParseError::FormatError {
            line: 1,
            message: format!("Header says {} blobs but found {}", num_blobs, positions.len()),
        });
    }

    Ok(ParticleSet { positions, forces })
}

/// Read and parse a blob file.
pub fn load_blobs(path: &Path) -> Result<ParticleSet, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_blobs(&content)
}
