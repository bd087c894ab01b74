#![forbid(unsafe_code)]
//! Loading and validation of the primer annotation table.
//!
//! The annotation table is whitespace-delimited text with one primer pair per line:
//!
//! ```text
//! <primer_id> <left_primer> <right_primer> [ignored columns...]
//! ```
//!
//! There is no header row and blank lines are skipped.  The order of the entries is kept, as the
//! panel order decides which primer a read is assigned to when it could match more than one.

use std::{fmt::Display, path::Path};

use ahash::AHashMap;
use bstr::BString;
use fgoxide::io::Io;
use itertools::Itertools;
use log::warn;
use thiserror::Error;

use crate::sequence::is_iupac;

/// The number of leading columns used from each line of the annotation table.
pub const REQUIRED_COLUMNS: usize = 3;

/// Which primer of the pair a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimerSide {
    Left,
    Right,
}

impl Display for PrimerSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// The error that may occur when loading a primer panel.
#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Unable to read primer annotation file {path}")]
    Unreadable { path: String, source: fgoxide::FgError },

    #[error("Line {line_number} has {actual} fields, expected at least {expected}: {line}")]
    TooFewColumns { actual: usize, expected: usize, line_number: usize, line: String },

    #[error("Invalid {side} primer `{primer}` for {id} on line {line_number}, only IUPAC bases are allowed")]
    InvalidPrimer { id: String, side: PrimerSide, primer: String, line_number: usize },

    #[error("Primer id `{id}` on line {line_number} may not contain a path separator")]
    InvalidPrimerId { id: String, line_number: usize },

    #[error("The primer annotation file contained no primers")]
    ZeroPrimers,
}

/// A single primer pair from the annotation table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimerPanelEntry {
    /// The identifier used to name the demultiplexed output files.
    pub primer_id: String,
    /// The left (forward) primer bases.
    pub left_primer: BString,
    /// The right (reverse) primer bases.
    pub right_primer: BString,
    /// The 1-based line number in the annotation table, if loaded from a file.
    pub line_number: Option<usize>,
}

impl PrimerPanelEntry {
    /// Create a new [`PrimerPanelEntry`] that did not come from a file.
    pub fn new(primer_id: &str, left_primer: &str, right_primer: &str) -> Self {
        Self {
            primer_id: primer_id.to_string(),
            left_primer: BString::from(left_primer),
            right_primer: BString::from(right_primer),
            line_number: None,
        }
    }

    /// Parse an entry from one line of the annotation table.
    ///
    /// Returns `Ok(None)` for blank lines.
    ///
    /// # Errors
    ///
    /// - [`PanelError::TooFewColumns`]
    /// - [`PanelError::InvalidPrimer`]
    /// - [`PanelError::InvalidPrimerId`]
    pub fn parse_line(line: &str, line_number: usize) -> Result<Option<Self>, PanelError> {
        let fields = line.split_whitespace().collect_vec();
        if fields.is_empty() {
            return Ok(None);
        }
        if fields.len() < REQUIRED_COLUMNS {
            return Err(PanelError::TooFewColumns {
                actual: fields.len(),
                expected: REQUIRED_COLUMNS,
                line_number,
                line: line.to_string(),
            });
        }

        let (primer_id, left, right) = (fields[0], fields[1], fields[2]);
        if primer_id.contains(std::path::is_separator) {
            return Err(PanelError::InvalidPrimerId { id: primer_id.to_string(), line_number });
        }
        for (side, primer) in [(PrimerSide::Left, left), (PrimerSide::Right, right)] {
            if !is_iupac(primer.as_bytes()) {
                return Err(PanelError::InvalidPrimer {
                    id: primer_id.to_string(),
                    side,
                    primer: primer.to_string(),
                    line_number,
                });
            }
        }

        Ok(Some(Self { line_number: Some(line_number), ..Self::new(primer_id, left, right) }))
    }
}

/// Parse a panel from the lines of an annotation table.
///
/// # Errors
///
/// - [`PanelError::ZeroPrimers`] if no entries were found
/// - any error from [`PrimerPanelEntry::parse_line`]
pub fn from_lines<S: AsRef<str>, I: IntoIterator<Item = S>>(
    lines: I,
) -> Result<Vec<PrimerPanelEntry>, PanelError> {
    let mut panel = vec![];
    for (index, line) in lines.into_iter().enumerate() {
        if let Some(entry) = PrimerPanelEntry::parse_line(line.as_ref(), index + 1)? {
            panel.push(entry);
        }
    }
    if panel.is_empty() {
        return Err(PanelError::ZeroPrimers);
    }

    for id in duplicate_primer_ids(&panel) {
        warn!(
            "Primer id {} is defined more than once in the annotation table; all definitions \
             write to the same output and a read matching several is assigned by the first",
            id
        );
    }
    Ok(panel)
}

/// Load a primer panel from the annotation table at the given path.
///
/// # Errors
///
/// - [`PanelError::Unreadable`] if the file is missing or unreadable
/// - any error from [`from_lines`]
pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<PrimerPanelEntry>, PanelError> {
    let lines = Io::default().read_lines(&path).map_err(|source| PanelError::Unreadable {
        path: path.as_ref().to_string_lossy().to_string(),
        source,
    })?;
    from_lines(lines)
}

/// Returns the primer ids that occur more than once in the panel, in order of first occurrence.
pub fn duplicate_primer_ids(panel: &[PrimerPanelEntry]) -> Vec<String> {
    let mut counts: AHashMap<&str, usize> = AHashMap::new();
    for entry in panel {
        *counts.entry(entry.primer_id.as_str()).or_insert(0) += 1;
    }
    panel
        .iter()
        .map(|entry| entry.primer_id.as_str())
        .filter(|id| counts.get(id).map_or(false, |count| *count > 1))
        .unique()
        .map(String::from)
        .collect()
}

/// The distinct primer ids of the panel, in panel order.
pub fn unique_primer_ids(panel: &[PrimerPanelEntry]) -> Vec<String> {
    panel.iter().map(|entry| entry.primer_id.clone()).unique().collect()
}
