//! Builds a matrix of read counts per primer and input sample from a demultiplexed directory.
//!
//! Demultiplexed files are named `{primer_id}_{basename}`.  Every basename found for any primer
//! is crossed with every primer id of the panel, so primers that received no reads for a sample
//! still get a row with a zero count.

use std::{
    collections::BTreeSet,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use fgoxide::io::DelimFile;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    demux::DemuxTarget,
    primer_panel::{unique_primer_ids, PrimerPanelEntry},
    utils::BUFSIZE,
};

/// The name of the matrix file written into the demultiplexed directory.
pub const READ_COUNT_MATRIX_FILENAME: &str = "read_count_summary_matrix.txt";

/// The default suffix identifying demultiplexed FASTQs.
pub const DEFAULT_FASTQ_SUFFIX: &str = ".fastq";

/// One cell of the read count matrix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadCountEntry {
    /// The primer id.
    pub primer_set: String,
    /// The basename of the input FASTQ the reads were demultiplexed from.
    pub fastq: String,
    /// The number of records in `{primer_set}_{fastq}`, zero if it does not exist.
    pub read_counts: usize,
}

/// The primer id that `file_name` was demultiplexed to, and the remaining basename.
///
/// When more than one primer id is a prefix, the longest is used.
fn split_demuxed_name<'a>(file_name: &'a str, primer_ids: &[String]) -> Option<(&'a str, &'a str)> {
    primer_ids
        .iter()
        .filter_map(|id| {
            file_name
                .strip_prefix(id.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|basename| (&file_name[..id.len()], basename))
        })
        .filter(|(_, basename)| !basename.is_empty())
        .max_by_key(|(id, _)| id.len())
}

/// The distinct, sorted input basenames found among the demultiplexed files in `dir`.
pub fn find_demuxed_basenames<P: AsRef<Path>>(
    dir: P,
    primer_ids: &[String],
    fastq_suffix: &str,
) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    let mut basenames = BTreeSet::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Unable to list directory: {}", dir.to_string_lossy()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Unable to list {}", dir.to_string_lossy()))?;
        if !entry.path().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !file_name.ends_with(fastq_suffix) {
            continue;
        }
        if let Some((_, basename)) = split_demuxed_name(&file_name, primer_ids) {
            basenames.insert(basename.to_string());
        }
    }
    Ok(basenames.into_iter().collect())
}

/// The number of lines in the stream, counting a final line without a terminator.
fn count_lines<R: Read>(mut reader: R) -> std::io::Result<usize> {
    let mut buffer = vec![0; BUFSIZE];
    let mut lines = 0;
    let mut last = None;
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        lines += bytecount::count(&buffer[..n], b'\n');
        last = Some(buffer[n - 1]);
    }
    if last.map_or(false, |byte| byte != b'\n') {
        lines += 1;
    }
    Ok(lines)
}

/// The number of FASTQ records in the file, zero if it does not exist.
///
/// Records are counted as lines / 4, a line count not divisible by 4 is an error.
pub fn count_fastq_records<P: AsRef<Path>>(path: P) -> Result<usize> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(0);
    }
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.to_string_lossy()))?;
    let lines = count_lines(BufReader::with_capacity(BUFSIZE, file))
        .with_context(|| format!("Failed to read {}", path.to_string_lossy()))?;
    ensure!(
        lines % 4 == 0,
        "Malformed FASTQ file: {}. Line count {} is not divisible by 4.",
        path.to_string_lossy(),
        lines
    );
    Ok(lines / 4)
}

/// Count the records of every (primer id, basename) pair in `dir`.
///
/// Rows are ordered by primer id in panel order, then by basename.
pub fn build_read_count_matrix<P: AsRef<Path>>(
    dir: P,
    panel: &[PrimerPanelEntry],
    fastq_suffix: &str,
) -> Result<Vec<ReadCountEntry>> {
    let dir = dir.as_ref();
    let primer_ids = unique_primer_ids(panel);
    let basenames = find_demuxed_basenames(dir, &primer_ids, fastq_suffix)?;
    debug!("Found {} demultiplexed input(s) in {}", basenames.len(), dir.to_string_lossy());

    primer_ids
        .iter()
        .cartesian_product(basenames.iter())
        .map(|(primer_id, basename)| -> Result<ReadCountEntry> {
            let path = DemuxTarget::new(primer_id, basename).path(dir);
            Ok(ReadCountEntry {
                primer_set: primer_id.clone(),
                fastq: basename.clone(),
                read_counts: count_fastq_records(path)?,
            })
        })
        .collect()
}

/// Write the matrix as a TSV to [`READ_COUNT_MATRIX_FILENAME`] in `dir`, returning its path.
pub fn write_read_count_matrix<P: AsRef<Path>>(
    dir: P,
    entries: &[ReadCountEntry],
) -> Result<PathBuf> {
    let output = dir.as_ref().join(READ_COUNT_MATRIX_FILENAME);
    DelimFile::default()
        .write_tsv(&output, entries)
        .with_context(|| format!("Unable to write {}", output.to_string_lossy()))?;
    Ok(output)
}
