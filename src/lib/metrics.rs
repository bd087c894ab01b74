//! Per-input counts collected while demultiplexing.
//!
//! A [`DemuxMetrics`] is filled in by the [`crate::demux::Demultiplexer`] for each input FASTQ.
//! When requested, the per-primer counts of every input are written to a single TSV of
//! [`PrimerReadCount`] rows.

use std::path::Path;

use anyhow::{Context, Result};
use fgoxide::io::DelimFile;
use serde::{Deserialize, Serialize};

use crate::primer_panel::{unique_primer_ids, PrimerPanelEntry};

/// Counts for one demultiplexed input FASTQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxMetrics {
    /// The file name of the input FASTQ.
    pub fastq: String,
    /// The number of records read from the input.
    pub records_read: usize,
    /// The number of records routed to each panel entry, indexed like the panel.
    pub per_entry_records: Vec<usize>,
}

impl DemuxMetrics {
    pub fn new(fastq: &str, panel_size: usize) -> Self {
        Self { fastq: fastq.to_string(), records_read: 0, per_entry_records: vec![0; panel_size] }
    }

    /// Record the outcome of matching one read.
    #[inline]
    pub fn add(&mut self, entry_index: Option<usize>) {
        self.records_read += 1;
        if let Some(index) = entry_index {
            self.per_entry_records[index] += 1;
        }
    }

    /// The number of records routed to any primer.
    pub fn records_matched(&self) -> usize {
        self.per_entry_records.iter().sum()
    }

    /// The number of distinct primers that received at least one record.
    pub fn primers_with_records(&self, panel: &[PrimerPanelEntry]) -> usize {
        self.per_primer(panel).iter().filter(|row| row.read_count > 0).count()
    }

    /// One row per distinct primer id, in panel order, summing entries that share an id.
    pub fn per_primer(&self, panel: &[PrimerPanelEntry]) -> Vec<PrimerReadCount> {
        unique_primer_ids(panel)
            .into_iter()
            .map(|primer_id| {
                let read_count = panel
                    .iter()
                    .zip(self.per_entry_records.iter())
                    .filter(|(entry, _)| entry.primer_id == primer_id)
                    .map(|(_, count)| *count)
                    .sum();
                PrimerReadCount { fastq: self.fastq.clone(), primer_id, read_count }
            })
            .collect()
    }
}

/// A row in the demultiplexing metrics file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrimerReadCount {
    /// The file name of the input FASTQ.
    pub fastq: String,
    /// The primer id.
    pub primer_id: String,
    /// The number of records written for this primer.
    pub read_count: usize,
}

/// Write the per-primer counts of all inputs to a TSV.
pub fn write_demux_metrics<P: AsRef<Path>>(
    path: P,
    metrics: &[DemuxMetrics],
    panel: &[PrimerPanelEntry],
) -> Result<()> {
    let rows = metrics.iter().flat_map(|m| m.per_primer(panel));
    DelimFile::default().write_tsv(&path, rows).with_context(|| {
        format!("Unable to write metrics file: {}", path.as_ref().to_string_lossy())
    })?;
    Ok(())
}
