use std::path::Path;

use ahash::AHashSet;
use anyhow::{ensure, Context, Result};
use log::{debug, info};

use crate::{
    count_matrix::{build_read_count_matrix, write_read_count_matrix},
    demux::Demultiplexer,
    indel_summary::{summarize_tables, write_indel_summary},
    matcher::build_matcher,
    metrics::{write_demux_metrics, DemuxMetrics},
    opts::{Command, CountMatrixOpts, DemuxOpts, IndelSummaryOpts, Opts},
    primer_panel::{self, unique_primer_ids, PrimerPanelEntry},
    utils::source_basename,
};

/// Run the command given on the command line.
pub fn run(opts: Opts) -> Result<(), anyhow::Error> {
    match opts.command {
        Command::Demux(opts) => run_demux(opts).map(|_| ()),
        Command::CountMatrix(opts) => run_count_matrix(opts),
        Command::SummarizeIndels(opts) => run_summarize_indels(opts),
    }
}

fn load_panel(annotation: &Path) -> Result<Vec<PrimerPanelEntry>> {
    let panel = primer_panel::from_path(annotation).with_context(|| {
        format!("Invalid primer annotation file: {}", annotation.to_string_lossy())
    })?;
    info!(
        "Loaded {} primer pairs with {} distinct ids from {}",
        panel.len(),
        unique_primer_ids(&panel).len(),
        annotation.to_string_lossy()
    );
    Ok(panel)
}

/// Demultiplex every input FASTQ in turn, returning the metrics for each.
pub fn run_demux(opts: DemuxOpts) -> Result<Vec<DemuxMetrics>> {
    // Preflight checks
    ensure!(
        opts.output_dir.is_dir(),
        "Output directory does not exist: {}",
        &opts.output_dir.to_string_lossy()
    );
    ensure!(!opts.fastqs.is_empty(), "At least one input FASTQ must be specified");
    let mut basenames = AHashSet::new();
    for fastq in &opts.fastqs {
        ensure!(fastq.is_file(), "Input FASTQ does not exist: {}", fastq.to_string_lossy());
        let basename = source_basename(fastq)?;
        ensure!(
            basenames.insert(basename.clone()),
            "Input FASTQs must have distinct file names, found {} more than once",
            basename
        );
    }

    let panel = load_panel(&opts.annotation)?;
    debug!("Using the {:?} matcher", opts.matcher);
    let matcher = build_matcher(opts.matcher, &panel);
    let demuxer = Demultiplexer::new(matcher.as_ref(), &opts.output_dir, opts.truncate_existing);

    let mut all_metrics = vec![];
    for fastq in &opts.fastqs {
        info!("Demultiplexing {}", fastq.to_string_lossy());
        let metrics = demuxer.demultiplex_file(fastq)?;
        info!(
            "Assigned {} of {} reads from {} to {} primer(s)",
            metrics.records_matched(),
            metrics.records_read,
            metrics.fastq,
            metrics.primers_with_records(&panel)
        );
        all_metrics.push(metrics);
    }

    let total_read: usize = all_metrics.iter().map(|m| m.records_read).sum();
    let total_matched: usize = all_metrics.iter().map(DemuxMetrics::records_matched).sum();
    info!(
        "Assigned {} of {} reads across {} input(s)",
        total_matched,
        total_read,
        all_metrics.len()
    );

    if let Some(path) = &opts.metrics {
        info!("Writing metrics to {}", path.to_string_lossy());
        write_demux_metrics(path, &all_metrics, &panel)?;
    }
    Ok(all_metrics)
}

/// Build and write the read count matrix for a demultiplexed directory.
pub fn run_count_matrix(opts: CountMatrixOpts) -> Result<()> {
    ensure!(
        opts.input_dir.is_dir(),
        "Input directory does not exist: {}",
        &opts.input_dir.to_string_lossy()
    );
    let panel = load_panel(&opts.annotation)?;

    let matrix = build_read_count_matrix(&opts.input_dir, &panel, &opts.fastq_suffix)?;
    let output = write_read_count_matrix(&opts.input_dir, &matrix)?;
    info!("Wrote {} read counts to {}", matrix.len(), output.to_string_lossy());
    Ok(())
}

/// Summarize the deletions in every allele frequency table below the input root.
pub fn run_summarize_indels(opts: IndelSummaryOpts) -> Result<()> {
    ensure!(
        opts.input_root.is_dir(),
        "Input root does not exist: {}",
        &opts.input_root.to_string_lossy()
    );
    let rows = summarize_tables(&opts.input_root)?;
    info!("Summarized {} allele frequency tables", rows.len());
    write_indel_summary(&opts.output, &rows)?;
    info!("Wrote the deletion summary to {}", opts.output.to_string_lossy());
    Ok(())
}
