#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use env_logger::Env;

use crate::{
    count_matrix::DEFAULT_FASTQ_SUFFIX, indel_summary::DEFAULT_SUMMARY_PATH, matcher::MatcherKind,
    utils::built_info,
};

pub static TOOL_NAME: &str = "primerdemux";

static SHORT_USAGE: &str = "Demultiplexes FASTQs by the amplicon primer pair each read contains.";

static LONG_USAGE: &str = "
Demultiplexes FASTQs by the amplicon primer pair each read contains.

The `demux` command searches the sequence of every read for the primers of a panel and writes
each matching read to `<OUTPUT_DIR>/<primer_id>_<input file name>`.  A read is assigned to the
first primer pair in the annotation file for which the left primer, the right primer, or the
reverse complement of either occurs in the read, ignoring case.  Reads that match no primer
pair are dropped.

The annotation file is whitespace-delimited text with no header and one primer pair per line:
`<primer_id> <left_primer> <right_primer>`.  Further columns are ignored.

Output files are appended to: running `demux` twice over the same input into the same
directory doubles every output file.  Use --truncate-existing to replace existing outputs.

The `count-matrix` command counts the reads in every demultiplexed FASTQ in a directory and
writes a `read_count_summary_matrix.txt` table with one row per primer and input file.

The `summarize-indels` command finds every CRISPResso `Alleles_frequency_table*.txt` below a
directory and writes the number and percent of reads with no deletion, an in-frame deletion and
an out-of-frame deletion for each.

Example invocation:

primerdemux demux \\
  --fastqs sample1.fastq sample2.fastq \\
  --annotation primers.txt \\
  --output-dir demuxed/

primerdemux count-matrix --input-dir demuxed/ --annotation primers.txt

primerdemux summarize-indels --input-root crispresso/ --output deletions.tsv
";

#[derive(Parser, Debug, Clone)]
#[clap(name = TOOL_NAME, version = built_info::VERSION.as_str(), about=SHORT_USAGE, long_about=LONG_USAGE, term_width=0)]
pub struct Opts {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Demultiplex FASTQs into one file per primer pair.
    Demux(DemuxOpts),
    /// Build the read count matrix for a directory of demultiplexed FASTQs.
    CountMatrix(CountMatrixOpts),
    /// Summarize deletions across CRISPResso allele frequency tables.
    SummarizeIndels(IndelSummaryOpts),
}

#[derive(Args, Debug, Clone)]
pub struct DemuxOpts {
    /// Path to the input FASTQs.
    ///
    /// Inputs are plain text, uncompressed, single-end FASTQs.  Their file names must be distinct.
    #[clap(long, short = 'i', display_order = 1, required = true, multiple_values = true)]
    pub fastqs: Vec<PathBuf>,

    /// Path to the primer annotation file.
    #[clap(long, short = 'a', display_order = 2)]
    pub annotation: PathBuf,

    /// The directory to write outputs, the directory must exist.
    ///
    /// Existing outputs are appended to unless --truncate-existing is given.
    #[clap(long, short, display_order = 3)]
    pub output_dir: PathBuf,

    /// Truncate existing output files the first time they are written instead of appending.
    #[clap(long, display_order = 11)]
    pub truncate_existing: bool,

    /// Write the number of reads assigned to each primer for each input to this TSV.
    ///
    /// [default: None]
    #[clap(long, display_order = 11)]
    pub metrics: Option<PathBuf>,

    /// The primer matching algorithm.
    ///
    /// `cached` remembers the outcome for recently seen read sequences, which is faster when
    /// reads repeat heavily as in amplicon libraries.  Both produce identical outputs.
    #[clap(long, default_value = "scan", possible_values=MatcherKind::possible_values(), display_order = 31)]
    pub matcher: MatcherKind,
}

#[derive(Args, Debug, Clone)]
pub struct CountMatrixOpts {
    /// The directory of demultiplexed FASTQs.  The matrix is also written here.
    #[clap(long, short = 'i', display_order = 1)]
    pub input_dir: PathBuf,

    /// Path to the primer annotation file used to demultiplex.
    #[clap(long, short = 'a', display_order = 2)]
    pub annotation: PathBuf,

    /// Only files ending with this suffix are counted.
    #[clap(long, default_value = DEFAULT_FASTQ_SUFFIX, display_order = 11)]
    pub fastq_suffix: String,
}

#[derive(Args, Debug, Clone)]
pub struct IndelSummaryOpts {
    /// The directory searched, at any depth, for `Alleles_frequency_table*.txt` files.
    #[clap(long, short = 'i', display_order = 1)]
    pub input_root: PathBuf,

    /// The summary TSV to write.  Missing parent directories are created.
    #[clap(long, short = 'o', default_value = DEFAULT_SUMMARY_PATH, display_order = 2)]
    pub output: PathBuf,
}

/// Implement defaults that match the CLI options to allow for easier testing.
///
/// Note that these defaults exist only within test code.
#[cfg(test)]
impl Default for DemuxOpts {
    fn default() -> Self {
        Self {
            fastqs: vec![],
            annotation: PathBuf::default(),
            output_dir: PathBuf::default(),
            truncate_existing: false,
            metrics: None,
            matcher: MatcherKind::Scan,
        }
    }
}

#[cfg(test)]
impl Default for CountMatrixOpts {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::default(),
            annotation: PathBuf::default(),
            fastq_suffix: DEFAULT_FASTQ_SUFFIX.to_string(),
        }
    }
}

#[cfg(test)]
impl Default for IndelSummaryOpts {
    fn default() -> Self {
        Self { input_root: PathBuf::default(), output: PathBuf::from(DEFAULT_SUMMARY_PATH) }
    }
}

/// Parse args and set up logging / tracing
pub fn setup() -> Opts {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    Opts::parse()
}
