//! Summarizes deletion outcomes from CRISPResso allele frequency tables.
//!
//! Every `Alleles_frequency_table*.txt` below a root directory is read, and the reads of each
//! allele are classed by the `n_deleted` column: no deletion, an in-frame deletion (a multiple of
//! three bases), or an out-of-frame deletion.  One [`IndelSummary`] row is produced per table.

use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, ensure, Context, Result};
use fgoxide::io::{DelimFile, Io};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// The file name prefix of the tables to summarize.
pub const ALLELE_TABLE_PREFIX: &str = "Alleles_frequency_table";

/// The extension of the tables to summarize.
pub const ALLELE_TABLE_EXTENSION: &str = ".txt";

/// The default path of the summary.
pub const DEFAULT_SUMMARY_PATH: &str = "allele_deletion_summary.tsv";

/// Directory name prefixes removed to give the sample name, the first that matches is removed.
const SAMPLE_PREFIXES: [&str; 3] = ["CRISPResso_on_crisprseq_", "CRISPResso_on_", "crisprseq_"];

/// The label used when a table name carries no sgRNA.
const NO_SGRNA: &str = "NA";

const DELETED_COLUMN: &str = "n_deleted";
const READS_COLUMN: &str = "#Reads";

/// The columns used from one row of an allele frequency table.
///
/// Values are kept as text since non-numeric values count as zero.
#[derive(Debug, Deserialize)]
struct AlleleRow {
    #[serde(rename = "n_deleted")]
    n_deleted: String,
    #[serde(rename = "#Reads")]
    reads: String,
}

/// Parse a count, treating anything non-numeric as zero and truncating fractional values.
fn parse_count(value: &str) -> i64 {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
        .unwrap_or(0)
}

/// Read counts by deletion class for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionCounts {
    pub no_deletion: i64,
    pub in_frame: i64,
    pub out_of_frame: i64,
}

impl DeletionCounts {
    /// Count `reads` reads with `n_deleted` deleted bases.  Negative deletions are ignored.
    pub fn add(&mut self, n_deleted: i64, reads: i64) {
        match n_deleted {
            0 => self.no_deletion += reads,
            n if n > 0 && n % 3 == 0 => self.in_frame += reads,
            n if n > 0 => self.out_of_frame += reads,
            _ => (),
        }
    }

    pub fn total(&self) -> i64 {
        self.no_deletion + self.in_frame + self.out_of_frame
    }

    /// The percentage of the total, zero when there are no reads.
    fn percent(&self, count: i64) -> f64 {
        match self.total() {
            0 => 0.0,
            total => count as f64 / total as f64 * 100.0,
        }
    }
}

/// A row in the deletion summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndelSummary {
    pub sample: String,
    pub sgrna: String,
    #[serde(rename = "number of reads with no deletion")]
    pub no_deletion_reads: i64,
    #[serde(rename = "number of reads with in-frame deletion")]
    pub in_frame_deletion_reads: i64,
    #[serde(rename = "number of reads with out-of-frame deletion")]
    pub out_of_frame_deletion_reads: i64,
    #[serde(rename = "percent of reads with no deletion")]
    pub no_deletion_percent: f64,
    #[serde(rename = "percent of reads with in-frame deletion")]
    pub in_frame_deletion_percent: f64,
    #[serde(rename = "percent of reads with out-of-frame deletion")]
    pub out_of_frame_deletion_percent: f64,
}

impl IndelSummary {
    pub fn new(sample: &str, sgrna: &str, counts: DeletionCounts) -> Self {
        Self {
            sample: sample.to_string(),
            sgrna: sgrna.to_string(),
            no_deletion_reads: counts.no_deletion,
            in_frame_deletion_reads: counts.in_frame,
            out_of_frame_deletion_reads: counts.out_of_frame,
            no_deletion_percent: counts.percent(counts.no_deletion),
            in_frame_deletion_percent: counts.percent(counts.in_frame),
            out_of_frame_deletion_percent: counts.percent(counts.out_of_frame),
        }
    }
}

/// The sample name for a table, from the name of its directory.
pub fn sample_name(table: &Path) -> String {
    let dir_name = table
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    SAMPLE_PREFIXES
        .iter()
        .find_map(|prefix| dir_name.strip_prefix(prefix))
        .map_or_else(|| dir_name.clone(), String::from)
}

/// The sgRNA label for a table, the part of its file name after the common prefix.
pub fn sgrna_name(table: &Path) -> String {
    table
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .and_then(|stem| stem.strip_prefix(ALLELE_TABLE_PREFIX).map(String::from))
        .map(|label| label.trim_start_matches('_').to_string())
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| NO_SGRNA.to_string())
}

fn is_allele_table(path: &Path) -> bool {
    path.file_name().map_or(false, |name| {
        let name = name.to_string_lossy();
        name.starts_with(ALLELE_TABLE_PREFIX) && name.ends_with(ALLELE_TABLE_EXTENSION)
    })
}

/// All allele frequency tables at any depth below `root`, sorted by path.
pub fn find_allele_tables<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>> {
    let mut tables = vec![];
    let mut dirs = vec![root.as_ref().to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Unable to list directory: {}", dir.to_string_lossy()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("Unable to list {}", dir.to_string_lossy()))?
                .path();
            if path.is_dir() {
                dirs.push(path);
            } else if is_allele_table(&path) {
                tables.push(path);
            }
        }
    }
    Ok(tables.into_iter().sorted().collect())
}

/// The columns named in the header of a tab-delimited table.
fn read_header(table: &Path) -> Result<Vec<String>> {
    let mut reader = Io::default()
        .new_reader(&table)
        .with_context(|| format!("Failed to open {}", table.to_string_lossy()))?;
    let mut header = String::new();
    reader
        .read_line(&mut header)
        .with_context(|| format!("Failed to read {}", table.to_string_lossy()))?;
    Ok(header.trim_end_matches(&['\r', '\n'][..]).split('\t').map(String::from).collect())
}

/// Summarize one allele frequency table.
pub fn summarize_table<P: AsRef<Path>>(table: P) -> Result<IndelSummary> {
    let table = table.as_ref();
    let header = read_header(table)?;
    let missing = [DELETED_COLUMN, READS_COLUMN]
        .into_iter()
        .filter(|column| !header.iter().any(|h| h == column))
        .sorted()
        .collect::<Vec<_>>();
    ensure!(
        missing.is_empty(),
        "{} missing required columns: {}",
        table.to_string_lossy(),
        missing.join(", ")
    );

    let rows: Vec<AlleleRow> = DelimFile::default()
        .read_tsv(&table)
        .with_context(|| format!("Failed to read {}", table.to_string_lossy()))?;
    let mut counts = DeletionCounts::default();
    for row in &rows {
        counts.add(parse_count(&row.n_deleted), parse_count(&row.reads));
    }
    Ok(IndelSummary::new(&sample_name(table), &sgrna_name(table), counts))
}

/// Summarize every allele frequency table below `root`, in path order.
pub fn summarize_tables<P: AsRef<Path>>(root: P) -> Result<Vec<IndelSummary>> {
    let root = root.as_ref();
    let tables = find_allele_tables(root)?;
    if tables.is_empty() {
        return Err(anyhow!(
            "No {}*{} files found under {}",
            ALLELE_TABLE_PREFIX,
            ALLELE_TABLE_EXTENSION,
            root.to_string_lossy()
        ));
    }
    tables.iter().map(summarize_table).collect()
}

/// Write the summary as a TSV, creating the parent directory if needed.
pub fn write_indel_summary<P: AsRef<Path>>(path: P, rows: &[IndelSummary]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Unable to create directory: {}", parent.to_string_lossy()))?;
    }
    DelimFile::default()
        .write_tsv(&path, rows)
        .with_context(|| format!("Unable to write {}", path.to_string_lossy()))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::fs;

    use fgoxide::io::{DelimFile, Io};
    use rstest::rstest;
    use tempfile::tempdir;

    use super::*;

    const HEADER: &str = "Aligned_Sequence\tReference_Sequence\tUnedited\tn_deleted\t\
                          n_inserted\tn_mutated\t#Reads\t%Reads";

    /// Write a table with one row per `(n_deleted, reads)` pair.
    fn write_table(path: &Path, rows: &[(&str, &str)]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let rows = rows
            .iter()
            .map(|(deleted, reads)| format!("ACGT\tACGT\tFalse\t{}\t0\t0\t{}\t1.0", deleted, reads));
        let lines = std::iter::once(HEADER.to_string()).chain(rows);
        Io::default().write_lines(&path, lines).unwrap();
    }

    #[rstest]
    #[case("12", 12)]
    #[case(" 7 ", 7)]
    #[case("3.0", 3)]
    #[case("", 0)]
    #[case("NA", 0)]
    #[case("nan", 0)]
    fn test_parse_count(#[case] value: &str, #[case] expected: i64) {
        assert_eq!(parse_count(value), expected);
    }

    #[test]
    fn test_deletion_counts() {
        let mut counts = DeletionCounts::default();
        for (deleted, reads) in [(0, 10), (3, 4), (6, 1), (1, 2), (4, 3), (-1, 100)] {
            counts.add(deleted, reads);
        }
        assert_eq!(counts, DeletionCounts { no_deletion: 10, in_frame: 5, out_of_frame: 5 });
        assert_eq!(counts.total(), 20);
        assert!((counts.percent(counts.in_frame) - 25.0).abs() < 1e-9);
        assert_eq!(DeletionCounts::default().percent(0), 0.0);
    }

    #[rstest]
    #[case("/r/CRISPResso_on_crisprseq_S1/Alleles_frequency_table.txt", "S1", "NA")]
    #[case("/r/CRISPResso_on_S2/Alleles_frequency_table_around_sgRNA_ACGT.txt", "S2", "around_sgRNA_ACGT")]
    #[case("/r/crisprseq_S3/Alleles_frequency_table_g1.txt", "S3", "g1")]
    #[case("/r/plain/Alleles_frequency_table__.txt", "plain", "NA")]
    fn test_sample_and_sgrna_names(
        #[case] path: &str,
        #[case] sample: &str,
        #[case] sgrna: &str,
    ) {
        assert_eq!(sample_name(Path::new(path)), sample);
        assert_eq!(sgrna_name(Path::new(path)), sgrna);
    }

    #[test]
    fn test_find_allele_tables_recurses_and_sorts() {
        let dir = tempdir().unwrap();
        let b = dir.path().join("CRISPResso_on_B/Alleles_frequency_table.txt");
        let a = dir.path().join("nested/CRISPResso_on_A/Alleles_frequency_table_g1.txt");
        write_table(&b, &[("0", "1")]);
        write_table(&a, &[("0", "1")]);
        fs::write(dir.path().join("CRISPResso_on_B/Alleles_frequency_table.zip"), "").unwrap();
        fs::write(dir.path().join("CRISPResso_on_B/other.txt"), "").unwrap();

        let tables = find_allele_tables(dir.path()).unwrap();
        assert_eq!(tables, vec![b, a].into_iter().sorted().collect::<Vec<_>>());
    }

    #[test]
    fn test_summarize_table() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("CRISPResso_on_crisprseq_S1/Alleles_frequency_table_g1.txt");
        write_table(&table, &[("0", "40"), ("3", "20"), ("1", "25"), ("2", "5"), ("x", "10")]);

        let summary = summarize_table(&table).unwrap();
        assert_eq!(summary.sample, "S1");
        assert_eq!(summary.sgrna, "g1");
        assert_eq!(summary.no_deletion_reads, 50);
        assert_eq!(summary.in_frame_deletion_reads, 20);
        assert_eq!(summary.out_of_frame_deletion_reads, 30);
        assert!((summary.no_deletion_percent - 50.0).abs() < 1e-9);
        assert!((summary.out_of_frame_deletion_percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_table_missing_columns() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("S1/Alleles_frequency_table.txt");
        fs::create_dir_all(table.parent().unwrap()).unwrap();
        fs::write(&table, "Aligned_Sequence\tn_inserted\nACGT\t0\n").unwrap();
        let err = summarize_table(&table).unwrap_err();
        assert!(err.to_string().contains("missing required columns: #Reads, n_deleted"), "{}", err);
    }

    #[test]
    fn test_summarize_table_without_reads() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("S1/Alleles_frequency_table.txt");
        write_table(&table, &[]);
        let summary = summarize_table(&table).unwrap();
        assert_eq!(summary, IndelSummary::new("S1", "NA", DeletionCounts::default()));
        assert_eq!(summary.no_deletion_percent, 0.0);
    }

    #[test]
    fn test_summarize_tables_requires_a_table() {
        let dir = tempdir().unwrap();
        let err = summarize_tables(dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("No Alleles_frequency_table*.txt files found"));
    }

    #[test]
    fn test_summarize_and_write() {
        let dir = tempdir().unwrap();
        write_table(
            &dir.path().join("CRISPResso_on_S2/Alleles_frequency_table.txt"),
            &[("0", "3"), ("6", "1")],
        );
        write_table(
            &dir.path().join("CRISPResso_on_S1/Alleles_frequency_table.txt"),
            &[("5", "2")],
        );
        let rows = summarize_tables(dir.path()).unwrap();
        assert_eq!(rows.iter().map(|r| r.sample.as_str()).collect::<Vec<_>>(), vec!["S1", "S2"]);

        let output = dir.path().join("out/summary.tsv");
        write_indel_summary(&output, &rows).unwrap();
        let lines = Io::default().read_lines(&output).unwrap();
        assert_eq!(
            lines[0],
            "sample\tsgrna\tnumber of reads with no deletion\tnumber of reads with in-frame deletion\t\
             number of reads with out-of-frame deletion\tpercent of reads with no deletion\t\
             percent of reads with in-frame deletion\tpercent of reads with out-of-frame deletion"
        );
        let read_back: Vec<IndelSummary> = DelimFile::default().read_tsv(&output).unwrap();
        assert_eq!(read_back, rows);
    }
}
