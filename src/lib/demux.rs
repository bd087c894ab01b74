//! Functionality directly related to demultiplexing a FASTQ by primer.
//!
//! The [`Demultiplexer`] streams the records of one input through a [`RecordReader`], asks its
//! [`Matcher`] which primer each read belongs to, and hands matched records to a
//! [`DemuxRouter`].  Unmatched records are dropped.
//!
//! The router writes each record to `{output_dir}/{primer_id}_{source_basename}`.  Output files
//! are opened on first use and appended to, so running twice over the same input into the same
//! directory doubles the content of every output file unless `truncate_existing` is set.

use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use ahash::AHashMap;
use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, warn};

use crate::{
    fastq::{ReadRecord, RecordReader},
    matcher::Matcher,
    metrics::DemuxMetrics,
    utils::{source_basename, BUFSIZE},
};

/// The key identifying one demultiplexed output.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct DemuxTarget {
    pub primer_id: String,
    pub source_basename: String,
}

impl DemuxTarget {
    pub fn new(primer_id: &str, source_basename: &str) -> Self {
        Self { primer_id: primer_id.to_string(), source_basename: source_basename.to_string() }
    }

    /// The output file name, `{primer_id}_{source_basename}`.
    pub fn file_name(&self) -> String {
        format!("{}_{}", self.primer_id, self.source_basename)
    }

    pub fn path<P: AsRef<Path>>(&self, output_dir: P) -> PathBuf {
        output_dir.as_ref().join(self.file_name())
    }
}

/// An output that has been opened during this run.
#[derive(Debug)]
struct OpenTarget {
    path: PathBuf,
    writer: BufWriter<File>,
    records_written: usize,
}

/// Fans records out to one output file per primer id for a single input FASTQ.
///
/// Writers are created lazily and held until [`DemuxRouter::finish`], which flushes them all and
/// reports the first failure.  A router dropped without `finish` (e.g. on an error path) still
/// flushes through [`BufWriter`]'s `Drop`, but any error doing so is lost.
#[derive(Debug)]
pub struct DemuxRouter {
    output_dir: PathBuf,
    source_basename: String,
    truncate_existing: bool,
    /// Keyed by primer id, the source basename being fixed for the router.
    targets: AHashMap<String, OpenTarget>,
}

impl DemuxRouter {
    /// Create a new [`DemuxRouter`].
    ///
    /// If `truncate_existing` is true, any existing output file is truncated the first time it is
    /// opened by this router, otherwise new records are appended to it.
    pub fn new<P: AsRef<Path>>(output_dir: P, source_basename: &str, truncate_existing: bool) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            source_basename: source_basename.to_string(),
            truncate_existing,
            targets: AHashMap::new(),
        }
    }

    pub fn source_basename(&self) -> &str {
        &self.source_basename
    }

    fn open(&self, target: &DemuxTarget) -> Result<OpenTarget> {
        let path = target.path(&self.output_dir);
        let mut options = OpenOptions::new();
        if self.truncate_existing {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options
            .create(true)
            .open(&path)
            .with_context(|| format!("Unable to open file: {}", path.to_string_lossy()))?;
        debug!("Opened {}", path.to_string_lossy());
        Ok(OpenTarget { path, writer: BufWriter::with_capacity(BUFSIZE, file), records_written: 0 })
    }

    /// Append the record to the output for `primer_id`, opening it if needed.
    pub fn route(&mut self, primer_id: &str, record: &ReadRecord) -> Result<()> {
        if !self.targets.contains_key(primer_id) {
            let opened = self.open(&DemuxTarget::new(primer_id, &self.source_basename))?;
            self.targets.insert(primer_id.to_string(), opened);
        }
        if let Some(target) = self.targets.get_mut(primer_id) {
            record
                .write(&mut target.writer)
                .with_context(|| format!("Failed to write to {}", target.path.to_string_lossy()))?;
            target.records_written += 1;
        }
        Ok(())
    }

    /// Consumes [`Self`], flushing every output.  Returns the paths written, sorted.
    ///
    /// Every output is flushed even if an earlier one fails; the first error is returned.
    pub fn finish(self) -> Result<Vec<PathBuf>> {
        let mut first_error = None;
        let mut paths = vec![];
        for (_, mut target) in self.targets {
            let flushed = target
                .writer
                .flush()
                .with_context(|| format!("Failed to flush {}", target.path.to_string_lossy()));
            match flushed {
                Ok(()) => {
                    debug!(
                        "Wrote {} records to {}",
                        target.records_written,
                        target.path.to_string_lossy()
                    );
                    paths.push(target.path);
                }
                Err(err) if first_error.is_none() => first_error = Some(err),
                Err(err) => warn!("{:#}", err),
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(paths.into_iter().sorted().collect()),
        }
    }
}

/// Demultiplexes FASTQ inputs by primer into an output directory.
pub struct Demultiplexer<'a, M: Matcher + ?Sized> {
    matcher: &'a M,
    output_dir: PathBuf,
    truncate_existing: bool,
}

impl<'a, M> Demultiplexer<'a, M>
where
    M: Matcher + ?Sized,
{
    pub fn new<P: AsRef<Path>>(matcher: &'a M, output_dir: P, truncate_existing: bool) -> Self {
        Self { matcher, output_dir: output_dir.as_ref().to_path_buf(), truncate_existing }
    }

    /// Demultiplex the FASTQ at `fastq`, naming outputs after its file name.
    pub fn demultiplex_file<P: AsRef<Path>>(&self, fastq: P) -> Result<DemuxMetrics> {
        let fastq = fastq.as_ref();
        let basename = source_basename(fastq)?;
        let reader = BufReader::with_capacity(
            BUFSIZE,
            File::open(fastq)
                .with_context(|| format!("Failed to open {}", fastq.to_string_lossy()))?,
        );
        self.demultiplex_reader(reader, &basename)
            .with_context(|| format!("Failed to demultiplex {}", fastq.to_string_lossy()))
    }

    /// Demultiplex records from `reader`, naming outputs after `source_basename`.
    ///
    /// Records routed before an error are kept in the outputs, which are flushed on every path.
    pub fn demultiplex_reader<R: BufRead>(
        &self,
        reader: R,
        source_basename: &str,
    ) -> Result<DemuxMetrics> {
        let mut router =
            DemuxRouter::new(&self.output_dir, source_basename, self.truncate_existing);
        let routed = self.route_records(RecordReader::new(reader), &mut router);
        let flushed = router.finish();

        match (routed, flushed) {
            (Ok(metrics), Ok(_)) => Ok(metrics),
            (Err(err), Ok(_)) | (Ok(_), Err(err)) => Err(err),
            (Err(err), Err(flush_err)) => {
                warn!("{:#}", flush_err);
                Err(err)
            }
        }
    }

    fn route_records<R: BufRead>(
        &self,
        records: RecordReader<R>,
        router: &mut DemuxRouter,
    ) -> Result<DemuxMetrics> {
        let panel = self.matcher.panel();
        let mut metrics = DemuxMetrics::new(router.source_basename(), panel.len());
        for record in records {
            let record = record.context("Malformed FASTQ record")?;
            let hit = self.matcher.find(&record.sequence);
            metrics.add(hit);
            if let Some(index) = hit {
                router.route(&panel[index].primer_id, &record)?;
            }
        }
        Ok(metrics)
    }
}
