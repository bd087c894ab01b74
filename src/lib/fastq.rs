#![forbid(unsafe_code)]
//! A streaming reader over 4-line FASTQ records.
//!
//! Records are assembled by a small state machine ([`RecordState`]) that is fed one line at a
//! time.  A record is started by a line beginning with `@` when nothing is held, and is
//! complete once four lines are held; the next `@` line then emits it and starts the next
//! record.  Anything that does not fit that shape is a [`FastqError`], after which the
//! [`RecordReader`] yields nothing further.
//!
//! Both `\n` and `\r\n` line endings are accepted.  Terminators are stripped from the lines held
//! in a [`ReadRecord`] and [`ReadRecord::write`] always writes `\n`.

use std::io::{BufRead, Write};

use bstr::BString;
use thiserror::Error;

/// The error that may occur while reading FASTQ records.
///
/// All line numbers are 1-based.
#[derive(Error, Debug)]
pub enum FastqError {
    #[error("Io error occurred")]
    Io(#[from] std::io::Error),

    #[error("Expected a record header starting with '@' on line {line}, found: {found}")]
    MissingIdLine { line: usize, found: String },

    #[error("Expected a separator line starting with '+' on line {line}, found: {found}")]
    MissingSeparator { line: usize, found: String },

    #[error("Quality length {quality_len} does not match sequence length {sequence_len} on line {line}")]
    QualityLengthMismatch { line: usize, sequence_len: usize, quality_len: usize },

    #[error("Record starting on line {record_start} has more than four lines, found a fifth on line {line}: {found}")]
    RecordOverrun { record_start: usize, line: usize, found: String },

    #[error("Unexpected empty line on line {line}")]
    EmptyLine { line: usize },

    #[error("Truncated record starting on line {record_start}: found {lines} of 4 lines before the end of input")]
    Truncated { record_start: usize, lines: usize },
}

/// A single FASTQ record, with line terminators removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    /// The header line, including the leading `@`.
    pub id_line: BString,
    /// The bases.
    pub sequence: BString,
    /// The separator line, including the leading `+`.
    pub quality_id_line: BString,
    /// The base qualities.
    pub quality: BString,
}

impl ReadRecord {
    /// The four lines of the record in file order.
    pub fn lines(&self) -> [&BString; 4] {
        [&self.id_line, &self.sequence, &self.quality_id_line, &self.quality]
    }

    /// Write the record as four newline-terminated lines.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for line in self.lines() {
            writer.write_all(line)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// The lines held for the record currently being assembled.
#[derive(Debug, Default)]
pub enum RecordState {
    #[default]
    Empty,
    Have1 { record_start: usize, id_line: BString },
    Have2 { record_start: usize, id_line: BString, sequence: BString },
    Have3 { record_start: usize, id_line: BString, sequence: BString, quality_id_line: BString },
    Have4 { record_start: usize, record: ReadRecord },
}

impl RecordState {
    /// The number of lines currently held.
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Have1 { .. } => 1,
            Self::Have2 { .. } => 2,
            Self::Have3 { .. } => 3,
            Self::Have4 { .. } => 4,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feed the next line (terminator removed) found at `line_number` into the state machine.
    ///
    /// Returns the next state, and the previously held record if this line completed it.
    pub fn advance(
        self,
        line: BString,
        line_number: usize,
    ) -> Result<(Self, Option<ReadRecord>), FastqError> {
        let is_id_line = line.starts_with(b"@");
        match self {
            Self::Empty if is_id_line => {
                Ok((Self::Have1 { record_start: line_number, id_line: line }, None))
            }
            Self::Empty => Err(FastqError::MissingIdLine { line: line_number, found: s(&line) }),
            Self::Have1 { record_start, id_line } => {
                Ok((Self::Have2 { record_start, id_line, sequence: line }, None))
            }
            Self::Have2 { record_start, id_line, sequence } => {
                if line.starts_with(b"+") {
                    Ok((Self::Have3 { record_start, id_line, sequence, quality_id_line: line }, None))
                } else {
                    Err(FastqError::MissingSeparator { line: line_number, found: s(&line) })
                }
            }
            Self::Have3 { record_start, id_line, sequence, quality_id_line } => {
                if line.len() == sequence.len() {
                    let record = ReadRecord { id_line, sequence, quality_id_line, quality: line };
                    Ok((Self::Have4 { record_start, record }, None))
                } else {
                    Err(FastqError::QualityLengthMismatch {
                        line: line_number,
                        sequence_len: sequence.len(),
                        quality_len: line.len(),
                    })
                }
            }
            Self::Have4 { record, .. } if is_id_line => {
                Ok((Self::Have1 { record_start: line_number, id_line: line }, Some(record)))
            }
            Self::Have4 { record_start, .. } => Err(FastqError::RecordOverrun {
                record_start,
                line: line_number,
                found: s(&line),
            }),
        }
    }

    /// Called at the end of input: a complete record is returned, a partial one is an error.
    pub fn finish(self) -> Result<Option<ReadRecord>, FastqError> {
        let lines = self.len();
        match self {
            Self::Empty => Ok(None),
            Self::Have4 { record, .. } => Ok(Some(record)),
            Self::Have1 { record_start, .. }
            | Self::Have2 { record_start, .. }
            | Self::Have3 { record_start, .. } => Err(FastqError::Truncated { record_start, lines }),
        }
    }
}

fn s(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

/// A lazy, forward-only iterator of [`ReadRecord`]s over a line-oriented input.
///
/// The iterator is fused: after the end of input or the first error it only returns `None`.
pub struct RecordReader<R: BufRead> {
    reader: R,
    state: RecordState,
    buffer: Vec<u8>,
    line_number: usize,
    /// The line number of the first of a run of empty lines not yet followed by content.
    pending_empty_line: Option<usize>,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    /// Create a new [`RecordReader`] over the given input.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: RecordState::Empty,
            buffer: Vec::new(),
            line_number: 0,
            pending_empty_line: None,
            done: false,
        }
    }

    /// Read the next line with its terminator removed, or `None` at the end of input.
    fn read_line(&mut self) -> Result<Option<BString>, FastqError> {
        self.buffer.clear();
        if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        let line = self.buffer.strip_suffix(b"\n").unwrap_or(&self.buffer);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Ok(Some(BString::from(line)))
    }

    /// Pull lines until a record is completed, the input ends, or an error is found.
    fn next_record(&mut self) -> Result<Option<ReadRecord>, FastqError> {
        while let Some(line) = self.read_line()? {
            if line.is_empty() {
                // Only trailing empty lines are allowed, so defer judgement until content follows.
                self.pending_empty_line.get_or_insert(self.line_number);
                continue;
            }
            if let Some(empty) = self.pending_empty_line {
                return Err(FastqError::EmptyLine { line: empty });
            }

            let (state, record) = std::mem::take(&mut self.state).advance(line, self.line_number)?;
            self.state = state;
            if record.is_some() {
                return Ok(record);
            }
        }
        std::mem::take(&mut self.state).finish()
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<ReadRecord, FastqError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
