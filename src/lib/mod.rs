//! A library of functionality for demultiplexing FASTQ files by amplicon primer pair.
//!
//! # Overview
//!
//! The flow of data is as follows:
//!
//! - The [`primer_panel`] is loaded from the annotation table, and a [`matcher::Matcher`] is
//!   built from it, expanding each primer pair into its [`matcher::OrientationSet`].
//! - The [`fastq::RecordReader`] streams 4-line records from each input FASTQ in turn.
//! - The [`demux::Demultiplexer`] asks the matcher which primer each read belongs to, and its
//!   [`demux::DemuxRouter`] appends matched records to one output file per primer id.
//! - [`metrics`] are collected per input and optionally written as a TSV.
//! - The [`count_matrix`] module summarizes a directory of demultiplexed FASTQs as a table of
//!   read counts per primer and input.
//! - The [`indel_summary`] module summarizes the deletions in CRISPResso allele frequency tables
//!   produced downstream from the demultiplexed FASTQs.
#![deny(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]
pub mod count_matrix;
pub mod demux;
pub mod fastq;
pub mod indel_summary;
pub mod matcher;
pub mod metrics;
pub mod opts;
pub mod primer_panel;
pub mod run;
pub mod sequence;
pub mod utils;
