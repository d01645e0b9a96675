//! # wga-rs: Whole-Genome Alignment Runs
//!
//! This library runs a whole-genome aligner (Mugsy or progressiveMauve) over
//! genomes held in an object store and stores the resulting alignment along
//! with a human-readable report.
//!
//! ## Overview
//!
//! A run goes through five steps, strictly in order:
//! - **Resolve**: expand a genome set and/or explicit genome references into
//!   one ordered list (2 to 10 genomes by default)
//! - **Materialize**: fetch each genome's contigs and write `<n>.fa` files into
//!   a per-run scratch directory
//! - **Invoke**: run the aligner with its tool-specific flags, capturing its
//!   merged stdout/stderr
//! - **Normalize**: turn the native MAF or XMFA output into aligned FASTA and
//!   parse it into an [`AlignmentResult`]
//! - **Publish**: save the alignment and a hidden report, both tagged with
//!   provenance
//!
//! ## Example Usage
//!
//! ```no_run
//! # use anyhow::Result;
//! # fn main() -> Result<()> {
//! use wga_rs::{CallContext, Config, LocalStore, RunParams, WholeGenomeAligner};
//!
//! let store = LocalStore::open("store")?;
//! let config = Config::builder().scratch_dir("scratch").build();
//! let aligner = WholeGenomeAligner::new(config, store)?;
//!
//! let params = RunParams::new("ecoli_alignment", "my_workspace")
//!     .genome("12/3/1")
//!     .genome("12/7/2")
//!     .option("minlength", 30);
//! let output = aligner.run_mugsy(&params, &CallContext::default())?;
//! println!("report at {}", output.report_ref);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - `tool`: the two supported aligners and their command-line grammars
//! - `resolver`, `materialize`, `runner`, `normalize`, `publish`: one module
//!   per pipeline step
//! - `pipeline`: [`WholeGenomeAligner`], which strings the steps together
//! - `store`: the [`ObjectStore`] interface and a directory-backed store
//! - `config`, `error`: configuration and error types

pub mod binary_finder;
pub mod config;
pub mod error;
pub mod materialize;
pub mod normalize;
pub mod pipeline;
pub mod publish;
pub mod resolver;
pub mod runner;
pub mod store;
pub mod tool;

pub use config::{Config, GenomeLimits};
pub use error::{Result, WgaError};
pub use normalize::{AlignedSequenceRecord, AlignmentResult};
pub use pipeline::{CallContext, RunParams, WholeGenomeAligner};
pub use publish::RunOutput;
pub use runner::{CancelToken, LogSink, OutputSink, ToolRunResult};
pub use store::{LocalStore, ObjectInfo, ObjectStore, ProvenanceAction};
pub use tool::{AlignmentTool, OutputFormat};
