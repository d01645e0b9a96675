//! The alignment pipeline: resolve, materialize, run, normalize, publish.

use crate::binary_finder::find_binary;
use crate::config::Config;
use crate::error::{Result, WgaError};
use crate::materialize::materialize;
use crate::normalize::normalize;
use crate::publish::{build_provenance, build_report_text, publish, PublishRequest, RunOutput};
use crate::resolver::resolve;
use crate::runner::{CancelToken, LogSink, OutputSink, ToolRunner};
use crate::store::{ObjectStore, ProvenanceAction};
use crate::tool::AlignmentTool;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

/// Parameters of one run, in the shape callers submit them.
///
/// Tool options (`minlength`, `hmm_identity`, ...) are kept in `options`;
/// each tool picks out the keys it understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    #[serde(default)]
    pub input_genomeset_ref: Option<String>,
    #[serde(default)]
    pub input_genome_refs: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub output_alignment_name: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl RunParams {
    pub fn new(output_alignment_name: impl Into<String>, workspace_name: impl Into<String>) -> Self {
        RunParams {
            output_alignment_name: Some(output_alignment_name.into()),
            workspace_name: Some(workspace_name.into()),
            ..Default::default()
        }
    }

    pub fn genome_set(mut self, reference: impl Into<String>) -> Self {
        self.input_genomeset_ref = Some(reference.into());
        self
    }

    pub fn genome(mut self, reference: impl Into<String>) -> Self {
        self.input_genome_refs
            .get_or_insert_with(Vec::new)
            .push(Some(reference.into()));
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    fn genome_refs(&self) -> &[Option<String>] {
        self.input_genome_refs.as_deref().unwrap_or_default()
    }

    /// Genome set reference followed by the non-null explicit references.
    fn input_refs(&self) -> Vec<String> {
        self.input_genomeset_ref
            .iter()
            .cloned()
            .chain(self.genome_refs().iter().flatten().cloned())
            .collect()
    }

    fn required(&self) -> Result<(&str, &str)> {
        let output = non_empty(&self.output_alignment_name, "output_alignment_name")?;
        let workspace = non_empty(&self.workspace_name, "workspace_name")?;
        Ok((output, workspace))
    }
}

fn non_empty<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(WgaError::Validation(format!("Parameter {name} is required"))),
    }
}

/// Per-call context supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    /// Upstream provenance to extend instead of synthesizing one
    #[serde(default)]
    pub provenance: Option<Vec<ProvenanceAction>>,
}

/// Runs whole-genome alignments against an object store.
#[derive(Debug)]
pub struct WholeGenomeAligner<S> {
    config: Config,
    store: S,
}

impl<S: ObjectStore> WholeGenomeAligner<S> {
    /// Creates an aligner, making sure the scratch directory exists.
    pub fn new(mut config: Config, store: S) -> Result<Self> {
        fs::create_dir_all(&config.scratch_dir)?;
        config.scratch_dir = fs::canonicalize(&config.scratch_dir)?;
        Ok(WholeGenomeAligner { config, store })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn run_mugsy(&self, params: &RunParams, ctx: &CallContext) -> Result<RunOutput> {
        self.run(AlignmentTool::Mugsy, params, ctx)
    }

    pub fn run_mauve(&self, params: &RunParams, ctx: &CallContext) -> Result<RunOutput> {
        self.run(AlignmentTool::Mauve, params, ctx)
    }

    /// Runs `tool`, logging its output through [`LogSink`].
    pub fn run(&self, tool: AlignmentTool, params: &RunParams, ctx: &CallContext) -> Result<RunOutput> {
        self.run_with_sink(tool, params, ctx, &mut LogSink, &CancelToken::new())
    }

    /// Runs `tool`, handing every line it prints to `sink`.
    ///
    /// Cancelling `cancel` from another thread stops the tool and fails this
    /// run with [`WgaError::Cancelled`]. Each run should get its own token.
    pub fn run_with_sink(
        &self,
        tool: AlignmentTool,
        params: &RunParams,
        ctx: &CallContext,
        sink: &mut dyn OutputSink,
        cancel: &CancelToken,
    ) -> Result<RunOutput> {
        log::info!(
            "Running {} with params = {}",
            tool.program(),
            serde_json::to_string(params)?
        );
        let (output_name, workspace_name) = params.required()?;

        let resolved = resolve(
            &self.store,
            params.input_genomeset_ref.as_deref(),
            params.genome_refs(),
            self.config.limits_for(tool),
            tool.label(),
        )?;
        let program = find_binary(tool, &self.config)?;

        let (run_dir, run_id) = self.create_run_dir()?;
        log::info!("Run directory: {}", run_dir.display());

        let materialized = materialize(&self.store, &resolved.refs, &run_dir)?;
        let container_id = resolved
            .container_id
            .or(materialized.first_container_id)
            .ok_or_else(|| WgaError::Validation("Could not determine the output workspace".to_string()))?;

        log::info!("Run {}:", tool.program());
        let invocation = tool.invocation(&run_dir, &params.options, &materialized.fasta_paths());
        let result = ToolRunner::new(program, &self.config.scratch_dir)
            .with_timeout(self.config.tool_timeout)
            .with_cancel(cancel.clone())
            .run(&invocation, sink)?;
        log::debug!(
            "{} finished with {} lines of output",
            tool.program(),
            result.combined_output_lines.len()
        );

        let (dump_path, dump_title) = tool.report_dump(&run_dir);
        let report_text = build_report_text(
            tool,
            &materialized.genomes,
            &dump_path,
            dump_title,
            self.config.report_line_width,
        )?;
        log::debug!("{report_text}");

        let alignment = normalize(tool, &run_dir)?;

        let provenance = build_provenance(
            ctx.provenance.as_deref(),
            &self.config.service_name,
            tool,
            serde_json::to_value(params)?,
            params.input_refs(),
        );

        publish(
            &self.store,
            PublishRequest {
                tool,
                container_id,
                output_name,
                workspace_name,
                report_name: format!("{}.report.{:#x}", tool.method_name(), run_id),
                alignment,
                report_text,
                provenance,
            },
        )
    }

    /// Creates `<scratch>/output.<millis>`, suffixing a counter on collision.
    fn create_run_dir(&self) -> Result<(PathBuf, u64)> {
        let run_id = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let base = self.config.scratch_dir.join(format!("output.{run_id}"));
        let mut candidate = base.clone();
        let mut attempt = 1;
        loop {
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok((candidate, run_id)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    candidate = PathBuf::from(format!("{}.{attempt}", base.display()));
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
