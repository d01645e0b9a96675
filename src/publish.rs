//! Persisting the alignment and its report.

use crate::error::{Result, WgaError};
use crate::materialize::MaterializedGenome;
use crate::normalize::AlignmentResult;
use crate::store::{ObjectInfo, ObjectSpec, ObjectStore, ProvenanceAction};
use crate::tool::AlignmentTool;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Store type of the alignment object.
pub const ALIGNMENT_TYPE: &str = "ComparativeGenomics.WholeGenomeAlignment";

/// Store type of the report object.
pub const REPORT_TYPE: &str = "KBaseReport.Report";

/// What a run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub report_name: String,
    /// `container/object/version` of the saved report
    pub report_ref: String,
}

/// An object listed in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedObject {
    #[serde(rename = "ref")]
    pub reference: String,
    pub description: String,
}

/// The hidden report saved alongside the alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub objects_created: Vec<CreatedObject>,
    pub text_message: String,
}

/// Everything the publisher needs from the rest of the run.
#[derive(Debug)]
pub struct PublishRequest<'a> {
    pub tool: AlignmentTool,
    pub container_id: u64,
    pub output_name: &'a str,
    pub workspace_name: &'a str,
    pub report_name: String,
    pub alignment: AlignmentResult,
    pub report_text: String,
    pub provenance: Vec<ProvenanceAction>,
}

/// Builds the provenance attached to everything the run saves.
///
/// Caller-supplied provenance is reused when present; otherwise a single
/// action naming `service_name` and the tool's method is synthesized. Either
/// way the first action's inputs and description are overwritten.
pub fn build_provenance(
    supplied: Option<&[ProvenanceAction]>,
    service_name: &str,
    tool: AlignmentTool,
    method_params: Value,
    input_refs: Vec<String>,
) -> Vec<ProvenanceAction> {
    let mut provenance = match supplied {
        Some(actions) if !actions.is_empty() => actions.to_vec(),
        _ => {
            log::info!("Creating provenance data");
            vec![ProvenanceAction {
                service: Some(service_name.to_string()),
                method: Some(tool.method_name().to_string()),
                method_params: vec![method_params],
                ..Default::default()
            }]
        }
    };
    provenance[0].input_ws_objects = input_refs;
    provenance[0].description = Some(tool.method_description());
    provenance
}

/// Renders the human-readable report.
///
/// Lists each genome by 1-based position, then dumps `dump_path` under a
/// section header, cutting lines longer than `width` and marking them "...".
pub fn build_report_text(
    tool: AlignmentTool,
    genomes: &[MaterializedGenome],
    dump_path: &Path,
    dump_title: &str,
    width: usize,
) -> Result<String> {
    let mut report = format!("Genomes/ContigSets aligned with {}:\n", tool.label());
    for (pos, genome) in genomes.iter().enumerate() {
        report.push_str(&format!("  {}: {}\n", pos + 1, genome.display_name));
    }

    report.push_str(&format!(
        "\n\n============= {dump_title} output =============\n\n"
    ));
    if !dump_path.exists() {
        return Err(WgaError::FileNotFound(dump_path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(dump_path)?);
    for line in reader.lines() {
        report.push_str(&truncate_line(&line?, width));
        report.push('\n');
    }
    Ok(report)
}

/// Cuts `line` to `width` characters, appending "..." when anything was cut.
pub fn truncate_line(line: &str, width: usize) -> String {
    match line.char_indices().nth(width) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

/// Saves the alignment, then the hidden report referencing it.
///
/// Nothing is rolled back if the second save fails.
pub fn publish<S: ObjectStore + ?Sized>(store: &S, request: PublishRequest<'_>) -> Result<RunOutput> {
    let alignment_data = serde_json::to_value(&request.alignment)?;
    let alignment_info = save_single(
        store,
        request.container_id,
        ObjectSpec::new(ALIGNMENT_TYPE, request.output_name, alignment_data)
            .provenance(request.provenance.clone()),
    )?;
    log::info!(
        "Saved alignment {} as {}",
        request.output_name,
        alignment_info.reference()
    );

    let report = Report {
        objects_created: vec![CreatedObject {
            reference: format!("{}/{}", request.workspace_name, request.output_name),
            description: format!("{} whole genome alignment", request.tool.label()),
        }],
        text_message: request.report_text,
    };
    let report_data = serde_json::to_value(&report)?;
    let report_info = save_single(
        store,
        request.container_id,
        ObjectSpec::new(REPORT_TYPE, &request.report_name, report_data)
            .hidden(true)
            .provenance(request.provenance),
    )?;

    Ok(RunOutput {
        report_name: request.report_name,
        report_ref: report_info.reference(),
    })
}

fn save_single<S: ObjectStore + ?Sized>(
    store: &S,
    container_id: u64,
    spec: ObjectSpec,
) -> Result<ObjectInfo> {
    let name = spec.name.clone();
    store
        .save_objects(container_id, vec![spec])?
        .into_iter()
        .next()
        .ok_or_else(|| WgaError::persist(name, "store returned no descriptor"))
}
