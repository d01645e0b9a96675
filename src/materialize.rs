//! Writing each genome's contigs to a FASTA file in the run directory.

use crate::error::{Result, WgaError};
use crate::store::{ObjectData, ObjectStore};
use bio::io::fasta;
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A genome written to local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedGenome {
    pub display_name: String,
    pub fasta_path: PathBuf,
}

/// Result of materializing every genome of a run.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub genomes: Vec<MaterializedGenome>,
    /// Container of the first fetched genome
    pub first_container_id: Option<u64>,
}

impl Materialized {
    pub fn fasta_paths(&self) -> Vec<PathBuf> {
        self.genomes.iter().map(|g| g.fasta_path.clone()).collect()
    }
}

/// Short type name of a store type string: `KBaseGenomes.Genome-8.2` is `Genome`.
pub fn type_name(full: &str) -> &str {
    let after_module = full.split_once('.').map_or(full, |(_, rest)| rest);
    after_module.split('-').next().unwrap_or(after_module)
}

/// Fetches every reference and writes `<run_dir>/<pos>.fa` for each, with
/// 1-based positions in input order.
pub fn materialize<S: ObjectStore + ?Sized>(
    store: &S,
    refs: &[String],
    run_dir: &Path,
) -> Result<Materialized> {
    let mut genomes = Vec::with_capacity(refs.len());
    let mut first_container_id = None;

    for (pos, reference) in refs.iter().enumerate() {
        log::info!("Loading Genome object from workspace for ref: {reference}");
        let object = fetch_one(store, reference)?;
        first_container_id.get_or_insert(object.info.container_id);

        let kind = type_name(&object.info.type_name);
        log::debug!("type_name = {kind}");

        let (display_name, contigs) = if kind == "Genome" {
            let scientific_name = object
                .data
                .get("scientific_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let contigset_ref = object
                .data
                .get("contigset_ref")
                .and_then(Value::as_str)
                .ok_or_else(|| WgaError::fetch(reference.as_str(), "genome has no contigset_ref"))?;
            let contigset = fetch_one(store, contigset_ref)?;
            (format!("{scientific_name} ({reference})"), contigset)
        } else {
            (path_label(reference), object)
        };

        let fasta_path = run_dir.join(format!("{}.fa", pos + 1));
        write_contigset(&contigs, &fasta_path)?;
        genomes.push(MaterializedGenome {
            display_name,
            fasta_path,
        });
    }

    log::info!(
        "fasta_files = {:?}",
        genomes.iter().map(|g| &g.fasta_path).collect::<Vec<_>>()
    );
    Ok(Materialized {
        genomes,
        first_container_id,
    })
}

fn fetch_one<S: ObjectStore + ?Sized>(store: &S, reference: &str) -> Result<ObjectData> {
    store
        .get_objects(&[reference.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| WgaError::fetch(reference, "store returned no object"))
}

/// `object (container)` from a `container/object[/version]` reference.
fn path_label(reference: &str) -> String {
    let mut parts = reference.split('/');
    let container = parts.next().unwrap_or_default();
    match parts.next() {
        Some(object) => format!("{object} ({container})"),
        None => reference.to_string(),
    }
}

fn write_contigset(object: &ObjectData, path: &Path) -> Result<()> {
    let contigs = object
        .data
        .get("contigs")
        .and_then(Value::as_array)
        .ok_or_else(|| WgaError::fetch(object.info.reference(), "object has no contigs"))?;

    let mut writer = fasta::Writer::new(File::create(path)?);
    for contig in contigs {
        let id = contig.get("id").and_then(Value::as_str);
        let sequence = contig.get("sequence").and_then(Value::as_str);
        match (id, sequence) {
            (Some(id), Some(sequence)) => writer.write(id, None, sequence.as_bytes())?,
            _ => {
                return Err(WgaError::fetch(
                    object.info.reference(),
                    "contig without id or sequence",
                ))
            }
        }
    }
    writer.flush()?;
    Ok(())
}
