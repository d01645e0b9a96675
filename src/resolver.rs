//! Expanding genome-set and explicit genome references into one list.

use crate::config::GenomeLimits;
use crate::error::{Result, WgaError};
use crate::store::ObjectStore;

/// The flat, ordered list of genomes a run aligns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGenomeSet {
    pub refs: Vec<String>,
    /// Container of the genome set, when one was given
    pub container_id: Option<u64>,
}

/// Resolves the run's genome references.
///
/// Genome-set elements come first, in the set's own order, followed by the
/// non-null explicit references. The total must fall within `limits`.
pub fn resolve<S: ObjectStore + ?Sized>(
    store: &S,
    genomeset_ref: Option<&str>,
    genome_refs: &[Option<String>],
    limits: GenomeLimits,
    tool_label: &str,
) -> Result<ResolvedGenomeSet> {
    let explicit: Vec<String> = genome_refs.iter().flatten().cloned().collect();

    // Oversized requests are rejected without touching the store
    check_max(explicit.len(), limits, tool_label)?;

    let mut refs = Vec::new();
    let mut container_id = None;

    if let Some(set_ref) = genomeset_ref {
        log::info!("Loading GenomeSet object from workspace");
        let set = store
            .get_objects(&[set_ref.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| WgaError::fetch(set_ref, "store returned no object"))?;
        container_id = Some(set.info.container_id);

        let elements = set
            .data
            .get("elements")
            .and_then(|e| e.as_object())
            .ok_or_else(|| WgaError::fetch(set_ref, "genome set has no elements"))?;
        for (key, element) in elements {
            let genome_ref = element.get("ref").and_then(|r| r.as_str()).ok_or_else(|| {
                WgaError::fetch(set_ref, format!("element {key} has no genome reference"))
            })?;
            refs.push(genome_ref.to_string());
        }
        log::info!("Genome references from genome set: {refs:?}");
    }

    refs.extend(explicit);
    log::info!("Final list of genome references: {refs:?}");

    if refs.len() < limits.min {
        return Err(WgaError::Validation(format!(
            "Number of genomes should be at least {}, got {}: need at least two genomes to align",
            limits.min,
            refs.len()
        )));
    }
    check_max(refs.len(), limits, tool_label)?;

    Ok(ResolvedGenomeSet { refs, container_id })
}

fn check_max(count: usize, limits: GenomeLimits, tool_label: &str) -> Result<()> {
    if count > limits.max {
        return Err(WgaError::Validation(format!(
            "Number of genomes exceeds {}, which is too many for {}",
            limits.max,
            tool_label.to_lowercase()
        )));
    }
    Ok(())
}
