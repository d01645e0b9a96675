//! Turning tool-native alignments into a stored alignment record.
//!
//! Both formats are first rewritten as gapped ("aligned") FASTA, which is
//! written to `aln.fasta` in the run directory and then parsed.

use crate::error::{Result, WgaError};
use crate::tool::{AlignmentTool, OutputFormat};
use bio::io::fasta;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Source description stored on every alignment.
pub const ALIGNMENT_SOURCE: &str = "User assembled contigs from reads in KBase";

/// File name of the normalized alignment inside the run directory.
pub const ALIGNED_FASTA: &str = "aln.fasta";

/// One aligned (gapped) sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedSequenceRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub length: usize,
    pub sequence: String,
    pub md5: String,
}

impl AlignedSequenceRecord {
    pub fn new(id: String, description: String, sequence: String) -> Self {
        AlignedSequenceRecord {
            name: id.clone(),
            length: sequence.chars().count(),
            md5: md5_hex(sequence.as_bytes()),
            id,
            description,
            sequence,
        }
    }
}

/// The alignment object persisted to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub id: String,
    pub source: String,
    pub source_id: String,
    /// md5 over the concatenated per-sequence md5 hex digests, in order
    pub md5: String,
    pub contigs: Vec<AlignedSequenceRecord>,
}

impl AlignmentResult {
    pub fn new(id: impl Into<String>, contigs: Vec<AlignedSequenceRecord>) -> Self {
        let mut hasher = Md5::new();
        for contig in &contigs {
            hasher.update(contig.md5.as_bytes());
        }
        AlignmentResult {
            id: id.into(),
            source: ALIGNMENT_SOURCE.to_string(),
            source_id: "none".to_string(),
            md5: format!("{:x}", hasher.finalize()),
            contigs,
        }
    }
}

/// Reads the tool's native output from `run_dir`, writes the aligned FASTA
/// next to it and returns the parsed alignment.
pub fn normalize(tool: AlignmentTool, run_dir: &Path) -> Result<AlignmentResult> {
    let native = tool.native_output(run_dir);
    if !native.exists() {
        return Err(WgaError::FileNotFound(native));
    }
    let text = fs::read_to_string(&native)?;

    let format = tool.output_format();
    let aligned = match format {
        OutputFormat::Maf => maf_to_fasta(&text, &format_name(format))?,
        OutputFormat::Xmfa => xmfa_to_fasta(&text),
    };

    let aln_fasta = run_dir.join(ALIGNED_FASTA);
    fs::write(&aln_fasta, &aligned)?;
    log::debug!("Wrote normalized alignment to {}", aln_fasta.display());

    let contigs = parse_aligned_fasta(&aligned)?;
    if contigs.is_empty() {
        return Err(WgaError::Parse {
            format: format_name(format),
            message: format!("no aligned sequences in {}", native.display()),
        });
    }
    log::info!("Parsed {} aligned sequences", contigs.len());
    Ok(AlignmentResult::new(tool.alignment_id(), contigs))
}

/// Parses normalized aligned FASTA into records, in file order.
///
/// Lines before the first header are skipped. The description is the whole
/// header after `>` and the id is its first whitespace-delimited token.
pub fn parse_aligned_fasta(text: &str) -> Result<Vec<AlignedSequenceRecord>> {
    fasta::Reader::new(from_first_header(text).as_bytes())
        .records()
        .map(|record| {
            let record = record.map_err(|e| WgaError::Parse {
                format: "FASTA".to_string(),
                message: e.to_string(),
            })?;
            let description = match record.desc() {
                Some(desc) => format!("{} {desc}", record.id()),
                None => record.id().to_string(),
            };
            let id = description
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            let sequence = String::from_utf8_lossy(record.seq()).into_owned();
            Ok(AlignedSequenceRecord::new(id, description, sequence))
        })
        .collect()
}

fn from_first_header(text: &str) -> &str {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.starts_with('>') {
            return &text[offset..];
        }
        offset += line.len();
    }
    ""
}

/// Rewrites MAF as gapped FASTA: one record per `s` line, a `=` line after
/// each block, then every `=` stripped.
pub fn maf_to_fasta(maf: &str, format: &str) -> Result<String> {
    let mut out = String::new();
    let mut in_block = false;

    for (lineno, line) in maf.lines().enumerate() {
        let line = line.trim_end();
        if line.starts_with('a') && (line.len() == 1 || line[1..].starts_with(char::is_whitespace)) {
            if in_block {
                out.push_str("=\n");
            }
            in_block = true;
        } else if line.is_empty() {
            if in_block {
                out.push_str("=\n");
                in_block = false;
            }
        } else if let Some(fields) = line.strip_prefix("s ") {
            if !in_block {
                return Err(parse_error(format, lineno, "sequence line outside a block"));
            }
            out.push_str(&maf_sequence_record(fields).ok_or_else(|| {
                parse_error(format, lineno, "expected: s src start size strand srcSize text")
            })?);
        }
    }
    if in_block {
        out.push_str("=\n");
    }

    Ok(strip_markers(&out))
}

fn maf_sequence_record(fields: &str) -> Option<String> {
    let parts: Vec<&str> = fields.split_whitespace().collect();
    if parts.len() != 6 {
        return None;
    }
    let start: u64 = parts[1].parse().ok()?;
    let size: u64 = parts[2].parse().ok()?;
    let strand = parts[3];
    let src_size: u64 = parts[4].parse().ok()?;
    Some(format!(
        ">{}:{}-{} {} {}\n{}\n",
        parts[0],
        start.checked_add(1)?,
        start.checked_add(size)?,
        strand,
        src_size,
        parts[5]
    ))
}

/// Blanks `#` comment lines and strips every `=`.
pub fn xmfa_to_fasta(xmfa: &str) -> String {
    let mut out = String::with_capacity(xmfa.len());
    for line in xmfa.lines() {
        if !line.starts_with('#') {
            out.push_str(line);
        }
        out.push('\n');
    }
    strip_markers(&out)
}

fn strip_markers(text: &str) -> String {
    text.replace('=', "")
}

fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

fn format_name(format: OutputFormat) -> String {
    match format {
        OutputFormat::Maf => "MAF".to_string(),
        OutputFormat::Xmfa => "XMFA".to_string(),
    }
}

fn parse_error(format: &str, lineno: usize, message: &str) -> WgaError {
    WgaError::Parse {
        format: format.to_string(),
        message: format!("line {}: {message}", lineno + 1),
    }
}
