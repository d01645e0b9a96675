//! The two supported alignment tools and their command-line grammars.
//!
//! Everything that differs between Mugsy and progressiveMauve lives here:
//! the program name, how options become flags, where the native output lands
//! and which format it is in. The rest of the pipeline is tool-agnostic.

use crate::config::GenomeLimits;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Native alignment format written by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multiple Alignment Format (Mugsy)
    Maf,
    /// Extended Multi-FASTA (progressiveMauve)
    Xmfa,
}

/// A whole-genome alignment tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignmentTool {
    Mugsy,
    Mauve,
}

const MUGSY_OPTIONS: &[(&str, &str)] = &[("minlength", "--minlength"), ("distance", "--distance")];

const MAUVE_OPTIONS: &[(&str, &str)] = &[
    ("max_breakpoint_distance_scale", "--max-breakpoint-distance-scale"),
    ("conservation_distance_scale", "--conservation-distance-scale"),
    ("hmm_identity", "--hmm-identity"),
];

impl AlignmentTool {
    /// Executable name looked up on PATH.
    pub fn program(self) -> &'static str {
        match self {
            AlignmentTool::Mugsy => "mugsy",
            AlignmentTool::Mauve => "progressiveMauve",
        }
    }

    /// Human-readable tool name used in reports.
    pub fn label(self) -> &'static str {
        match self {
            AlignmentTool::Mugsy => "Mugsy",
            AlignmentTool::Mauve => "Mauve",
        }
    }

    /// Service method name recorded in provenance and report names.
    pub fn method_name(self) -> &'static str {
        match self {
            AlignmentTool::Mugsy => "run_mugsy",
            AlignmentTool::Mauve => "run_mauve",
        }
    }

    /// Provenance description of the run.
    pub fn method_description(self) -> String {
        format!("whole genome alignment using {}", self.label().to_lowercase())
    }

    /// Identifier stored on the alignment object.
    pub fn alignment_id(self) -> &'static str {
        match self {
            AlignmentTool::Mugsy => "mugsy.aln",
            AlignmentTool::Mauve => "mauve.aln",
        }
    }

    pub fn output_format(self) -> OutputFormat {
        match self {
            AlignmentTool::Mugsy => OutputFormat::Maf,
            AlignmentTool::Mauve => OutputFormat::Xmfa,
        }
    }

    /// Both tools degrade badly past ten inputs.
    pub fn genome_limits(self) -> GenomeLimits {
        GenomeLimits::new(2, 10)
    }

    /// Parameter names this tool understands, paired with their flags.
    pub fn option_flags(self) -> &'static [(&'static str, &'static str)] {
        match self {
            AlignmentTool::Mugsy => MUGSY_OPTIONS,
            AlignmentTool::Mauve => MAUVE_OPTIONS,
        }
    }

    /// Path of the alignment the tool writes into `run_dir`.
    pub fn native_output(self, run_dir: &Path) -> PathBuf {
        match self {
            AlignmentTool::Mugsy => run_dir.join("out.maf"),
            AlignmentTool::Mauve => run_dir.join("out.xmfa"),
        }
    }

    /// File dumped into the report and the section title it is shown under.
    ///
    /// Mauve's XMFA is too bulky to be useful in a report, so its backbone
    /// summary is shown instead.
    pub fn report_dump(self, run_dir: &Path) -> (PathBuf, &'static str) {
        match self {
            AlignmentTool::Mugsy => (run_dir.join("out.maf"), "MAF"),
            AlignmentTool::Mauve => (run_dir.join("out.xmfa.backbone"), "XMFA.backbone"),
        }
    }

    /// Builds the invocation for `inputs` from caller-supplied options.
    ///
    /// Unknown keys in `options` are ignored; known keys are only passed on
    /// when their value is truthy.
    pub fn invocation(
        self,
        run_dir: &Path,
        options: &Map<String, Value>,
        inputs: &[PathBuf],
    ) -> ToolInvocation {
        let option_flags = self
            .option_flags()
            .iter()
            .filter_map(|(key, flag)| {
                options
                    .get(*key)
                    .filter(|v| is_truthy(v))
                    .map(|v| (flag.to_string(), render_value(v)))
            })
            .collect();

        ToolInvocation {
            tool: self,
            base_args: self.base_args(run_dir),
            option_flags,
            input_paths: inputs.to_vec(),
        }
    }

    fn base_args(self, run_dir: &Path) -> Vec<String> {
        match self {
            AlignmentTool::Mugsy => vec![
                "-p".to_string(),
                "out".to_string(),
                "--directory".to_string(),
                run_dir.display().to_string(),
            ],
            AlignmentTool::Mauve => vec![format!(
                "--output={}",
                self.native_output(run_dir).display()
            )],
        }
    }
}

impl fmt::Display for AlignmentTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for AlignmentTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mugsy" => Ok(AlignmentTool::Mugsy),
            "mauve" | "progressivemauve" => Ok(AlignmentTool::Mauve),
            other => Err(format!("unknown alignment tool: {other}")),
        }
    }
}

/// One fully specified tool command.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool: AlignmentTool,
    /// Fixed leading arguments (output location)
    pub base_args: Vec<String>,
    /// Optional `(flag, value)` pairs that passed the truthiness check
    pub option_flags: Vec<(String, String)>,
    /// FASTA inputs, appended positionally
    pub input_paths: Vec<PathBuf>,
}

impl ToolInvocation {
    /// Full argument list, excluding the program itself.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.base_args.clone();
        for (flag, value) in &self.option_flags {
            args.push(flag.clone());
            args.push(value.clone());
        }
        args.extend(self.input_paths.iter().map(|p| p.display().to_string()));
        args
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.tool.program().to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// Whether an option value counts as "set": null, false, zero and empty
/// values do not.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        other => other.to_string(),
    }
}
