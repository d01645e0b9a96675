//! Configuration for alignment runs.
//!
//! A `Config` is built once, handed to [`crate::WholeGenomeAligner`] and never
//! mutated afterwards. Use the builder to override defaults.

use crate::tool::AlignmentTool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Inclusive bounds on the number of genomes a tool accepts in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenomeLimits {
    pub min: usize,
    pub max: usize,
}

impl GenomeLimits {
    pub const fn new(min: usize, max: usize) -> Self {
        GenomeLimits { min, max }
    }
}

/// Configuration for alignment runs.
///
/// # Default Values
/// - `scratch_dir`: `./scratch`
/// - `service_name`: `WholeGenomeAlignment`
/// - `tool_timeout`: None (wait indefinitely)
/// - `report_line_width`: 80
#[derive(Debug, Clone)]
pub struct Config {
    /// Root scratch area; each run creates `output.<millis>` below it
    pub scratch_dir: PathBuf,

    /// Service name recorded in synthesized provenance
    pub service_name: String,

    /// Upper bound on the alignment tool's wall-clock time
    pub tool_timeout: Option<Duration>,

    /// Report dump lines longer than this are cut and suffixed with "..."
    pub report_line_width: usize,

    /// Explicit binary paths, bypassing lookup
    pub binary_overrides: HashMap<AlignmentTool, PathBuf>,

    /// Per-tool genome count bounds replacing the tool's own policy
    pub genome_limits: HashMap<AlignmentTool, GenomeLimits>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scratch_dir: PathBuf::from("scratch"),
            service_name: "WholeGenomeAlignment".to_string(),
            tool_timeout: None,
            report_line_width: 80,
            binary_overrides: HashMap::new(),
            genome_limits: HashMap::new(),
        }
    }
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use wga_rs::Config;
    ///
    /// let config = Config::builder()
    ///     .scratch_dir("/tmp/wga")
    ///     .tool_timeout(Duration::from_secs(3600))
    ///     .build();
    /// assert_eq!(config.report_line_width, 80);
    /// ```
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Genome count bounds for `tool`, honouring overrides.
    pub fn limits_for(&self, tool: AlignmentTool) -> GenomeLimits {
        self.genome_limits
            .get(&tool)
            .copied()
            .unwrap_or_else(|| tool.genome_limits())
    }
}

/// Builder for constructing Config instances.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Sets the root scratch directory.
    pub fn scratch_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = path.into();
        self
    }

    /// Sets the service name written into synthesized provenance.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Kills the alignment tool if it runs longer than `timeout`.
    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout = Some(timeout);
        self
    }

    /// Sets the report dump line width.
    pub fn report_line_width(mut self, width: usize) -> Self {
        assert!(width > 0, "Report line width must be positive");
        self.config.report_line_width = width;
        self
    }

    /// Uses `path` as the executable for `tool`.
    pub fn binary(mut self, tool: AlignmentTool, path: impl Into<PathBuf>) -> Self {
        self.config.binary_overrides.insert(tool, path.into());
        self
    }

    /// Replaces the genome count bounds for `tool`.
    pub fn genome_limits(mut self, tool: AlignmentTool, limits: GenomeLimits) -> Self {
        assert!(
            limits.min <= limits.max,
            "Minimum genome count must not exceed the maximum"
        );
        self.config.genome_limits.insert(tool, limits);
        self
    }

    /// Builds the final Config instance.
    pub fn build(self) -> Config {
        self.config
    }
}
