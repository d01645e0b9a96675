use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wga_rs::{AlignmentTool, CallContext, Config, LocalStore, RunParams, WholeGenomeAligner};

#[derive(Parser)]
#[command(name = "wga", version, about = "Whole-genome alignment of stored genomes")]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = ArgAction::Count, help = "Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)")]
    verbosity: u8,
}

#[derive(Subcommand)]
enum Command {
    #[clap(about = "Align genomes with Mugsy")]
    Mugsy(MugsyArgs),
    #[clap(about = "Align genomes with progressiveMauve")]
    Mauve(MauveArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    #[clap(long = "store", value_name = "DIR", help = "Object store directory")]
    store: PathBuf,

    #[clap(long = "scratch", value_name = "DIR", default_value = "scratch")]
    #[clap(help = "Scratch directory for per-run files")]
    scratch: PathBuf,

    #[clap(long = "params", value_name = "JSON", help = "Run parameters file; flags override it")]
    params: Option<PathBuf>,

    #[clap(long = "context", value_name = "JSON", help = "Call context file with upstream provenance")]
    context: Option<PathBuf>,

    #[clap(long = "genomeset", value_name = "REF", help = "Genome set reference")]
    genomeset: Option<String>,

    #[clap(long = "genome", value_name = "REF", help = "Genome or contig set reference (repeatable)")]
    genomes: Vec<String>,

    #[clap(long = "output-name", value_name = "NAME", help = "Name of the alignment object")]
    output_name: Option<String>,

    #[clap(long = "workspace", value_name = "NAME", help = "Workspace name recorded in the report")]
    workspace: Option<String>,

    #[clap(long = "timeout", value_name = "SECONDS", help = "Kill the aligner after this many seconds")]
    timeout: Option<u64>,

    #[clap(long = "binary", value_name = "PATH", help = "Aligner executable to use")]
    binary: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MugsyArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[clap(long = "minlength", value_name = "N")]
    minlength: Option<u64>,

    #[clap(long = "distance", value_name = "N")]
    distance: Option<u64>,
}

#[derive(Args, Debug)]
struct MauveArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[clap(long = "max-breakpoint-distance-scale", value_name = "F")]
    max_breakpoint_distance_scale: Option<f64>,

    #[clap(long = "conservation-distance-scale", value_name = "F")]
    conservation_distance_scale: Option<f64>,

    #[clap(long = "hmm-identity", value_name = "F")]
    hmm_identity: Option<f64>,
}

fn init_verbose(cli: &Cli) {
    let filter_level: LevelFilter = match cli.verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.args()
            )
        })
        .filter_level(filter_level)
        // Aligner output is always shown
        .filter_module("tool", filter_level.max(LevelFilter::Info))
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn run_params(common: &CommonArgs, options: Vec<(&str, Option<Value>)>) -> Result<RunParams> {
    let mut params: RunParams = match &common.params {
        Some(path) => read_json(path)?,
        None => RunParams::default(),
    };
    if let Some(set) = &common.genomeset {
        params = params.genome_set(set.clone());
    }
    for genome in &common.genomes {
        params = params.genome(genome.clone());
    }
    if let Some(name) = &common.output_name {
        params.output_alignment_name = Some(name.clone());
    }
    if let Some(name) = &common.workspace {
        params.workspace_name = Some(name.clone());
    }
    for (key, value) in options {
        if let Some(value) = value {
            params = params.option(key, value);
        }
    }
    Ok(params)
}

fn execute(tool: AlignmentTool, common: &CommonArgs, params: RunParams) -> Result<()> {
    let mut builder = Config::builder().scratch_dir(&common.scratch);
    if let Some(seconds) = common.timeout {
        builder = builder.tool_timeout(Duration::from_secs(seconds));
    }
    if let Some(binary) = &common.binary {
        builder = builder.binary(tool, binary);
    }

    let ctx: CallContext = match &common.context {
        Some(path) => read_json(path)?,
        None => CallContext::default(),
    };

    let store = LocalStore::open(&common.store)
        .with_context(|| format!("Failed to open store {}", common.store.display()))?;
    let aligner = WholeGenomeAligner::new(builder.build(), store)?;
    let output = aligner.run(tool, &params, &ctx)?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn runner() -> Result<()> {
    let cli = Cli::parse();
    init_verbose(&cli);

    log::info!("Running {}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    match &cli.command {
        Command::Mugsy(args) => {
            let params = run_params(
                &args.common,
                vec![
                    ("minlength", args.minlength.map(Value::from)),
                    ("distance", args.distance.map(Value::from)),
                ],
            )?;
            execute(AlignmentTool::Mugsy, &args.common, params)?
        }
        Command::Mauve(args) => {
            let params = run_params(
                &args.common,
                vec![
                    (
                        "max_breakpoint_distance_scale",
                        args.max_breakpoint_distance_scale.map(Value::from),
                    ),
                    (
                        "conservation_distance_scale",
                        args.conservation_distance_scale.map(Value::from),
                    ),
                    ("hmm_identity", args.hmm_identity.map(Value::from)),
                ],
            )?;
            execute(AlignmentTool::Mauve, &args.common, params)?
        }
    }
    log::info!("{} end", env!("CARGO_PKG_NAME"));
    Ok(())
}

fn main() {
    if let Err(e) = runner() {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}
