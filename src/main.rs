use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use scorpion_etl::instruction::ProcessInstructionSet;
use scorpion_etl::pipeline::{self, RunOptions};
use scorpion_etl::{EtlError, Result, config};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.log_level.as_deref())?;

    match cli.command {
        Command::Run(args) => execute_run(args),
        Command::Validate(args) => {
            let (config, base_dir) = load_config(&args.config)?;
            pipeline::validate(&config, &base_dir)
        }
        Command::Instructions(args) => {
            let (config, _) = load_config(&args.config)?;
            let instructions = ProcessInstructionSet::from_records(&config.process_instructions)?;
            println!("{}", instructions.readout());
            Ok(())
        }
    }
}

fn execute_run(args: RunArgs) -> Result<()> {
    let (config, base_dir) = load_config(&args.config.config)?;
    let options = RunOptions {
        skip_processing: args.skip_processing,
        skip_output: args.skip_output,
    };
    let tables = pipeline::run(&config, &base_dir, options)?;
    info!(tables = tables.len(), "pipeline finished");
    Ok(())
}

/// Relative paths inside the document resolve against its folder.
fn load_config(path: &Path) -> Result<(config::PipelineConfig, PathBuf)> {
    let config = config::load(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Ok((config, base_dir))
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).map_err(|err| EtlError::Logging(err.to_string()))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| EtlError::Logging(err.to_string()))
}

#[derive(Parser)]
#[command(
    name = "scorpion",
    author,
    version,
    about = "Load tabular sources, run declared processing steps, and write the results."
)]
struct Cli {
    /// Log filter such as `info` or `scorpion_etl=debug`; overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the whole pipeline.
    Run(RunArgs),
    /// Check the configuration without reading or writing data files.
    Validate(ConfigArgs),
    /// Print the process instructions as a table.
    Instructions(ConfigArgs),
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Pipeline document (.json, .yaml, or .yml).
    #[arg(long)]
    config: PathBuf,
}

#[derive(clap::Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Load sources but do not run any process instruction.
    #[arg(long)]
    skip_processing: bool,

    /// Do not write any output file.
    #[arg(long)]
    skip_output: bool,
}
