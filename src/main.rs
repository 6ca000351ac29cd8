use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tensor_buckets::{logging, BucketPlan, Config, Manifest};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "tbuckets")]
#[command(about = "Plan and inspect size-bounded tensor buckets", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the chunk plan for a tensor manifest
    Plan {
        /// Manifest file (.json, .yaml, .yml or .safetensors)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Chunk size limit in bytes (overrides the configuration)
        #[arg(short, long, env = "TBUCKETS_LIMIT")]
        limit: Option<usize>,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Config {
        /// Configuration file to validate
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show system information
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Plan {
            config: Some(path), ..
        } => Some(
            Config::from_file(path)
                .with_context(|| format!("Failed to load configuration file {}", path.display()))?,
        ),
        _ => None,
    };
    let base_level = config
        .as_ref()
        .map(|c| c.system.log_level.to_ascii_lowercase());
    logging::init_logging(cli.verbose, cli.quiet, cli.log_json, base_level.as_deref())?;

    match cli.command {
        Commands::Plan {
            manifest,
            limit,
            json,
            ..
        } => {
            plan(manifest, limit, config.unwrap_or_default(), json)?;
        }

        Commands::Config { file } => {
            validate_config(file)?;
        }

        Commands::Info => {
            show_system_info();
        }
    }

    Ok(())
}

fn plan(manifest_path: PathBuf, limit: Option<usize>, config: Config, json: bool) -> Result<()> {
    let size_limit = limit.unwrap_or(config.bucket.size_limit_bytes);
    debug!("Using chunk size limit of {} bytes", size_limit);

    let manifest = Manifest::from_file(&manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;
    let plan = manifest
        .plan(size_limit)
        .context("Failed to compute chunk plan")?;

    info!(
        "{} tensors ({} bytes) in {} chunks",
        manifest.tensors.len(),
        manifest.total_bytes(),
        plan.len()
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan, size_limit);
    }

    Ok(())
}

fn print_plan(plan: &[BucketPlan], size_limit: usize) {
    println!("{:>5}  {:<20} {:>12}  tensors", "chunk", "type", "bytes");
    for bucket in plan {
        let marker = if bucket.bytes > size_limit { " (oversized)" } else { "" };
        println!(
            "{:>5}  {:<20} {:>12}  {}{}",
            bucket.index,
            bucket.tensor_type,
            bucket.bytes,
            bucket.tensors.join(", "),
            marker
        );
    }
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    info!("Validating configuration file: {}", config_path.display());

    let config = Config::from_file(&config_path)
        .context("Failed to load configuration file")?;

    println!("Configuration is valid");
    println!("  bucket size limit: {} bytes", config.bucket.size_limit_bytes);
    println!("  parallel: {}", config.bucket.parallel);
    println!("  threads: {}", config.system.num_threads);
    println!("  log level: {}", config.system.log_level);

    Ok(())
}

fn show_system_info() {
    let config = Config::default();

    println!("tbuckets {}", env!("CARGO_PKG_VERSION"));
    println!("  default bucket size: {} bytes", config.bucket.size_limit_bytes);
    println!("  CPU cores: {}", num_cpus::get());
    println!("  rayon threads: {}", rayon::current_num_threads());
    println!("  cuda support: {}", candle_core::utils::cuda_is_available());
    println!("  metal support: {}", candle_core::utils::metal_is_available());
}
