//! Command-line argument parsing for NWP Fetcher
//!
//! This module defines the CLI structure using clap derive macros. Cycle
//! selection flags are shared by every pipeline command; each stage adds
//! its own knobs on top.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// NWP Fetcher - Mirror and publish numerical weather prediction output
#[derive(Parser, Debug)]
#[command(
    name = "nwp_fetcher",
    version,
    about = "Mirror NWP forecast cycles between object stores and publish chunked archives",
    long_about = "A pipeline tool for numerical weather prediction output. Validates that a \
forecast cycle is fully available upstream, mirrors its GRIB files with concurrent \
resumable transfers, and publishes chunked (Zarr) archives so readers never see a \
partially-written store."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the file manifest for a cycle without touching any store
    Plan(PlanArgs),

    /// Check whether a cycle is fully available upstream
    Validate(ValidateArgs),

    /// Mirror a cycle's files from the source store to the destination
    Fetch(FetchArgs),

    /// Publish a local chunked archive, control file last
    Publish(PublishArgs),

    /// Validate, fetch, and optionally publish in one invocation
    Run(RunArgs),

    /// Write a commented default configuration file
    InitConfig(InitConfigArgs),
}

/// Cycle selection flags shared by the pipeline commands
#[derive(Args, Debug, Clone)]
pub struct CycleArgs {
    /// Product to process ("gfs", "ecmwf-hres", "ecmwf-ens")
    #[arg(short, long)]
    pub product: Option<String>,

    /// Forecast cycle, e.g. "2024-01-01T00" (defaults to $CYCLE)
    #[arg(short, long, env = "CYCLE")]
    pub cycle: Option<String>,

    /// Grid resolution label, e.g. "0p25"
    #[arg(short, long)]
    pub resolution: Option<String>,

    /// Maximum lead time in hours (defaults to the product ceiling)
    #[arg(short = 'l', long)]
    pub max_lead_time: Option<u32>,

    /// Source kind ("archive" or "realtime"); inferred from the source
    /// bucket when omitted
    #[arg(long)]
    pub source_kind: Option<String>,

    /// Source store root, e.g. "gs://ecmwf-open-data"
    #[arg(long)]
    pub source_root: Option<String>,

    /// Destination root: a bucket URI or a local directory
    #[arg(short, long)]
    pub destination_root: Option<String>,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub cycle: CycleArgs,
}

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub cycle: CycleArgs,

    /// Concurrent existence probes
    #[arg(long)]
    pub probes: Option<usize>,
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub cycle: CycleArgs,

    /// Number of concurrent transfers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Re-transfer files whose destination already exists
    #[arg(short, long)]
    pub force: bool,

    /// Skip the pre-fetch availability check
    #[arg(long)]
    pub no_validate: bool,

    /// Re-probe every destination after the batch finishes
    #[arg(long)]
    pub verify: bool,

    /// Show what would be transferred without transferring
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the publish command
#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Local directory holding the chunked archive
    #[arg(long, value_name = "DIR")]
    pub chunk_dir: Option<PathBuf>,

    /// Destination root for the archive, e.g. "gs://bucket/forecasts/gfs"
    #[arg(long)]
    pub publish_root: Option<String>,

    /// Number of concurrent chunk uploads
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Skip the post-publish destination audit
    #[arg(long)]
    pub no_verify: bool,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Local chunked archive to publish after the fetch completes
    #[arg(long, value_name = "DIR")]
    pub chunk_dir: Option<PathBuf>,

    /// Destination root for the published archive
    #[arg(long)]
    pub publish_root: Option<String>,

    /// Stop after the fetch stage even when a chunk directory is configured
    #[arg(long)]
    pub skip_publish: bool,
}

/// Arguments for init-config
#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the file
    #[arg(default_value = "./nwp-fetcher.toml", value_name = "FILE")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_fetch_command() {
        let cli = Cli::try_parse_from([
            "nwp_fetcher",
            "fetch",
            "--product",
            "gfs",
            "--cycle",
            "2024-01-01T00",
            "--max-lead-time",
            "48",
            "-w",
            "4",
            "--force",
        ])
        .unwrap();

        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.cycle.product.as_deref(), Some("gfs"));
                assert_eq!(args.cycle.max_lead_time, Some(48));
                assert_eq!(args.workers, Some(4));
                assert!(args.force);
            }
            other => panic!("parsed wrong command: {other:?}"),
        }
    }

    #[test]
    fn test_verbosity_maps_to_levels() {
        let cli =
            Cli::try_parse_from(["nwp_fetcher", "--quiet", "plan", "--product", "gfs"]).unwrap();
        assert_eq!(cli.log_level(), tracing::Level::ERROR);

        let cli = Cli::try_parse_from(["nwp_fetcher", "--very-verbose", "plan"]).unwrap();
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_init_config_has_default_path() {
        let cli = Cli::try_parse_from(["nwp_fetcher", "init-config"]).unwrap();
        match cli.command {
            Commands::InitConfig(args) => {
                assert_eq!(args.path, PathBuf::from("./nwp-fetcher.toml"));
                assert!(!args.force);
            }
            other => panic!("parsed wrong command: {other:?}"),
        }
    }
}
