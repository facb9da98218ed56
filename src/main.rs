//! NWP Fetcher CLI application
//!
//! Command-line interface for mirroring numerical weather prediction
//! output and publishing chunked archives. Features concurrent
//! transfers, progress tracking, and comprehensive error handling.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use nwp_fetcher::cli::{
    handle_fetch, handle_init_config, handle_plan, handle_publish, handle_run, handle_validate,
    Cli, Commands,
};
use nwp_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize logging based on verbosity
    init_logging(&cli);

    info!("NWP Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    let config = cli.global.config.clone();
    match cli.command {
        Commands::Plan(args) => handle_plan(config, args).await,
        Commands::Validate(args) => handle_validate(config, args).await,
        Commands::Fetch(args) => handle_fetch(config, args).await,
        Commands::Publish(args) => handle_publish(config, args).await,
        Commands::Run(args) => handle_run(config, args).await,
        Commands::InitConfig(args) => handle_init_config(args).await,
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("nwp_fetcher={}", log_level).parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
