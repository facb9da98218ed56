//! Command handlers for NWP Fetcher CLI
//!
//! This module implements the command handlers that coordinate between
//! CLI arguments, the configuration file, and the pipeline stages.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::app::{
    AvailabilityReport, ChunkSet, CycleRequest, FetchEngine, Manifest, Product, PublishEngine,
    SourceKind, StoreClient, StoreUri, Validator,
};
use crate::cli::{
    CycleArgs, FetchArgs, InitConfigArgs, PlanArgs, PublishArgs, RunArgs, ValidateArgs,
};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the plan command
///
/// Derives the cycle manifest and prints it without touching any store.
pub async fn handle_plan(config_path: Option<PathBuf>, args: PlanArgs) -> Result<()> {
    let config = load_config(config_path).await?;
    let request = build_request(&config, &args.cycle)?;
    let manifest = request.schedule();

    print_plan(&manifest);
    Ok(())
}

/// Handle the validate command
///
/// Probes the upstream store and reports whether the cycle can be
/// fetched in full. Exits non-zero when it cannot.
pub async fn handle_validate(config_path: Option<PathBuf>, args: ValidateArgs) -> Result<()> {
    let config = load_config(config_path).await?;
    let request = build_request(&config, &args.cycle)?;
    let manifest = request.schedule();

    let client = Arc::new(StoreClient::new());
    let mut validator = Validator::new(client);
    if let Some(probes) = args.probes {
        validator = validator.with_probe_concurrency(probes);
    }

    let spinner = spinner(format!(
        "Probing {} files for {} cycle {}...",
        manifest.len(),
        manifest.product(),
        request.cycle_start().format("%Y-%m-%dT%HZ")
    ));
    let report = validator.validate(&manifest).await?;
    spinner.finish_and_clear();

    match &report {
        AvailabilityReport::Complete => {
            println!(
                "Cycle {} is complete upstream: all {} files available.",
                request.cycle_start().format("%Y-%m-%dT%HZ"),
                manifest.len()
            );
            Ok(())
        }
        AvailabilityReport::MissingFiles {
            required,
            available,
            sentinel_missing,
        } => {
            println!(
                "Cycle is not yet complete: {} of {} files available.",
                available.len(),
                manifest.len()
            );
            if !required.is_empty() {
                println!("Missing lead times: {}", format_leads(required));
            }
            if *sentinel_missing {
                println!("Completion marker not yet present; the cycle may still be uploading.");
            }
            report.ensure_complete().map_err(AppError::from)
        }
    }
}

/// Handle the fetch command
pub async fn handle_fetch(config_path: Option<PathBuf>, args: FetchArgs) -> Result<()> {
    let config = load_config(config_path).await?;
    run_fetch(&config, &args).await?;
    Ok(())
}

/// Handle the publish command
pub async fn handle_publish(config_path: Option<PathBuf>, args: PublishArgs) -> Result<()> {
    let config = load_config(config_path).await?;
    let chunk_dir = args
        .chunk_dir
        .clone()
        .or_else(|| config.stores.chunk_dir.clone())
        .ok_or_else(|| {
            AppError::generic("No chunk directory. Use --chunk-dir or set stores.chunk_dir")
        })?;
    let publish_root = args
        .publish_root
        .clone()
        .or_else(|| config.stores.publish_root.clone())
        .ok_or_else(|| {
            AppError::generic("No publish root. Use --publish-root or set stores.publish_root")
        })?;

    run_publish(&config, &args, &chunk_dir, &publish_root).await?;
    Ok(())
}

/// Handle the run command: validate, fetch, then publish when a chunk
/// directory and publish root are configured.
pub async fn handle_run(config_path: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let start = Instant::now();
    let config = load_config(config_path).await?;

    run_fetch(&config, &args.fetch).await?;

    let chunk_dir = args
        .chunk_dir
        .clone()
        .or_else(|| config.stores.chunk_dir.clone());
    let publish_root = args
        .publish_root
        .clone()
        .or_else(|| config.stores.publish_root.clone());

    match (chunk_dir, publish_root) {
        _ if args.skip_publish => {
            info!("publish stage skipped by --skip-publish");
        }
        (Some(dir), Some(root)) => {
            let publish_args = PublishArgs {
                chunk_dir: None,
                publish_root: None,
                workers: None,
                no_verify: false,
            };
            run_publish(&config, &publish_args, &dir, &root).await?;
        }
        _ => {
            info!("no chunk directory and publish root configured, skipping publish stage");
        }
    }

    println!("Pipeline finished in {:.1?}.", start.elapsed());
    Ok(())
}

/// Handle init-config
pub async fn handle_init_config(args: InitConfigArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        return Err(AppError::generic(format!(
            "{} already exists. Pass --force to overwrite it",
            args.path.display()
        )));
    }

    AppConfig::write_default(&args.path).await?;
    println!("Wrote default configuration to {}", args.path.display());
    println!("Edit it to set your product, stores, and concurrency.");
    Ok(())
}

/// Shared fetch path for the fetch and run commands
async fn run_fetch(config: &AppConfig, args: &FetchArgs) -> Result<()> {
    let request = build_request(config, &args.cycle)?;
    let manifest = request.schedule();
    let client = Arc::new(StoreClient::new());

    if args.dry_run {
        print_plan(&manifest);
        println!("Dry run: nothing transferred.");
        return Ok(());
    }

    if config.workflow.validate_before_fetch && !args.no_validate {
        let spinner = spinner(format!(
            "Validating {} upstream files...",
            manifest.len()
        ));
        let report = Validator::new(Arc::clone(&client)).validate(&manifest).await?;
        spinner.finish_and_clear();
        report.ensure_complete()?;
        info!("upstream cycle is complete, starting transfers");
    }

    let mut fetch_config = config.to_fetch_config();
    if args.force {
        fetch_config.overwrite = true;
    }
    if let Some(workers) = args.workers {
        fetch_config.concurrency = workers;
    }

    let engine = FetchEngine::new(Arc::clone(&client), fetch_config);
    let bar = progress_bar(manifest.len() as u64);
    let report = engine.fetch_with_progress(&manifest, Some(&bar)).await;
    bar.finish_and_clear();

    println!("Fetch: {}", report.summary());

    if args.verify || config.fetch.verify {
        let missing = engine.verify(&manifest).await.map_err(AppError::from)?;
        if !missing.is_empty() {
            return Err(AppError::generic(format!(
                "{} destinations missing after fetch",
                missing.len()
            )));
        }
        println!("Verified all {} destinations present.", manifest.len());
    }

    if !report.is_complete() {
        return Err(AppError::generic(format!(
            "{} transfers failed; re-run to resume from existing destinations",
            report.failed.len()
        )));
    }
    Ok(())
}

/// Shared publish path for the publish and run commands
async fn run_publish(
    config: &AppConfig,
    args: &PublishArgs,
    chunk_dir: &PathBuf,
    publish_root: &str,
) -> Result<()> {
    let chunk_set = ChunkSet::from_dir(chunk_dir)?;
    info!(
        chunks = chunk_set.len(),
        bytes = chunk_set.total_bytes(),
        "scanned chunk set at {}",
        chunk_dir.display()
    );

    let mut publish_config = config.to_publish_config();
    if let Some(workers) = args.workers {
        publish_config.concurrency = workers;
    }
    if args.no_verify {
        publish_config.verify = false;
    }

    let engine = PublishEngine::new(Arc::new(StoreClient::new()), publish_config);
    let bar = progress_bar(chunk_set.len() as u64 + 1);
    let report = engine
        .publish_with_progress(&chunk_set, publish_root, Some(&bar))
        .await?;
    bar.finish_and_clear();

    println!(
        "Published {} chunks ({} bytes); archive live at {}",
        report.chunks_published, report.bytes_published, report.control_uri
    );
    if report.verified {
        println!("Destination listing verified against the chunk set.");
    }
    Ok(())
}

async fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig> {
    let config = AppConfig::load(config_path).await?;
    config.validate()?;
    Ok(config)
}

/// Merge CLI flags over config defaults into a validated cycle request
fn build_request(config: &AppConfig, args: &CycleArgs) -> Result<CycleRequest> {
    let product_name = args
        .product
        .clone()
        .or_else(|| config.workflow.product.clone())
        .ok_or_else(|| {
            AppError::generic("No product specified. Use --product or set workflow.product")
        })?;
    let product = Product::from_str(&product_name)?;

    let resolution = args
        .resolution
        .clone()
        .unwrap_or_else(|| config.workflow.resolution.clone());
    let cycle = config.resolve_cycle(args.cycle.as_deref())?;

    let explicit_kind = match args
        .source_kind
        .as_deref()
        .or(config.workflow.source_kind.as_deref())
    {
        Some(raw) => Some(SourceKind::from_str(raw)?),
        None => None,
    };
    let source_root = args
        .source_root
        .clone()
        .or_else(|| config.stores.source_root.clone());

    // The lead-time ceiling differs between archive and realtime feeds,
    // so resolve the effective kind before defaulting max_lead_time.
    let effective_kind = match explicit_kind {
        Some(kind) => kind,
        None => match &source_root {
            Some(root) => {
                SourceKind::infer_from_bucket(&StoreUri::parse(root).map_err(AppError::from)?.bucket)
            }
            None => SourceKind::Archive,
        },
    };
    let max_lead_time = args
        .max_lead_time
        .or(config.workflow.max_lead_time)
        .unwrap_or_else(|| product.ceiling(effective_kind));

    let mut request = CycleRequest::new(product, &resolution, cycle, max_lead_time)?;
    if let Some(kind) = explicit_kind {
        request = request.with_source_kind(kind)?;
    }
    if let Some(root) = &source_root {
        request = request.with_source_root(root)?;
    }
    let destination = args
        .destination_root
        .clone()
        .unwrap_or_else(|| config.stores.destination_root.clone());
    request = request.with_destination_root(&destination);

    Ok(request)
}

fn print_plan(manifest: &Manifest) {
    println!(
        "Plan for {} cycle {}: {} files",
        manifest.product(),
        manifest.cycle_start().format("%Y-%m-%dT%HZ"),
        manifest.len()
    );
    for file in manifest.files() {
        println!(
            "  f{:03}  {}  ->  {}",
            file.lead_time, file.source_uri, file.destination_uri
        );
    }
    match (manifest.sentinel_uri(), manifest.discovery_prefix()) {
        (Some(sentinel), _) => println!("Completion marker: {}", sentinel),
        (None, Some(prefix)) => println!("Availability checked by listing: {}", prefix),
        (None, None) => println!("Cycle reaches the product ceiling; no completion marker."),
    }
}

/// Render lead-time hours compactly: "3, 6, 9"
fn format_leads(leads: &[u32]) -> String {
    leads
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    bar
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn base_args() -> CycleArgs {
        CycleArgs {
            product: Some("gfs".to_string()),
            cycle: Some("2024-01-01T06".to_string()),
            resolution: None,
            max_lead_time: Some(12),
            source_kind: None,
            source_root: None,
            destination_root: None,
        }
    }

    #[test]
    fn test_build_request_merges_cli_over_config() {
        let mut config = AppConfig::default();
        config.workflow.resolution = "0p50".to_string();
        config.stores.destination_root = "mem://mirror".to_string();

        let request = build_request(&config, &base_args()).unwrap();
        assert_eq!(request.product(), Product::Gfs);
        assert_eq!(request.resolution(), "0p50");
        assert_eq!(request.cycle_start().hour(), 6);
        assert_eq!(request.cycle_start().day(), 1);
        assert_eq!(request.max_lead_time(), 12);
    }

    #[test]
    fn test_build_request_defaults_max_lead_to_ceiling() {
        let mut args = base_args();
        args.max_lead_time = None;
        let request = build_request(&AppConfig::default(), &args).unwrap();
        assert_eq!(request.max_lead_time(), 384);
    }

    #[test]
    fn test_build_request_realtime_kind_lowers_ceiling() {
        let mut args = base_args();
        args.product = Some("ecmwf-hres".to_string());
        args.cycle = Some("2024-01-01T00".to_string());
        args.max_lead_time = None;
        args.source_kind = Some("realtime".to_string());

        let request = build_request(&AppConfig::default(), &args).unwrap();
        assert_eq!(request.max_lead_time(), 90);
    }

    #[test]
    fn test_build_request_requires_product() {
        let mut args = base_args();
        args.product = None;
        assert!(build_request(&AppConfig::default(), &args).is_err());
    }

    #[test]
    fn test_build_request_rejects_unknown_source_kind() {
        let mut args = base_args();
        args.source_kind = Some("streaming".to_string());
        assert!(build_request(&AppConfig::default(), &args).is_err());
    }
}
