//! Command-line interface components
//!
//! This module contains CLI-specific code for the NWP Fetcher
//! application: argument parsing and the command handlers that wire
//! arguments and configuration into the pipeline stages.

pub mod args;
pub mod commands;

pub use args::{
    Cli, Commands, CycleArgs, FetchArgs, GlobalArgs, InitConfigArgs, PlanArgs, PublishArgs,
    RunArgs, ValidateArgs,
};
pub use commands::{
    handle_fetch, handle_init_config, handle_plan, handle_publish, handle_run, handle_validate,
};
