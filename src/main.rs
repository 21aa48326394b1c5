//! upkeep - application deployment and maintenance tracker
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use upkeep::cli::{Cli, Context, dispatch};
use upkeep::core::{Upkeep, logging};
use upkeep::render::error::render_error;
use upkeep::storage::ResolvedConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = cli.effective_format();
    let pretty = cli.pretty;

    let config = ResolvedConfig::resolve(&cli.overrides());

    // Initialize logging: CLI flag, then UPKEEP_LOG, then config file
    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::parse_log_level_from_env)
        .or_else(|| {
            config
                .as_ref()
                .ok()
                .and_then(|c| c.log_level.as_deref())
                .and_then(logging::LogLevel::from_arg)
        })
        .unwrap_or_default();
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::parse_log_format_from_env().unwrap_or_default()
    };
    logging::init(log_level, log_format, logging::parse_log_file_from_env(), cli.verbose);

    let result = match config {
        Ok(config) => run(&cli, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!(code = e.error_code(), "Command failed: {e}");
            eprintln!("{}", render_error(&e, format, pretty));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: &Cli, config: ResolvedConfig) -> upkeep::Result<String> {
    tracing::debug!(
        database = %config.database.display(),
        database_source = %config.sources.database,
        user_source = %config.sources.user,
        "Resolved configuration"
    );
    let ctx = Context {
        upkeep: Upkeep::open(&config)?,
        user: config.user,
        format: cli.effective_format(),
        pretty: cli.pretty,
    };
    dispatch(&cli.command, &ctx).await
}
