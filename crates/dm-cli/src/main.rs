//! Dualmig CLI - versioned migrations for a relational and a document store

use anyhow::{Context, Result};
use clap::Parser;
use dm_core::Config;
use std::path::Path;

mod cli;
mod commands;
mod context;
mod logging;
mod report;
mod session;

use cli::Cli;
use commands::common::ExitCode;
use context::RuntimeContext;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match run(&cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            let code = match err.downcast_ref::<ExitCode>() {
                Some(ExitCode(code)) => *code,
                None => {
                    eprintln!("Error: {:#}", err);
                    1
                }
            };
            std::process::ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let project_dir = Path::new(&cli.global.project_dir);
    let config = match &cli.global.config {
        Some(path) => Config::load(Path::new(path)).context("Failed to load configuration file")?,
        None => Config::load_from_dir(project_dir).context("Failed to load project configuration")?,
    };
    let environment = Config::resolve_environment(cli.global.environment.as_deref());
    let config = config
        .resolve(&environment)
        .with_context(|| format!("Invalid configuration for environment '{}'", environment))?;

    logging::init(&config.logs_dir(project_dir), cli.global.verbose)?;
    log::info!("Dualmig {} ({})", env!("CARGO_PKG_VERSION"), cli.command.name());

    let ctx = RuntimeContext::connect(project_dir, config, environment).await?;
    let result = session::run(&cli.command, &ctx).await;
    ctx.close().await;

    match result? {
        0 => Ok(()),
        code => Err(ExitCode(code).into()),
    }
}
