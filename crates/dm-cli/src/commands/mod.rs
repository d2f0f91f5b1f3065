//! CLI command implementations

pub(crate) mod clean;
pub(crate) mod common;
pub(crate) mod history;
pub(crate) mod info;
pub(crate) mod migrate;
pub(crate) mod validate;

use anyhow::Result;

use crate::cli::Commands;
use crate::context::RuntimeContext;
use common::CommandOutcome;

/// Run one command against an open context.
pub(crate) async fn dispatch(command: &Commands, ctx: &RuntimeContext) -> Result<CommandOutcome> {
    match command {
        Commands::Migrate => migrate::execute(ctx).await,
        Commands::Info => info::execute(ctx).await,
        Commands::Validate => validate::execute(ctx).await,
        Commands::History(args) => history::execute(args, ctx).await,
        Commands::Clean(args) => clean::execute(args, ctx).await,
    }
}
