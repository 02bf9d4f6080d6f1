//! casetrack CLI entry point.

use anyhow::Result;
use casetrack::cli::{run, Cli};
use casetrack::config::Config;
use casetrack::db::SqliteStorage;
use casetrack::logging;
use casetrack::storage::Storage;
use clap::Parser;
use std::sync::Arc;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let db_path = cli.database.clone().unwrap_or_else(|| config.database_path());
    debug!(path = %db_path.display(), "opening database");

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&db_path)?);
    run(cli.command, storage).await
}
