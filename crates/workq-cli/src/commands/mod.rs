pub mod info;
pub mod list;
pub mod push;
pub mod run;

use anyhow::{Context, Result};
use workq_persist::{SqliteConfig, SqliteJobStore};

/// Open (and migrate) the jobs database
pub async fn open_store(database_url: &str) -> Result<SqliteJobStore> {
    SqliteJobStore::connect(&SqliteConfig::with_url(database_url))
        .await
        .with_context(|| format!("Unable to open job store at {database_url}"))
}
