mod record;
mod repository;
mod sqlite;

pub use record::Record;
pub use repository::{LiveQuery, Repository};
pub use sqlite::SqliteStorage;

use crate::config::KismetConfig;
use crate::error::Result;

/// Open the save store at the configured path (or the default one).
pub fn open_from_config(config: &KismetConfig) -> Result<SqliteStorage> {
    let path = config.database_path()?;
    tracing::debug!(path = %path.display(), "opening save store");
    SqliteStorage::open(&path)
}
