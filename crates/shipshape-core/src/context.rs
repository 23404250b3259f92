use crate::config::AppConfig;
use crate::error::Error;
use crate::registry::Database;

/// Everything a component needs: configuration plus the registry handle.
/// Passed explicitly to each component — there is no global state.
pub struct AppContext {
    pub config: AppConfig,
    pub db: Database,
}

impl AppContext {
    pub fn new(config: AppConfig, db: Database) -> Self {
        Self { config, db }
    }

    pub fn open(config: AppConfig, db_path: &str) -> Result<Self, Error> {
        let db = Database::open(db_path)?;
        Ok(Self { config, db })
    }

    /// In-memory registry, used by tests and dry-run tooling.
    pub fn open_in_memory(config: AppConfig) -> Result<Self, Error> {
        let db = Database::open_in_memory()?;
        Ok(Self { config, db })
    }
}
