use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    pub database: Option<String>,
    pub busy_wait_ms: Option<u64>,
}

impl StoreConfig {
    /// Database path, falling back to the default inside `base`
    pub fn database_path_in(&self, base: &Path) -> PathBuf {
        match &self.database {
            Some(database) => PathBuf::from(database),
            None => default_database_path_in(base),
        }
    }

    /// Retry budget for busy-database waits
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.busy_wait_ms {
            Some(ms) => RetryPolicy { max_wait: Duration::from_millis(ms) },
            None => RetryPolicy::default(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("lazyrow.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join("lazyrow.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
