use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite database file. Parent directories are created on open.
    #[serde(default = "d_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: d_db_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    /// Process-local arena; nothing survives a restart.
    Memory,
}

fn d_db_path() -> PathBuf {
    PathBuf::from("./data/agentchain.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_defaults_to_sqlite() {
        let cfg: StoreConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.backend, StoreBackend::Sqlite);
        assert_eq!(cfg.path, PathBuf::from("./data/agentchain.db"));
    }

    #[test]
    fn memory_backend_parses() {
        let cfg: StoreConfig = toml::from_str(r#"backend = "memory""#).unwrap();
        assert_eq!(cfg.backend, StoreBackend::Memory);
    }
}
