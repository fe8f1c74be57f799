//! TOML configuration file support. CLI flags override anything set here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KbError;

/// Engine configuration, read from an optional `logmend.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path of the persisted knowledge store.
    pub db_path: PathBuf,
    /// Default number of solutions to retrieve per query.
    pub limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from("knowledge_db.json"),
            limit: 5,
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults; a file that
    /// exists but fails to parse is an error (a silently ignored typo would
    /// be worse than a refusal).
    pub fn load(path: &Path) -> Result<Config, KbError> {
        match fs::read_to_string(path) {
            Ok(raw) => {
                let config = toml::from_str(&raw).map_err(|e| KbError::Config {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                debug!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(KbError::Config {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.db_path, PathBuf::from("knowledge_db.json"));
        assert_eq!(config.limit, 5);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parses_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmend.toml");
        fs::write(&path, "limit = 10\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.limit, 10);
        assert_eq!(config.db_path, PathBuf::from("knowledge_db.json"));
    }

    #[test]
    fn test_parses_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmend.toml");
        fs::write(&path, "db_path = \"/var/lib/logmend/db.json\"\nlimit = 3\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/logmend/db.json"));
        assert_eq!(config.limit, 3);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmend.toml");
        fs::write(&path, "limti = 10\n").unwrap();
        assert!(matches!(Config::load(&path), Err(KbError::Config { .. })));
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmend.toml");
        fs::write(&path, "limit = = 10").unwrap();
        assert!(matches!(Config::load(&path), Err(KbError::Config { .. })));
    }
}
