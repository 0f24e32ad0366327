//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/annodb/config.toml)
//! 3. Environment variables (ANNODB_* prefix)
//!
//! Environment variables take precedence over config file values. A store
//! path given on the command line takes precedence over all of them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage::StoreTarget;

/// Environment variable prefix
const ENV_PREFIX: &str = "ANNODB";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Store used when none is given explicitly (a path or `:memory:`)
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Log level for the annodb crates (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (ANNODB_DATABASE, ANNODB_LOG_LEVEL)
    /// 2. Config file (~/.config/annodb/config.toml or ANNODB_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::from_io(e, path.to_path_buf()))?;
            toml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(toml_content)
            .map_err(|e| Error::Config(format!("Failed to parse config TOML: {}", e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // ANNODB_DATABASE
        if let Ok(val) = std::env::var(format!("{}_DATABASE", ENV_PREFIX)) {
            self.database = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        // ANNODB_LOG_LEVEL
        if let Ok(val) = std::env::var(format!("{}_LOG_LEVEL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.log_level = val;
            }
        }
    }

    /// Pick the store for this invocation
    ///
    /// An explicit argument wins over the configured database. Having neither
    /// is a configuration error, reported before any file is touched.
    pub fn resolve_target(&self, explicit: Option<&str>) -> Result<StoreTarget> {
        if let Some(arg) = explicit.filter(|a| !a.is_empty()) {
            return Ok(StoreTarget::parse(arg));
        }
        match &self.database {
            Some(path) => Ok(StoreTarget::parse(&path.to_string_lossy())),
            None => Err(Error::Config(
                "Specify database: pass a database path (or :memory:) as the first argument"
                    .to_string(),
            )),
        }
    }

    /// Get the config file path
    ///
    /// Can be overridden with ANNODB_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("annodb")
            .join("config.toml")
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &["ANNODB_DATABASE", "ANNODB_LOG_LEVEL"];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.is_none());
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_env_override_database() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("ANNODB_DATABASE", "/tmp/annotations.annodb");
        config.apply_env_overrides();
        assert_eq!(
            config.database,
            Some(PathBuf::from("/tmp/annotations.annodb"))
        );

        // Empty string clears it
        env::set_var("ANNODB_DATABASE", "");
        config.apply_env_overrides();
        assert!(config.database.is_none());
    }

    #[test]
    fn test_env_override_log_level() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("ANNODB_LOG_LEVEL", "debug");
        config.apply_env_overrides();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            database = "/data/corpus.annodb"
            log_level = "info"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.database, Some(PathBuf::from("/data/corpus.annodb")));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_from_str_invalid() {
        let _guard = EnvGuard::new(ENV_VARS);

        let err = Config::load_from_str("database = [1, 2").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/annodb/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_resolve_target_prefers_explicit() {
        let config = Config {
            database: Some(PathBuf::from("/configured.annodb")),
            ..Config::default()
        };

        let target = config.resolve_target(Some("/explicit.annodb")).unwrap();
        assert_eq!(target, StoreTarget::File(PathBuf::from("/explicit.annodb")));

        let target = config.resolve_target(None).unwrap();
        assert_eq!(target, StoreTarget::File(PathBuf::from("/configured.annodb")));
    }

    #[test]
    fn test_resolve_target_memory_sentinel() {
        let config = Config::default();
        let target = config.resolve_target(Some(":memory:")).unwrap();
        assert_eq!(target, StoreTarget::Memory);
    }

    #[test]
    fn test_resolve_target_missing_is_config_error() {
        let config = Config::default();
        let err = config.resolve_target(None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("Specify database"));
    }

    #[test]
    fn test_serialization() {
        let config = Config {
            database: Some(PathBuf::from("/data/corpus.annodb")),
            log_level: "debug".to_string(),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("database"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
