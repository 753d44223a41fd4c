//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use pt_core::FormatOptions;
use pt_db::{DEFAULT_TABLE, StoreKind};
use serde::{Deserialize, Serialize};

/// Name of the local fallback document inside `data_dir`.
const LOCAL_FILE_NAME: &str = "playtime.json";

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the local fallback file.
    pub data_dir: PathBuf,
    pub store: StoreConfig,
    pub format: FormatOptions,
}

/// Durable store settings (`[store]` table).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StoreConfig {
    pub enabled: bool,
    pub kind: StoreKind,
    /// Document path for the file-backed store.
    pub path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    /// Location of the relational database.
    pub database: Option<PathBuf>,
    pub username: String,
    pub password: String,
    pub table: String,
    /// Bounded wait on a busy database, in milliseconds.
    pub timeout_ms: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("store", &self.store)
            .field("format", &self.format)
            .finish()
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("enabled", &self.enabled)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("table", &self.table)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs_data_path().unwrap_or_else(|| PathBuf::from(".")),
            store: StoreConfig::default(),
            format: FormatOptions::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: StoreKind::Relational,
            path: None,
            host: "localhost".to_string(),
            port: 3306,
            database: None,
            username: "minecraft".to_string(),
            password: "password".to_string(),
            table: DEFAULT_TABLE.to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (PT_*, nested keys split on `__`)
        figment = figment.merge(Env::prefixed("PT_").split("__"));

        figment.extract()
    }

    /// Path of the local fallback file.
    pub fn local_file_path(&self) -> PathBuf {
        self.data_dir.join(LOCAL_FILE_NAME)
    }

    /// Document path used when `store.kind = "file"`.
    pub fn store_document_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("store.json"))
    }

    /// Database location used when `store.kind = "relational"`.
    pub fn store_database_path(&self) -> PathBuf {
        self.store
            .database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("playtime.db"))
    }
}

/// Returns the platform-specific config directory for pt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("playtime"))
}

/// Returns the platform-specific data directory for pt.
///
/// On Linux: `~/.local/share/playtime`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("playtime"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_dirs_data_path_ends_with_playtime() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "playtime");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.store.enabled);
        assert_eq!(config.store.kind, StoreKind::Relational);
        assert_eq!(config.store.table, "player_playtime");
        assert_eq!(config.format, FormatOptions::default());
        assert_eq!(
            config.local_file_path(),
            config.data_dir.join("playtime.json")
        );
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
data_dir = "/srv/playtime"

[store]
enabled = true
kind = "file"
table = "totals"
timeout-ms = 250

[format]
show-days = false
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/playtime"));
        assert!(config.store.enabled);
        assert_eq!(config.store.kind, StoreKind::File);
        assert_eq!(config.store.table, "totals");
        assert_eq!(config.store.timeout_ms, 250);
        assert_eq!(config.store.host, "localhost");
        assert!(!config.format.show_days);
        assert!(config.format.show_seconds);
        assert_eq!(
            config.store_document_path(),
            PathBuf::from("/srv/playtime/store.json")
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = Config::default();
        config.store.password = "hunter2".to_string();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[redacted]"));
    }
}
