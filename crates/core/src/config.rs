//! Installation settings.
//!
//! Settings come from an optional TOML file merged with `ELGG_*` environment
//! variables. The resulting [`SiteConfig`] is handed to each component that
//! needs it; nothing reads configuration from global state.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// SQL flavour spoken by the storage engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Mysql,
}

impl SqlDialect {
    /// LIMIT value standing in for "no limit" when only an offset is wanted.
    pub fn unbounded_limit(&self) -> &'static str {
        match self {
            Self::Sqlite => "-1",
            Self::Mysql => "18446744073709551615",
        }
    }

    /// Tail of an INSERT turning it into an upsert on `conflict_columns`.
    pub fn upsert_clause(&self, conflict_columns: &[&str], update_columns: &[&str]) -> String {
        match self {
            Self::Sqlite => {
                let sets: Vec<String> = update_columns
                    .iter()
                    .map(|c| format!("{c} = excluded.{c}"))
                    .collect();
                format!(
                    "ON CONFLICT({}) DO UPDATE SET {}",
                    conflict_columns.join(", "),
                    sets.join(", ")
                )
            }
            Self::Mysql => {
                let sets: Vec<String> = update_columns
                    .iter()
                    .map(|c| format!("{c} = VALUES({c})"))
                    .collect();
                format!("ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Table name prefix, e.g. `elgg_`.
    #[serde(default = "default_dbprefix")]
    pub dbprefix: String,
    /// SQLite database path. `:memory:` opens a private in-memory database.
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub dialect: SqlDialect,
    /// Writable data directory. Falls back to the datalist table when unset.
    #[serde(default)]
    pub dataroot: Option<PathBuf>,
    #[serde(default)]
    pub wwwroot: Option<String>,
    /// Falls back to the datalist table when unset.
    #[serde(default)]
    pub simplecache_enabled: Option<bool>,
}

fn default_dbprefix() -> String {
    "elgg_".to_string()
}

fn default_database() -> String {
    ":memory:".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            dbprefix: default_dbprefix(),
            database: default_database(),
            dialect: SqlDialect::default(),
            dataroot: None,
            wwwroot: None,
            simplecache_enabled: None,
        }
    }
}

impl SiteConfig {
    /// Load settings from an optional TOML file, overridden by `ELGG_*`
    /// environment variables.
    pub fn load(settings_file: Option<&Path>) -> Result<Self, CoreError> {
        let mut figment = Figment::new();
        if let Some(path) = settings_file {
            figment = figment.merge(Toml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed("ELGG_")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, CoreError> {
        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_empty() {
        let config = SiteConfig::from_figment(Figment::new()).unwrap();
        assert_eq!(config.dbprefix, "elgg_");
        assert_eq!(config.database, ":memory:");
        assert_eq!(config.dialect, SqlDialect::Sqlite);
        assert!(config.dataroot.is_none());
        assert!(config.simplecache_enabled.is_none());
    }

    #[test]
    fn reads_toml_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "dbprefix = \"test_\"\ndataroot = \"/var/elgg/data\"\nsimplecache_enabled = true\ndialect = \"mysql\""
        )
        .unwrap();

        let config = SiteConfig::from_figment(Figment::new().merge(Toml::file(file.path()))).unwrap();
        assert_eq!(config.dbprefix, "test_");
        assert_eq!(config.dialect, SqlDialect::Mysql);
        assert_eq!(config.simplecache_enabled, Some(true));
        assert_eq!(config.dataroot, Some(PathBuf::from("/var/elgg/data")));
    }

    #[test]
    fn load_reads_the_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database = \"/srv/elgg/site.sqlite\"\nwwwroot = \"https://example.org/\"").unwrap();

        let config = SiteConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database, "/srv/elgg/site.sqlite");
        assert_eq!(config.wwwroot.as_deref(), Some("https://example.org/"));
        assert_eq!(config.dbprefix, "elgg_");
    }

    #[test]
    fn dialect_upsert_tails() {
        assert_eq!(
            SqlDialect::Sqlite.upsert_clause(&["name"], &["value"]),
            "ON CONFLICT(name) DO UPDATE SET value = excluded.value"
        );
        assert_eq!(
            SqlDialect::Mysql.upsert_clause(&["name"], &["value"]),
            "ON DUPLICATE KEY UPDATE value = VALUES(value)"
        );
    }
}
