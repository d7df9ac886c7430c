//! Configuration file handling for hodol.
//!
//! The configuration file is stored at `$HODOL_HOME/config.json`. It holds the settings of both
//! halves of the program: where client commands find the API and which household token they
//! present, and how `hodol serve` listens and which tokens it accepts. The server's SQLite
//! database lives next to it as `$HODOL_HOME/hodol.sqlite`.

use crate::db::Db;
use crate::server::{DEFAULT_ORIGIN, DEFAULT_PORT};
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "hodol";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const HODOL_SQLITE: &str = "hodol.sqlite";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$HODOL_HOME` and from there it loads `$HODOL_HOME/config.json`.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the home directory, an initial `config.json` and an empty, migrated database.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of data directory, e.g. `$HOME/hodol`
    /// - `api_url` - Where client commands reach the API, e.g. `http://localhost:3001/api`
    /// - `token` - The household token client commands present. May be empty.
    ///
    /// # Errors
    /// - Returns an error if `config.json` or the database already exist, or if any file
    ///   operation fails.
    pub async fn create(dir: impl Into<PathBuf>, api_url: &str, token: &str) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the hodol home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!("A config file already exists at '{}'", config_path.display());
        }

        let config_file = ConfigFile {
            api_url: api_url.to_string(),
            token: token.trim().to_string(),
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(HODOL_SQLITE);
        Db::init(&sqlite_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            sqlite_path,
        })
    }

    /// Validates that `hodol_home` and its config file exist, then loads the config file.
    pub async fn load(hodol_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = hodol_home.into();
        if !maybe_relative.is_dir() {
            bail!("Hodol Home is missing '{}'", maybe_relative.display());
        }
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        Ok(Self {
            sqlite_path: root.join(HODOL_SQLITE),
            root,
            config_path,
            config_file,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    /// Opens the server database, migrating it forward if it is behind.
    pub async fn db(&self) -> Result<Db> {
        Db::load(&self.sqlite_path)
            .await
            .context("Unable to load SQLite DB")
    }

    pub fn api_url(&self) -> &str {
        &self.config_file.api_url
    }

    /// The household token presented by client commands. Empty when none is configured.
    pub fn token(&self) -> &str {
        &self.config_file.token
    }

    pub fn port(&self) -> u16 {
        self.config_file.port
    }

    pub fn allowed_origin(&self) -> &str {
        &self.config_file.allowed_origin
    }

    pub fn allowed_tokens(&self) -> &[String] {
        &self.config_file.allowed_tokens
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "hodol",
///   "config_version": 1,
///   "api_url": "http://localhost:3001/api",
///   "token": "hodol",
///   "port": 3001,
///   "allowed_origin": "http://localhost:3000",
///   "allowed_tokens": ["hodol", "doldol"]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
struct ConfigFile {
    /// Application name, should always be "hodol"
    app_name: String,

    config_version: u8,

    /// Base URL of the API used by client commands
    api_url: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    token: String,

    /// Port `hodol serve` listens on
    port: u16,

    /// The browser origin allowed by CORS
    allowed_origin: String,

    /// Tokens the server accepts for writes. Empty means nobody can write.
    allowed_tokens: Vec<String>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            api_url: format!("http://localhost:{DEFAULT_PORT}/api"),
            token: String::new(),
            port: DEFAULT_PORT,
            allowed_origin: DEFAULT_ORIGIN.to_string(),
            allowed_tokens: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from `path`. Missing fields take their default values.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version <= CONFIG_VERSION,
            "The config file version {} is newer than this program supports ({})",
            config.config_version,
            CONFIG_VERSION
        );

        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create_then_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("hodol_home");
        let created = Config::create(&home, "http://example.com/api", " hodol ")
            .await
            .unwrap();
        assert_eq!(created.token(), "hodol");
        assert!(created.sqlite_path().is_file());

        let loaded = Config::load(&home).await.unwrap();
        assert_eq!(loaded.api_url(), "http://example.com/api");
        assert_eq!(loaded.token(), "hodol");
        assert_eq!(loaded.port(), DEFAULT_PORT);
        assert_eq!(loaded.allowed_origin(), DEFAULT_ORIGIN);
        assert!(loaded.allowed_tokens().is_empty());
        assert_eq!(loaded.db().await.unwrap().schema_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_config_create_refuses_existing_home() {
        let dir = TempDir::new().unwrap();
        Config::create(dir.path(), "http://localhost:3001/api", "")
            .await
            .unwrap();
        assert!(Config::create(dir.path(), "http://localhost:3001/api", "")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_config_load_missing_home() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path().join("nope")).await.unwrap_err();
        assert!(err.to_string().contains("Hodol Home is missing"));
        let err = Config::load(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("config file is missing"));
    }

    #[tokio::test]
    async fn test_config_file_minimal_and_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);

        utils::write(
            &path,
            r#"{ "app_name": "hodol", "port": 4000, "allowed_tokens": ["hodol"] }"#,
        )
        .await
        .unwrap();
        let config = ConfigFile::load(&path).await.unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.allowed_tokens, vec!["hodol".to_string()]);
        assert_eq!(config.api_url, ConfigFile::default().api_url);
        assert_eq!(config.token, "");

        utils::write(&path, r#"{ "app_name": "ledger" }"#).await.unwrap();
        let err = ConfigFile::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("Invalid app_name"));
    }

    #[test]
    fn test_config_file_serialization_omits_empty_token() {
        let json = serde_json::to_string(&ConfigFile::default()).unwrap();
        assert!(!json.contains("\"token\""));
        assert!(json.contains("allowed_tokens"));
    }
}
