//! Loading of the optional `cafs.toml` configuration file.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;

/// The name of the configuration file looked up in the platform config
/// directory.
const CONFIG_FILE_NAME: &str = "cafs.toml";

/// Settings read from the configuration file. Every field is optional.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    /// The root directory of the store.
    pub store_dir: Option<PathBuf>,

    /// Whether to sync written files to disk before committing them.
    pub fsync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: None,
            fsync: true,
        }
    }
}

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read configuration file '{}'", .0.display())]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse configuration file '{}'", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("could not determine the store directory, pass --store-dir or set CAFS_STORE_DIR")]
    #[diagnostic(help("the store directory defaults to the platform data directory"))]
    NoStoreDir,
}

impl Config {
    /// Loads the configuration from `path`, or from the default location if no
    /// path is given. A missing default file yields the default configuration,
    /// a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_path(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs_err::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_toml(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cafs").join(CONFIG_FILE_NAME))
}

/// Determines the store directory. The command line (or `CAFS_STORE_DIR`)
/// takes precedence over the configuration file, which takes precedence over
/// `<data dir>/cafs/store`.
pub fn resolve_store_dir(
    from_cli: Option<PathBuf>,
    config: &Config,
) -> Result<PathBuf, ConfigError> {
    from_cli
        .or_else(|| config.store_dir.clone())
        .or_else(|| dirs::data_local_dir().map(|dir| dir.join("cafs").join("store")))
        .ok_or(ConfigError::NoStoreDir)
}
