//! Layered configuration
//!
//! Settings come from three layers, in increasing precedence: built-in
//! defaults, a JSON config file, and per-invocation overrides (CLI flags and
//! environment variables, which clap has already merged by the time they
//! arrive here). [`Config::resolve`] flattens the layers once at startup;
//! the result is read-only and passed by value into every command.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

/// Region used when neither the flags nor the config file name one.
pub const DEFAULT_REGION: &str = "us-east-2";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no home directory, pass --key-folder explicitly")]
    NoProjectDirs,

    #[error("missing {setting}, pass {flag} or set it in the config file")]
    Missing {
        setting: &'static str,
        flag: &'static str,
    },
}

/// File-sourced configuration layer. Every field is optional; absent fields
/// fall through to the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub key_folder: Option<PathBuf>,
    pub key_name: Option<String>,
    pub instance_name: Option<String>,
    pub security_group: Option<String>,
}

impl ConfigFile {
    /// Load a config file, treating a missing file at the default location
    /// as an empty layer. An explicitly named file must exist.
    pub fn load(path: &Path, explicit: bool) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        serde_json::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            source: err,
        })
    }
}

/// Per-invocation overrides, the highest-precedence layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub key_folder: Option<PathBuf>,
    pub key_name: Option<String>,
    pub instance_name: Option<String>,
    pub security_group: Option<String>,
}

/// Flattened configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub region: String,
    pub profile: Option<String>,
    pub key_folder: PathBuf,
    key_name: Option<String>,
    instance_name: Option<String>,
    security_group: Option<String>,
}

impl Config {
    /// Flatten overrides over the file layer over the built-in defaults.
    pub fn resolve(overrides: Overrides, file: ConfigFile) -> Result<Self, ConfigError> {
        let key_folder = match overrides.key_folder.or(file.key_folder) {
            Some(folder) => folder,
            None => default_key_folder()?,
        };

        Ok(Self {
            region: overrides
                .region
                .or(file.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            profile: overrides.profile.or(file.profile),
            key_folder,
            key_name: overrides.key_name.or(file.key_name),
            instance_name: overrides.instance_name.or(file.instance_name),
            security_group: overrides.security_group.or(file.security_group),
        })
    }

    pub fn key_name(&self) -> Result<&str, ConfigError> {
        self.key_name.as_deref().ok_or(ConfigError::Missing {
            setting: "key name",
            flag: "--key-name",
        })
    }

    pub fn instance_name(&self) -> Result<&str, ConfigError> {
        self.instance_name.as_deref().ok_or(ConfigError::Missing {
            setting: "instance name",
            flag: "--instance-name",
        })
    }

    pub fn security_group(&self) -> Result<&str, ConfigError> {
        self.security_group.as_deref().ok_or(ConfigError::Missing {
            setting: "security group",
            flag: "--security-group",
        })
    }
}

/// Where the config file lives when `--config-file` is not given.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

/// Where private key files live when `--key-folder` is not given.
pub fn default_key_folder() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.data_local_dir().join("keys"))
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("", "", "seqctl").ok_or(ConfigError::NoProjectDirs)
}
