//! `~/.cmbridge/config.toml` loading.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use cmbridge_adapter::CompilerConfig;

#[derive(Debug, Default, Deserialize)]
pub struct BridgeConfig {
    pub app: Option<AppConfig>,
    pub compiler: Option<CompilerConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Expand `${VAR}` references from the environment. Unset variables expand
/// to nothing; an unterminated `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_vars(&path.to_string_lossy()))
}

impl BridgeConfig {
    /// Load the user config. `Ok(None)` when there is no config file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        toml::from_str(&content).map(Some).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn log_level(&self) -> Option<&str> {
        self.app.as_ref()?.log_level.as_deref()
    }

    /// Compiler settings with `${VAR}` references expanded.
    #[must_use]
    pub fn compiler(&self) -> CompilerConfig {
        let mut config = self.compiler.clone().unwrap_or_default();
        config.program = expand_env_vars(&config.program);
        config.cm_root = expand_path(&config.cm_root);
        config.cm_path = config.cm_path.as_deref().map(expand_path);
        config.diagnostics_root = config.diagnostics_root.as_deref().map(expand_path);
        config.output_file = config.output_file.as_deref().map(expand_path);
        config.args = config.args.iter().map(|a| expand_env_vars(a)).collect();
        config
    }
}

/// Directory holding config and logs.
#[must_use]
pub fn bridge_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cmbridge"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    bridge_home().map(|home| home.join("config.toml"))
}
