use std::{env, fs, path};

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum Error {
    ReadFailed(()),
    WriteFailed(()),
    ParseFailed(()),
    ConfigPathUnavailable,
}

/// How checks are executed: in-process timers or remote workers over a
/// persistent channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Monolith,
    Distributed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub deployment: Deployment,
    pub database: Database,
    pub scheduler: Scheduler,
    pub checks: Checks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Deployment {
    pub mode: DeploymentMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Scheduler {
    /// Period of the worker liveness sweep, in seconds.
    pub liveness_interval_secs: u64,
    /// Page size used when loading monitors at bootstrap.
    pub bootstrap_page_size: u32,
    /// Upper bound on simultaneously in-flight checks.
    pub max_concurrent_checks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Checks {
    /// Per-check timeout when the monitor does not set one, in milliseconds.
    pub default_timeout_ms: u64,
    /// Hard transport-level ceiling, in milliseconds.
    pub transport_timeout_ms: u64,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uptide/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("uptide/config.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deployment: Deployment { mode: DeploymentMode::Monolith },
            database: Database { path: "uptide.db".into() },
            scheduler: Scheduler {
                liveness_interval_secs: 5,
                bootstrap_page_size: 1000,
                max_concurrent_checks: 256,
            },
            checks: Checks { default_timeout_ms: 5_000, transport_timeout_ms: 15_000 },
        }
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uptide/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string =
                fs::read_to_string(&config_path).map_err(|_err| Error::ReadFailed(()))?;
            toml::from_str(raw_string.as_str()).map_err(|_err| Error::ParseFailed(()))
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String =
            toml::to_string_pretty(self).map_err(|_err| Error::ParseFailed(()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_err| Error::WriteFailed(()))?;
        }

        std::fs::write(path, config_str).map_err(|_err| Error::WriteFailed(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let raw = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();

        assert_eq!(parsed.deployment.mode, DeploymentMode::Monolith);
        assert_eq!(parsed.scheduler.bootstrap_page_size, 1000);
        assert_eq!(parsed.checks.default_timeout_ms, 5_000);
    }

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.scheduler.liveness_interval_secs, 5);
    }

    #[test]
    fn non_toml_extension_is_normalized() {
        let normalized = normalize_toml_path(path::Path::new("/tmp/uptide/config.cfg"));
        assert_eq!(normalized.extension().unwrap(), "toml");
    }
}
