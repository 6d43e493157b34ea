//! Engine configuration.
//!
//! Loaded from a JSON file, with the two secrets (webhook secret, forge
//! token) overridable from the environment so the config file itself can be
//! checked in.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::{env, fs};

use chrono::Duration;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding [`Config::webhook_secret`].
pub const ENV_WEBHOOK_SECRET: &str = "FORWARDPORT_WEBHOOK_SECRET";
/// Environment variable overriding [`Config::forge_token`].
pub const ENV_FORGE_TOKEN: &str = "FORWARDPORT_FORGE_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Account that owns the forward-port fork; all bot-created head
    /// branches live under this owner, and retirement refuses to delete a
    /// branch owned by anyone else.
    pub fp_owner: String,

    /// Git remote name pointing at the fork, for pushing port branches.
    pub fp_remote: String,

    /// Label applied to every PR this engine creates.
    pub port_label: String,

    /// Additional label applied when a port carried conflict markers.
    pub conflict_label: String,

    /// How long a merged or closed PR's head branch is kept before
    /// retirement, in days.
    pub merge_age_days: i64,

    /// Backoff between forward-port attempts, in hours.
    pub port_retry_delay_hours: i64,

    /// A forward-port job whose backoff escapes this window (measured from
    /// job creation) is considered stuck and hidden from scheduling, in
    /// days.
    pub port_grace_days: i64,

    /// How often the scheduler wakes to look for due jobs, in seconds.
    pub tick_interval_secs: u64,

    pub listen_addr: SocketAddr,

    /// HMAC secret for webhook signature verification.
    pub webhook_secret: String,

    /// API token for the forge.
    pub forge_token: String,

    /// Queue snapshot file; `None` disables persistence.
    pub state_file: Option<PathBuf>,

    /// Directory holding the local clones the git gateway operates in, one
    /// subdirectory per repository.
    pub git_base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fp_owner: "forwardport-bot".to_string(),
            fp_remote: "forwardport".to_string(),
            port_label: "forwardport".to_string(),
            conflict_label: "conflict".to_string(),
            merge_age_days: 7,
            port_retry_delay_hours: 1,
            port_grace_days: 1,
            tick_interval_secs: 60,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            webhook_secret: String::new(),
            forge_token: String::new(),
            state_file: None,
            git_base_dir: PathBuf::from("repos"),
        }
    }
}

impl Config {
    /// Loads configuration from a JSON file and applies environment
    /// overrides for the secrets.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut config: Config =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;

        if let Ok(secret) = env::var(ENV_WEBHOOK_SECRET) {
            config.webhook_secret = secret;
        }
        if let Ok(token) = env::var(ENV_FORGE_TOKEN) {
            config.forge_token = token;
        }
        Ok(config)
    }

    pub fn merge_age(&self) -> Duration {
        Duration::days(self.merge_age_days)
    }

    pub fn port_retry_delay(&self) -> Duration {
        Duration::hours(self.port_retry_delay_hours)
    }

    pub fn port_grace(&self) -> Duration {
        Duration::days(self.port_grace_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.merge_age(), Duration::days(7));
        assert_eq!(config.port_retry_delay(), Duration::hours(1));
        assert_eq!(config.port_grace(), Duration::days(1));
        assert!(config.state_file.is_none());
    }

    #[test]
    fn load_fills_unset_fields_from_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"fp_owner": "ports-inc", "merge_age_days": 14}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.fp_owner, "ports-inc");
        assert_eq!(config.merge_age_days, 14);
        assert_eq!(config.port_label, "forwardport");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"no_such_field": true}}"#).unwrap();

        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/config.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
