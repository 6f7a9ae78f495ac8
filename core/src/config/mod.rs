pub mod settings;

use crate::protocol::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_HEADER_LENGTH};
use crate::storage::{KEY_SUFFIX_RESERVE, MAX_DESTINATION_LEN, MAX_KEY_LEN};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 61613;
pub const DEFAULT_DB_FILE: &str = "./data/stompmq.db";
pub const DEFAULT_VOLATILE_PREFIX: &str = "/topic/";

// Keys are matched case-insensitively by the `config` crate, which hands
// them over lowercased; the aliases accept that form and snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerConfig {
    pub host: String,
    #[serde(alias = "listenport", alias = "listen_port", alias = "port")]
    pub listen_port: u16,

    // Authentication is off unless both are non-empty
    #[serde(alias = "authuser", alias = "auth_user")]
    pub auth_user: String,
    #[serde(alias = "authpass", alias = "auth_pass")]
    pub auth_pass: String,

    /// Message log location. `None` or an empty path keeps messages in memory.
    #[serde(alias = "dbfile", alias = "db_file")]
    pub db_file: Option<PathBuf>,
    #[serde(alias = "logfile", alias = "log_file")]
    pub log_file: Option<PathBuf>,

    /// Destinations under this prefix are fan-out only and never persisted.
    #[serde(alias = "volatileprefix", alias = "volatile_prefix")]
    pub volatile_prefix: String,
    #[serde(alias = "maxheaderlength", alias = "max_header_length")]
    pub max_header_length: usize,
    #[serde(alias = "maxframesize", alias = "max_frame_size")]
    pub max_frame_size: usize,
    #[serde(alias = "maxdestinationlength", alias = "max_destination_length")]
    pub max_destination_length: usize,
    /// KV store page cache, KiB.
    #[serde(alias = "cachesize", alias = "cache_size")]
    pub cache_size: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            listen_port: DEFAULT_PORT,
            auth_user: String::new(),
            auth_pass: String::new(),
            db_file: Some(PathBuf::from(DEFAULT_DB_FILE)),
            log_file: None,
            volatile_prefix: DEFAULT_VOLATILE_PREFIX.to_string(),
            max_header_length: DEFAULT_MAX_HEADER_LENGTH,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_destination_length: MAX_DESTINATION_LEN,
            cache_size: 8 * 1024, // 8 MiB
        }
    }
}

impl BrokerConfig {
    /// Require `login`/`passcode` on CONNECT.
    pub fn with_credentials(mut self, user: &str, pass: &str) -> Self {
        self.auth_user = user.to_string();
        self.auth_pass = pass.to_string();
        self
    }

    /// Keep the message log in memory only.
    pub fn in_memory(mut self) -> Self {
        self.db_file = None;
        self
    }

    pub fn with_db_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_file = Some(path.into());
        self
    }

    pub fn auth_enabled(&self) -> bool {
        !self.auth_user.is_empty() && !self.auth_pass.is_empty()
    }

    /// The configured database path, if messages are to be persisted.
    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_file
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.listen_port)
    }

    /// Validate configuration bounds to prevent oversized keys and unbounded buffers
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_header_length == 0 {
            return Err("maxHeaderLength must be > 0".to_string());
        }
        if self.max_frame_size == 0 {
            return Err("maxFrameSize must be > 0".to_string());
        }
        if self.max_header_length > self.max_frame_size {
            return Err(format!(
                "maxHeaderLength ({}) must not exceed maxFrameSize ({})",
                self.max_header_length, self.max_frame_size
            ));
        }
        if self.max_destination_length == 0 {
            return Err("maxDestinationLength must be > 0".to_string());
        }
        if self.max_destination_length + KEY_SUFFIX_RESERVE > MAX_KEY_LEN {
            return Err(format!(
                "maxDestinationLength must be <= {} to fit a {} byte key",
                MAX_DESTINATION_LEN, MAX_KEY_LEN
            ));
        }
        if self.cache_size == 0 {
            return Err("cacheSize must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BrokerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_port, 61613);
        assert_eq!(config.max_destination_length, 235);
        assert!(!config.auth_enabled());
        assert_eq!(config.bind_address(), "0.0.0.0:61613");
    }

    #[test]
    fn test_auth_needs_both_values() {
        assert!(BrokerConfig::default().with_credentials("u", "p").auth_enabled());
        assert!(!BrokerConfig::default().with_credentials("u", "").auth_enabled());
        assert!(!BrokerConfig::default().with_credentials("", "p").auth_enabled());
    }

    #[test]
    fn test_empty_db_file_means_in_memory() {
        assert!(BrokerConfig::default().db_path().is_some());
        assert!(BrokerConfig::default().in_memory().db_path().is_none());
        assert!(BrokerConfig::default().with_db_file("").db_path().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut config = BrokerConfig::default();
        config.max_destination_length = 236;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.max_header_length = config.max_frame_size + 1;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.max_frame_size = 0;
        assert!(config.validate().is_err());
    }
}
