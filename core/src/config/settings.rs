use super::BrokerConfig;
use crate::Result;
use config::{Config, Environment, File};
use std::path::Path;

const ENV_PREFIX: &str = "STOMPMQ";

impl BrokerConfig {
    /// Builds the configuration from defaults, then the optional file at
    /// `path` (format picked from its extension), then `STOMPMQ_*`
    /// environment variables. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| crate::StompmqError::Config(e.to_string()))?;

        let config = settings
            .try_deserialize::<BrokerConfig>()
            .map_err(|e| crate::StompmqError::Config(e.to_string()))?;

        config.validate().map_err(crate::StompmqError::Config)?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        writeln!(
            file,
            "listenPort = 7000\nauthUser = \"guest\"\nauthPass = \"secret\"\ndbFile = \"\"\nvolatilePrefix = \"/fanout/\""
        )
        .expect("write");

        let config = BrokerConfig::load(Some(file.path())).expect("load");
        assert_eq!(config.listen_port, 7000);
        assert_eq!(config.auth_user, "guest");
        assert!(config.auth_enabled());
        assert!(config.db_path().is_none());
        assert_eq!(config.volatile_prefix, "/fanout/");
        assert_eq!(config.max_frame_size, BrokerConfig::default().max_frame_size);
    }

    #[test]
    fn test_load_rejects_invalid_bounds() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        writeln!(file, "maxDestinationLength = 300").expect("write");

        assert!(BrokerConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        assert!(BrokerConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
