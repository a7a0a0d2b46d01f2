//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read a TOML file without validating it.
///
/// Validation waits until command line overrides have been applied.
pub fn read_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validation::validate_config;

    #[test]
    fn loads_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grs.toml");
        fs::write(&path, "[listener]\nport = 6000\n").unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.listener.port, Some(6000));
        assert_eq!(config.listener.address, "127.0.0.1");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_config(Path::new("/nonexistent/grs.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn bad_mode_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grs.toml");
        fs::write(&path, "[listener]\nsocket_mode = \"rwx\"\n").unwrap();

        assert!(matches!(read_config(&path).unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn no_transport_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grs.toml");
        fs::write(&path, "[listener]\naddress = \"\"\n").unwrap();

        let config = read_config(&path).unwrap();
        let err = ConfigError::Validation(validate_config(&config).unwrap_err());
        assert_eq!(
            err.to_string(),
            "Validation failed: must listen on tcp and/or unix socket"
        );
    }
}
