//! Configuration loading from disk.

use std::path::Path;
use std::fs;
use crate::config::schema::SyncConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<SyncConfig, ConfigError> {
    let config: SyncConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/referral-sync.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = parse_config("[chain\nendpoints = 3").unwrap_err();
        assert!(err.to_string().starts_with("Parse error"));
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let err = parse_config("[contracts]\nmembership = \"nope\"\n").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("contracts.membership"));
        assert!(text.contains("contracts.token"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("referral_sync_loader_test.toml");
        std::fs::write(
            &path,
            r#"
            [chain]
            endpoints = ["http://127.0.0.1:8545"]
            chain_id = 31337

            [contracts]
            membership = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            token = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.chain.chain_id, 31337);

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
