use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    pub emit: EmitConfig,
    pub service: ServiceConfig,
    pub log_filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmitConfig {
    pub date_scalar: String,
    pub json_scalar: String,
    pub include_descriptions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Keys that mark a trailing argument as a query-option bag.
    pub option_keys: Vec<String>,
    pub default_limit: Option<usize>,
    pub max_limit: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            emit: EmitConfig::default(),
            service: ServiceConfig::default(),
            log_filter: "model_compiler=info".to_string(),
        }
    }
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            date_scalar: "Date".to_string(),
            json_scalar: "JSON".to_string(),
            include_descriptions: true,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            option_keys: ["select", "skip", "limit", "sort"]
                .iter()
                .map(|k| (*k).to_string())
                .collect(),
            default_limit: None,
            max_limit: 1000,
        }
    }
}

impl CompilerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.option_keys.is_empty() {
            return Err(ModelError::config("service.optionKeys cannot be empty"));
        }
        if self.service.max_limit == 0 {
            return Err(ModelError::config("service.maxLimit must be positive"));
        }
        if let Some(limit) = self.service.default_limit {
            if limit > self.service.max_limit {
                return Err(ModelError::config(
                    "service.defaultLimit exceeds service.maxLimit",
                ));
            }
        }
        if self.emit.date_scalar.is_empty() || self.emit.json_scalar.is_empty() {
            return Err(ModelError::config("scalar names cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_option_keys() {
        let config = CompilerConfig::default();
        assert_eq!(
            config.service.option_keys,
            vec!["select", "skip", "limit", "sort"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            CompilerConfig::from_json_str(r#"{"emit": {"dateScalar": "DateTime"}}"#).unwrap();
        assert_eq!(config.emit.date_scalar, "DateTime");
        assert_eq!(config.emit.json_scalar, "JSON");
        assert_eq!(config.service.max_limit, 1000);
    }

    #[test]
    fn test_rejects_default_limit_above_max() {
        let result = CompilerConfig::from_json_str(
            r#"{"service": {"defaultLimit": 50, "maxLimit": 10}}"#,
        );
        assert!(matches!(result, Err(ModelError::Config { .. })));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"logFilter": "debug"}}"#).unwrap();
        let config = CompilerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.log_filter, "debug");
    }
}
