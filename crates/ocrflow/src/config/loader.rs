use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

/// Checks that hold across fields and so cannot be expressed in the schema.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let endpoint = &config.recognition.endpoint;
    if reqwest::Url::parse(endpoint).is_err() {
        return Err(ConfigError::Validation {
            message: format!("recognition.endpoint is not a valid URL: {}", endpoint),
        });
    }

    let observer = &config.observer;
    if observer.max_idle_interval_ms < observer.idle_interval_ms {
        return Err(ConfigError::Validation {
            message: "observer.maxIdleIntervalMs must not be below observer.idleIntervalMs"
                .to_string(),
        });
    }
    if observer.processing_interval_ms > observer.pending_interval_ms
        || observer.pending_interval_ms > observer.idle_interval_ms
    {
        log::warn!(
            "Observer intervals are not increasing (processing {}ms, pending {}ms, idle {}ms)",
            observer.processing_interval_ms,
            observer.pending_interval_ms,
            observer.idle_interval_ms
        );
    }

    if config.recognition.api_key.is_some() {
        log::warn!("recognition.apiKey is stored in plain text; consider apiKeyFile or apiKeyEnvVar");
    }

    Ok(())
}
