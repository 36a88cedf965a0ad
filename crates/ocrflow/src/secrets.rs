//! API key resolution.
//!
//! A credential can be configured three ways, checked in this order:
//!
//! 1. **Direct value** (`apiKey`), for local runs
//! 2. **File** (`apiKeyFile`), e.g. a mounted container secret
//! 3. **Environment variable** (`apiKeyEnvVar`)

use secrecy::SecretString;
use std::fs;

use crate::config::RecognitionConfig;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{path}' is empty")]
    EmptyFile { path: String },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// The configured places a secret may come from. Empty strings count as
/// not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretSources<'a> {
    pub direct: Option<&'a str>,
    pub file_path: Option<&'a str>,
    pub env_var: Option<&'a str>,
}

impl<'a> SecretSources<'a> {
    /// Sources for the recognition service API key.
    pub fn recognition_api_key(config: &'a RecognitionConfig) -> Self {
        Self {
            direct: config.api_key.as_deref(),
            file_path: config.api_key_file.as_deref(),
            env_var: config.api_key_env_var.as_deref(),
        }
    }

    pub fn is_configured(&self) -> bool {
        [self.direct, self.file_path, self.env_var]
            .iter()
            .any(|s| s.is_some_and(|s| !s.is_empty()))
    }

    /// Resolves from the first configured source. A configured source that
    /// fails is an error; later sources are not tried.
    pub fn resolve(&self) -> Result<SecretString> {
        if let Some(value) = non_empty(self.direct) {
            return Ok(SecretString::from(value));
        }

        if let Some(path) = non_empty(self.file_path) {
            let expanded = expand_home(path);
            let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
                path: expanded.clone(),
                source: e,
            })?;
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(SecretError::EmptyFile { path: expanded });
            }
            return Ok(SecretString::from(trimmed));
        }

        if let Some(name) = non_empty(self.env_var) {
            return match std::env::var(name) {
                // env files often leave a trailing newline
                Ok(value) => Ok(SecretString::from(value.trim())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            };
        }

        Err(SecretError::NoSourceProvided)
    }

    /// Like [`resolve`](Self::resolve), but nothing configured is `Ok(None)`.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NoSourceProvided) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Expands a leading `~` or `~/`. `~user/...` is left alone.
fn expand_home(path: &str) -> String {
    if path != "~" && !path.starts_with("~/") {
        return path.to_string();
    }
    match dirs::home_dir() {
        Some(home) => {
            let home = home.to_string_lossy();
            if path == "~" {
                home.into_owned()
            } else {
                format!("{}{}", home, &path[1..])
            }
        }
        None => path.to_string(),
    }
}
