//! API credential lookup.
//!
//! The only configurable thing in the app is the Gemini API key: taken
//! from the environment first, then from an optional config file in the
//! user's config directory. Absence is not an error — the event source
//! degrades to demo data.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Config {
    /// Load the credential from `GEMINI_API_KEY` / `API_KEY`, falling back
    /// to `<config dir>/aday/config.toml`. Never fails; a malformed config
    /// file is logged and treated as absent.
    pub fn load() -> Self {
        for var in ["GEMINI_API_KEY", "API_KEY"] {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    return Self { api_key: Some(key) };
                }
            }
        }

        match Self::load_file() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config file unusable, running keyless: {e:#}");
                Self::default()
            }
        }
    }

    fn load_file() -> Result<Self> {
        let Some(path) = Self::file_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("aday").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_toml() {
        let config: Config = toml::from_str("api_key = \"abc123\"").expect("parse");
        assert_eq!(config.api_key.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_empty_config_toml() {
        let config: Config = toml::from_str("").expect("parse");
        assert!(config.api_key.is_none());
    }
}
