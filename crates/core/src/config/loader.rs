use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Env keys use a double-underscore section separator because the field
/// names themselves contain underscores, e.g.
/// `MEDIADECK_SUMMARIZER__API_KEY` overrides `summarizer.api_key`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("MEDIADECK_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from TOML string (useful for testing).
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config =
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.backend.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "backend.url must not be empty".to_string(),
        ));
    }
    if !config.backend.url.starts_with("http://") && !config.backend.url.starts_with("https://") {
        return Err(ConfigError::ValidationError(format!(
            "backend.url must be an http(s) URL, got '{}'",
            config.backend.url
        )));
    }
    if config.backend.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "backend.timeout_secs must be greater than zero".to_string(),
        ));
    }
    if config.queue.formats.is_empty() {
        return Err(ConfigError::ValidationError(
            "queue.formats must name at least one output format".to_string(),
        ));
    }
    Ok(())
}
