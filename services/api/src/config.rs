use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_VALIDATION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-3.0-generate-002";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
///
/// The generation API key is not part of it: it is read from
/// `GENERATIVE_API_KEY` on every request.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub api_base: String,
    pub validation_model: String,
    pub image_model: String,
    /// JSON story file; the built-in story is used when unset.
    pub story_path: Option<PathBuf>,
    pub intro_delay: Duration,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let api_base = var_or("GENERATIVE_API_BASE", DEFAULT_API_BASE);
        if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "GENERATIVE_API_BASE".to_string(),
                format!("'{}' is not an http(s) URL", api_base),
            ));
        }

        let validation_model = var_or("VALIDATION_MODEL", DEFAULT_VALIDATION_MODEL);
        let image_model = var_or("IMAGE_MODEL", DEFAULT_IMAGE_MODEL);

        let story_path = std::env::var("STORY_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let intro_delay_str = var_or("INTRO_DELAY_MS", "2000");
        let intro_delay = intro_delay_str
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| {
                ConfigError::InvalidValue("INTRO_DELAY_MS".to_string(), e.to_string())
            })?;

        Ok(Self {
            bind_address,
            log_level,
            api_base,
            validation_model,
            image_model,
            story_path,
            intro_delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("RUST_LOG");
            env::remove_var("GENERATIVE_API_BASE");
            env::remove_var("VALIDATION_MODEL");
            env::remove_var("IMAGE_MODEL");
            env::remove_var("STORY_PATH");
            env::remove_var("INTRO_DELAY_MS");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.validation_model, "gemini-2.5-flash");
        assert_eq!(config.image_model, "imagen-3.0-generate-002");
        assert_eq!(config.story_path, None);
        assert_eq!(config.intro_delay, Duration::from_millis(2000));
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("RUST_LOG", "debug");
            env::set_var("GENERATIVE_API_BASE", "http://localhost:9000/v1beta");
            env::set_var("VALIDATION_MODEL", "gemini-2.0-flash");
            env::set_var("IMAGE_MODEL", "imagen-4.0-generate-001");
            env::set_var("STORY_PATH", "/custom/story.json");
            env::set_var("INTRO_DELAY_MS", "0");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.api_base, "http://localhost:9000/v1beta");
        assert_eq!(config.validation_model, "gemini-2.0-flash");
        assert_eq!(config.image_model, "imagen-4.0-generate-001");
        assert_eq!(config.story_path, Some(PathBuf::from("/custom/story.json")));
        assert_eq!(config.intro_delay, Duration::ZERO);
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_intro_delay() {
        clear_env_vars();
        unsafe {
            env::set_var("INTRO_DELAY_MS", "two seconds");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "INTRO_DELAY_MS"),
            _ => panic!("Expected InvalidValue for INTRO_DELAY_MS"),
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_rejects_non_http_api_base() {
        clear_env_vars();
        unsafe {
            env::set_var("GENERATIVE_API_BASE", "generativelanguage.googleapis.com");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "GENERATIVE_API_BASE"),
            _ => panic!("Expected InvalidValue for GENERATIVE_API_BASE"),
        }
        clear_env_vars();
    }
}
