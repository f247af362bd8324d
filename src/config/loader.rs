//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in order:
//!
//! 1. Built-in defaults ([`AnalyticsConfig::default`])
//! 2. `config/analytics.yaml`
//! 3. `config/analytics-<environment>.yaml`
//! 4. `ANALYTICS__*` environment variables (`__` separates nested keys,
//!    e.g. `ANALYTICS__CACHE__ENABLED=false`)

use super::error::ConfigResult;
use super::AnalyticsConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_CONFIG_NAME: &str = "analytics";
const ENV_PREFIX: &str = "ANALYTICS";

/// Loaded, validated configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: AnalyticsConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Same as [`Self::load_from_directory_with_env`] but reads overrides from the
    /// given map instead of the process environment
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::build_config(&config_directory, environment, overrides)?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            property = %config.property(),
            cache_enabled = config.cache.enabled,
            background_jobs = config.background_jobs.enabled,
            realtime_updates = config.realtime.enabled,
            "🔧 Analytics configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: AnalyticsConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration with sensitive fields masked, safe for logs
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    pub(crate) fn detect_environment() -> String {
        env::var("ANALYTICS_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        PathBuf::from("config")
    }

    fn build_config(
        config_directory: &Path,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<AnalyticsConfig> {
        let base = config_directory.join(format!("{BASE_CONFIG_NAME}.yaml"));
        let env_specific = config_directory.join(format!("{BASE_CONFIG_NAME}-{environment}.yaml"));

        if base.exists() {
            debug!("Found configuration file: {}", base.display());
        }
        if env_specific.exists() {
            debug!(
                "Applying environment-specific overrides from: {}",
                env_specific.display()
            );
        }

        let mut env_source = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("retry.retryable_codes");
        if overrides.is_some() {
            env_source = env_source.source(overrides);
        }

        let settings = Config::builder()
            .add_source(File::from(base).required(false))
            .add_source(File::from(env_specific).required(false))
            .add_source(env_source)
            .build()?;

        Ok(settings.try_deserialize::<AnalyticsConfig>()?)
    }

    fn sanitize_config_for_logging(config: &AnalyticsConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "credential"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    if sensitive_patterns.iter().any(|p| key_lower.contains(p)) {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationError;
    use crate::error::StatusCode;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_config_yaml() -> &'static str {
        r#"
property_id: "987654"
cache:
  enabled: true
  prefix: genlytics
  lifetime_seconds: 3600
background_jobs:
  queue_name: analytics
  workers: 4
retry:
  initial_retry_delay_ms: 250
  retry_delay_multiplier: 2.0
  max_retry_delay_ms: 4000
  retryable_codes:
    - UNAVAILABLE
    - RESOURCE_EXHAUSTED
"#
    }

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        fs::write(config_dir.join("analytics.yaml"), create_test_config_yaml()).unwrap();
        (temp_dir, config_dir)
    }

    #[test]
    fn test_basic_config_loading() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager =
            ConfigManager::load_with_overrides(Some(config_dir), "test", Some(HashMap::new()))
                .unwrap();
        let config = manager.config();

        assert_eq!(manager.environment(), "test");
        assert_eq!(config.property(), "properties/987654");
        assert_eq!(config.cache.prefix, "genlytics");
        assert_eq!(config.cache.lifetime(), Duration::from_secs(3600));
        // untouched values keep their defaults
        assert_eq!(config.cache.realtime_lifetime_seconds, 30);
        assert_eq!(config.background_jobs.workers, 4);
        assert_eq!(config.background_jobs.max_attempts, 3);
        assert_eq!(
            config.retry.retryable_codes,
            vec![StatusCode::Unavailable, StatusCode::ResourceExhausted]
        );
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        fs::write(
            config_dir.join("analytics-production.yaml"),
            "background_jobs:\n  workers: 16\nrealtime:\n  enabled: false\n",
        )
        .unwrap();

        let manager = ConfigManager::load_with_overrides(
            Some(config_dir),
            "production",
            Some(HashMap::new()),
        )
        .unwrap();

        assert_eq!(manager.config().background_jobs.workers, 16);
        assert!(!manager.config().realtime.enabled);
        assert_eq!(manager.config().background_jobs.queue_name, "analytics");
    }

    #[test]
    fn test_environment_variable_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        let overrides = HashMap::from([
            ("ANALYTICS__CACHE__ENABLED".to_string(), "false".to_string()),
            (
                "ANALYTICS__RETRY__TOTAL_TIMEOUT_MS".to_string(),
                "9000".to_string(),
            ),
        ]);

        let manager =
            ConfigManager::load_with_overrides(Some(config_dir), "test", Some(overrides)).unwrap();

        assert!(!manager.config().cache.enabled);
        assert_eq!(manager.config().retry.total_timeout_ms, 9000);
    }

    #[test]
    fn test_missing_property_fails_validation() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigManager::load_with_overrides(
            Some(temp_dir.path().to_path_buf()),
            "test",
            Some(HashMap::new()),
        );

        assert!(matches!(
            result,
            Err(ConfigurationError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn test_debug_config_masks_sensitive_fields() {
        let mut value = serde_json::json!({
            "property_id": "1",
            "credentials": {"token": "abc"},
            "nested": [{"client_secret": "s"}]
        });
        ConfigManager::sanitize_json_recursive(&mut value, &["secret", "token", "credential"]);

        assert_eq!(value["property_id"], "1");
        assert_eq!(value["credentials"], "[MASKED]");
        assert_eq!(value["nested"][0]["client_secret"], "[MASKED]");
    }
}
