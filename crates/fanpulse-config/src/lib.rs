use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub classifier: Classifier,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classifier {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub remote: Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remote {
    pub mode: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

impl Remote {
    pub fn disabled() -> Self {
        Self {
            mode: "disabled".to_string(),
            endpoint: None,
            model: None,
            api_key_env: None,
            timeout_ms: default_remote_timeout_ms(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != "disabled"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            default_language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_threshold() -> f64 {
    0.75
}

fn default_remote_timeout_ms() -> u64 {
    8_000
}

fn default_language() -> String {
    "es".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&cfg.classifier.threshold) {
        return Err(ConfigError::UnsupportedConfig(format!(
            "classifier.threshold={} must be within [0, 1]",
            cfg.classifier.threshold
        )));
    }

    let remote = &cfg.classifier.remote;
    match remote.mode.as_str() {
        "disabled" => {}
        "openai_compatible" => {
            if is_blank(remote.endpoint.as_deref()) {
                return Err(ConfigError::UnsupportedConfig(
                    "classifier.remote.endpoint is required when mode=openai_compatible"
                        .to_string(),
                ));
            }
            if is_blank(remote.model.as_deref()) {
                return Err(ConfigError::UnsupportedConfig(
                    "classifier.remote.model is required when mode=openai_compatible".to_string(),
                ));
            }
        }
        other => {
            return Err(ConfigError::UnsupportedConfig(format!(
                "classifier.remote.mode={other} is not implemented; supported: disabled, openai_compatible"
            )));
        }
    }
    if remote.timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "classifier.remote.timeout_ms must be >= 1".to_string(),
        ));
    }

    if !matches!(cfg.engine.default_language.as_str(), "es" | "en") {
        return Err(ConfigError::UnsupportedConfig(format!(
            "engine.default_language={} is not supported; supported: es, en",
            cfg.engine.default_language
        )));
    }
    if !matches!(cfg.logging.format.as_str(), "text" | "json") {
        return Err(ConfigError::UnsupportedConfig(format!(
            "logging.format={} is not supported; supported: text, json",
            cfg.logging.format
        )));
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(contents: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("fanpulse-config-test-{nanos}.yaml"));
        std::fs::write(&path, contents).expect("write temp config");
        path.to_string_lossy().to_string()
    }

    fn base_yaml() -> String {
        r#"
server:
  listen_addr: "127.0.0.1:0"

classifier:
  threshold: 0.75
  remote:
    mode: "disabled"

engine:
  default_language: "es"

logging:
  level: "info"
  format: "text"
"#
        .to_string()
    }

    #[test]
    fn accepts_minimal_config_with_defaults() {
        let path = write_temp_config(
            r#"
server:
  listen_addr: "127.0.0.1:0"
classifier:
  remote:
    mode: "disabled"
"#,
        );
        let cfg = load_and_validate(&path).expect("minimal config should be accepted");
        assert_eq!(cfg.classifier.threshold, 0.75);
        assert_eq!(cfg.classifier.remote.timeout_ms, 8_000);
        assert_eq!(cfg.engine.default_language, "es");
        assert_eq!(cfg.logging.format, "text");
        assert!(!cfg.classifier.remote.is_enabled());
    }

    #[test]
    fn supports_openai_compatible_remote_with_endpoint_and_model() {
        let path = write_temp_config(&base_yaml().replace(
            "mode: \"disabled\"",
            "mode: \"openai_compatible\"\n    endpoint: \"http://127.0.0.1:11434/v1\"\n    model: \"llama3\"",
        ));
        let cfg = load_and_validate(&path).expect("remote config should be accepted");
        assert!(cfg.classifier.remote.is_enabled());
        assert_eq!(cfg.classifier.remote.model.as_deref(), Some("llama3"));
    }

    #[test]
    fn rejects_remote_without_model() {
        let path = write_temp_config(&base_yaml().replace(
            "mode: \"disabled\"",
            "mode: \"openai_compatible\"\n    endpoint: \"http://127.0.0.1:11434/v1\"",
        ));
        let err = load_and_validate(&path).expect_err("expected unsupported config");
        assert!(matches!(err, ConfigError::UnsupportedConfig(_)));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let path = write_temp_config(&base_yaml().replace("threshold: 0.75", "threshold: 1.5"));
        let err = load_and_validate(&path).expect_err("expected invalid threshold");
        assert!(matches!(
            err,
            ConfigError::SchemaValidation(_) | ConfigError::UnsupportedConfig(_)
        ));
    }

    #[test]
    fn rejects_unknown_language() {
        let path = write_temp_config(
            &base_yaml().replace("default_language: \"es\"", "default_language: \"fr\""),
        );
        let err = load_and_validate(&path).expect_err("expected unsupported language");
        assert!(matches!(
            err,
            ConfigError::SchemaValidation(_) | ConfigError::UnsupportedConfig(_)
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_and_validate("/nonexistent/fanpulse.yaml").expect_err("expected read error");
        assert!(matches!(err, ConfigError::Read(_)));
    }
}
