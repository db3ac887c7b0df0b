use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ChamaError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub mpesa: Option<MpesaConfig>,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_minutes: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_days: i64,
    #[serde(default)]
    pub admin_usernames: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_true")]
    pub persist: bool,
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_format: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_access_ttl() -> i64 {
    60
}

fn default_refresh_ttl() -> i64 {
    7
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_snapshot_file() -> String {
    "chamahub.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_cache_entries() -> u64 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_minutes: default_access_ttl(),
            refresh_token_ttl_days: default_refresh_ttl(),
            admin_usernames: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist: true,
            snapshot_file: default_snapshot_file(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ChamaError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ChamaError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${CHAMAHUB_JWT_SECRET})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ChamaError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ChamaError::InvalidConfigValueError {
                field: "server.bind".to_string(),
                value: self.server.bind.clone(),
                reason: "Expected host:port, e.g. 127.0.0.1:8000".to_string(),
            });
        }
        validation::validate_positive_number("server.max_body_bytes", self.server.max_body_bytes, 1024)?;

        if self.auth.jwt_secret.is_empty() {
            return Err(ChamaError::MissingConfigError {
                field: "auth.jwt_secret".to_string(),
            });
        }
        if self.auth.jwt_secret.len() < MIN_SECRET_BYTES || self.auth.jwt_secret.starts_with("${") {
            return Err(ChamaError::InvalidConfigValueError {
                field: "auth.jwt_secret".to_string(),
                value: "<redacted>".to_string(),
                reason: format!("Secret must be at least {} bytes", MIN_SECRET_BYTES),
            });
        }
        if self.auth.access_token_ttl_minutes < 1 || self.auth.refresh_token_ttl_days < 1 {
            return Err(ChamaError::ConfigValidationError {
                field: "auth".to_string(),
                message: "Token lifetimes must be positive".to_string(),
            });
        }

        if self.storage.persist {
            validation::validate_path("storage.data_dir", &self.storage.data_dir)?;
            validation::validate_path("storage.snapshot_file", &self.storage.snapshot_file)?;
        }

        if self.cache.enabled {
            validation::validate_positive_number(
                "cache.max_entries",
                self.cache.max_entries as usize,
                1,
            )?;
        }

        if let Some(mpesa) = &self.mpesa {
            validation::validate_url("mpesa.base_url", &mpesa.base_url)?;
            validation::validate_url("mpesa.callback_url", &mpesa.callback_url)?;
            for (field, value) in [
                ("mpesa.consumer_key", &mpesa.consumer_key),
                ("mpesa.consumer_secret", &mpesa.consumer_secret),
                ("mpesa.shortcode", &mpesa.shortcode),
                ("mpesa.passkey", &mpesa.passkey),
            ] {
                if value.trim().is_empty() {
                    return Err(ChamaError::MissingConfigError {
                        field: field.to_string(),
                    });
                }
            }
        }

        if let Some(format) = self.monitoring.as_ref().and_then(|m| m.log_format.as_deref()) {
            let valid_formats = ["compact", "json"];
            if !valid_formats.contains(&format) {
                return Err(ChamaError::InvalidConfigValueError {
                    field: "monitoring.log_format".to_string(),
                    value: format.to_string(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        valid_formats.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.log_format.as_deref())
            .map(|f| f == "json")
            .unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn bind_addr(&self) -> &str {
        &self.server.bind
    }

    fn data_dir(&self) -> &str {
        &self.storage.data_dir
    }

    fn jwt_secret(&self) -> &str {
        &self.auth.jwt_secret
    }

    fn access_token_ttl_minutes(&self) -> i64 {
        self.auth.access_token_ttl_minutes
    }

    fn refresh_token_ttl_days(&self) -> i64 {
        self.auth.refresh_token_ttl_days
    }

    fn admin_usernames(&self) -> &[String] {
        &self.auth.admin_usernames
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let toml_content = format!(
            r#"
[auth]
jwt_secret = "{}"
"#,
            SECRET
        );

        let config = TomlConfig::from_toml_str(&toml_content).unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.auth.access_token_ttl_minutes, 60);
        assert_eq!(config.storage.snapshot_file, "chamahub.json");
        assert!(config.cache.enabled);
        assert!(config.mpesa.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CHAMAHUB_TEST_SECRET", SECRET);

        let toml_content = r#"
[auth]
jwt_secret = "${CHAMAHUB_TEST_SECRET}"
admin_usernames = ["admin"]
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.auth.jwt_secret, SECRET);
        assert_eq!(config.admin_usernames(), &["admin".to_string()]);

        std::env::remove_var("CHAMAHUB_TEST_SECRET");
    }

    #[test]
    fn test_unresolved_secret_fails_validation() {
        let toml_content = r#"
[auth]
jwt_secret = "${CHAMAHUB_SECRET_THAT_IS_NOT_SET_ANYWHERE}"
"#;
        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_bad_mpesa_url() {
        let toml_content = format!(
            r#"
[auth]
jwt_secret = "{}"

[mpesa]
base_url = "invalid-url"
consumer_key = "key"
consumer_secret = "secret"
shortcode = "174379"
passkey = "passkey"
callback_url = "https://example.com/mpesa/callback"
"#,
            SECRET
        );

        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_unknown_log_format() {
        let toml_content = format!(
            r#"
[auth]
jwt_secret = "{}"

[monitoring]
enabled = true
log_format = "xml"
"#,
            SECRET
        );

        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.monitoring_enabled());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = format!(
            r#"
[server]
bind = "0.0.0.0:9000"
allowed_origins = ["http://localhost:3000"]

[auth]
jwt_secret = "{}"

[storage]
data_dir = "/var/lib/chamahub"
"#,
            SECRET
        );

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.data_dir(), "/var/lib/chamahub");
        assert_eq!(config.server.allowed_origins.len(), 1);
    }
}
