use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ChamaError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Token error: {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("{field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("{message}")]
    Forbidden { message: String },

    #[error("{message}")]
    InvalidState { message: String },

    #[error("{message}")]
    PayloadTooLarge { message: String },

    #[error("Payment gateway error: {message}")]
    PaymentGatewayError { message: String },

    #[error("Payment gateway is not configured")]
    GatewayNotConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Storage,
    Client,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ChamaError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ChamaError::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        ChamaError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ChamaError::Conflict {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ChamaError::Forbidden {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ChamaError::Unauthorized {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ChamaError::InvalidState {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ChamaError::ConfigError { .. }
            | ChamaError::ConfigValidationError { .. }
            | ChamaError::InvalidConfigValueError { .. }
            | ChamaError::MissingConfigError { .. }
            | ChamaError::GatewayNotConfigured => ErrorCategory::Configuration,
            ChamaError::ApiError(_) | ChamaError::PaymentGatewayError { .. } => {
                ErrorCategory::Network
            }
            ChamaError::IoError(_) | ChamaError::ZipError(_) | ChamaError::CsvError(_) => {
                ErrorCategory::Storage
            }
            ChamaError::ValidationError { .. }
            | ChamaError::NotFound { .. }
            | ChamaError::Conflict { .. }
            | ChamaError::Unauthorized { .. }
            | ChamaError::Forbidden { .. }
            | ChamaError::InvalidState { .. }
            | ChamaError::PayloadTooLarge { .. }
            | ChamaError::TokenError(_) => ErrorCategory::Client,
            ChamaError::SerializationError(_) => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Client => ErrorSeverity::Low,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Storage | ErrorCategory::Internal => ErrorSeverity::Critical,
        }
    }

    /// 給操作人員的處理建議
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ChamaError::ConfigError { .. }
            | ChamaError::ConfigValidationError { .. }
            | ChamaError::InvalidConfigValueError { .. } => {
                "Check the configuration file and command line flags"
            }
            ChamaError::MissingConfigError { .. } => {
                "Add the missing setting to the configuration file or environment"
            }
            ChamaError::GatewayNotConfigured => "Add an [mpesa] section to the configuration",
            ChamaError::ApiError(_) | ChamaError::PaymentGatewayError { .. } => {
                "Check network connectivity and the payment gateway credentials, then retry"
            }
            ChamaError::IoError(_) | ChamaError::ZipError(_) | ChamaError::CsvError(_) => {
                "Check that the data directory exists and is writable"
            }
            ChamaError::SerializationError(_) => "The snapshot file may be corrupted",
            _ => "Correct the request and try again",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Upstream service problem: {}", self),
            ErrorCategory::Storage => format!("Storage problem: {}", self),
            ErrorCategory::Client => self.to_string(),
            ErrorCategory::Internal => "An internal error occurred".to_string(),
        }
    }

    /// HTTP 回應中的錯誤代碼
    pub fn code(&self) -> &'static str {
        match self {
            ChamaError::ValidationError { .. } => "validation_error",
            ChamaError::NotFound { .. } => "not_found",
            ChamaError::Conflict { .. } => "conflict",
            ChamaError::Unauthorized { .. } | ChamaError::TokenError(_) => "not_authenticated",
            ChamaError::Forbidden { .. } => "permission_denied",
            ChamaError::InvalidState { .. } => "invalid_state",
            ChamaError::PayloadTooLarge { .. } => "payload_too_large",
            ChamaError::PaymentGatewayError { .. } | ChamaError::ApiError(_) => "gateway_error",
            ChamaError::GatewayNotConfigured => "gateway_not_configured",
            _ => "server_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChamaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_low_severity() {
        let err = ChamaError::validation("amount", "must be positive");
        assert_eq!(err.category(), ErrorCategory::Client);
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.to_string(), "amount: must be positive");
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn test_config_errors_are_high_severity() {
        let err = ChamaError::MissingConfigError {
            field: "auth.jwt_secret".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.user_friendly_message().starts_with("Configuration problem"));
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err: ChamaError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.user_friendly_message(), "An internal error occurred");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
