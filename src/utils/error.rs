use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfraError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid port rule #{index} '{token}': {reason}")]
    PortSpecError {
        index: usize,
        token: String,
        reason: String,
    },

    #[error("Duplicate port rule {protocol}:{port}")]
    DuplicatePortRule { protocol: String, port: u16 },

    #[error("Security rule priority {priority} is outside {min}..={max}")]
    PriorityOverflow { priority: u32, min: u16, max: u16 },

    #[error("Resource '{name}' is declared more than once")]
    DuplicateResource { name: String },

    #[error("Resource '{resource}' references '{reference}', which is not declared before it")]
    UndeclaredReference { resource: String, reference: String },

    #[error("Output '{key}' is exported more than once")]
    DuplicateOutput { key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Declaration,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl InfraError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            InfraError::IoError(_) | InfraError::SerializationError(_) => ErrorCategory::Storage,
            InfraError::ConfigError { .. }
            | InfraError::ConfigValidationError { .. }
            | InfraError::MissingConfigError { .. }
            | InfraError::InvalidConfigValueError { .. }
            | InfraError::PortSpecError { .. }
            | InfraError::DuplicatePortRule { .. }
            | InfraError::PriorityOverflow { .. } => ErrorCategory::Configuration,
            InfraError::DuplicateResource { .. }
            | InfraError::UndeclaredReference { .. }
            | InfraError::DuplicateOutput { .. } => ErrorCategory::Declaration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration => ErrorSeverity::High,
            // 宣告錯誤代表程式本身有問題
            ErrorCategory::Declaration => ErrorSeverity::High,
            ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            InfraError::IoError(_) => {
                "Check that the output directory exists and is writable".to_string()
            }
            InfraError::SerializationError(_) => {
                "The rendered program could not be serialized; run with --verbose".to_string()
            }
            InfraError::ConfigError { .. } | InfraError::ConfigValidationError { .. } => {
                "Review the TOML configuration file".to_string()
            }
            InfraError::MissingConfigError { field } => {
                format!("Add '{}' to the configuration file", field)
            }
            InfraError::InvalidConfigValueError { field, .. } => {
                format!("Fix the value of '{}'", field)
            }
            InfraError::PortSpecError { .. } => {
                "Port rules must look like \"Tcp:2456\" or \"Udp:2457\"".to_string()
            }
            InfraError::DuplicatePortRule { .. } => {
                "Remove the repeated entry from network.ports".to_string()
            }
            InfraError::PriorityOverflow { .. } => {
                "Lower network.base_priority or shorten network.ports".to_string()
            }
            InfraError::DuplicateResource { .. }
            | InfraError::UndeclaredReference { .. }
            | InfraError::DuplicateOutput { .. } => {
                "The resource declaration order is broken; this is a bug in the deployment".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Declaration => format!("Invalid resource graph: {}", self),
            ErrorCategory::Storage => format!("Could not write the program: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, InfraError>;
