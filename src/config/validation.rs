//! Configuration validation system.

use super::types::RelayConfig;

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Configuration is invalid.
    Error,
    /// Configuration is usable but probably not what was meant.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue.
    pub fn add(&mut self, issue: ValidationError) {
        self.issues.push(issue);
    }

    /// Check if the validation passed (no errors, warnings allowed).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// All recorded issues.
    #[must_use]
    pub fn issues(&self) -> &[ValidationError] {
        &self.issues
    }

    /// Only errors.
    #[must_use]
    pub fn errors(&self) -> Vec<&ValidationError> {
        self.issues
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Error)
            .collect()
    }

    /// Only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.issues
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any issues.
    fn validate(&self, config: &RelayConfig) -> ValidationResult;
}

/// Built-in validator for the relay's structural requirements.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &RelayConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if config.target.host.trim().is_empty() {
            result.add(ValidationError::error(
                "target.host",
                "Target host cannot be empty",
            ));
        }

        if config.target.port == 0 {
            result.add(ValidationError::error(
                "target.port",
                "Target port cannot be 0",
            ));
        }

        if config.udp.enabled && config.udp_listen_addr().is_none() {
            result.add(ValidationError::error(
                "listen.port",
                format!(
                    "UDP listens on port + 1, which does not exist for port {}",
                    config.listen.port
                ),
            ));
        }

        if config.tcp.buffer_size == 0 {
            result.add(ValidationError::error(
                "tcp.buffer_size",
                "Buffer size must be greater than 0",
            ));
        }

        if config.udp.reply_timeout.is_zero() {
            result.add(ValidationError::error(
                "udp.reply_timeout",
                "Reply timeout must be greater than 0",
            ));
        }

        if config.metrics.enabled && config.metrics.interval.is_zero() {
            result.add(ValidationError::error(
                "metrics.interval",
                "Metrics interval must be greater than 0",
            ));
        }

        if config.logging.full_dump && !config.logging.log_data {
            result.add(ValidationError::warning(
                "logging.full_dump",
                "full_dump implies log_data; payload logging will be enabled",
            ));
        }

        result
    }
}
