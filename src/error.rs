//! Defines the application's primary error type `AppError` and a convenience `Result` alias.
//!
//! Uses the `thiserror` crate for ergonomic error definition and provides `From`
//! implementations to convert common external errors into `AppError` variants.
//! Errors that do not implement `Clone` are wrapped in `Arc` so that `AppError` can be
//! published through watch channels and stored as a provider's side-channel error.

use std::sync::Arc;
use thiserror::Error;

/// The primary error enumeration for all application-specific errors.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Transport-level failure from the HTTP client (`reqwest`): DNS, connect, timeout.
    #[error("API Error: {0}")]
    Api(Arc<reqwest::Error>),

    /// The backend answered with a non-2xx status.
    #[error("Request to {url} failed with HTTP status {status}")]
    Request { status: u16, url: String },

    /// The backend answered with a body that does not have the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The rendering surface cannot be used at all.
    #[error("Rendering capability unavailable: {0}")]
    Capability(String),

    /// A runtime rendering failure that persisted past the grace period.
    #[error("Rendering failure: {0}")]
    Render(String),

    /// A layer factory failed while building its layer.
    #[error("Layer construction failed: {0}")]
    Layer(String),

    /// Invalid configuration value.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error related to accessing environment variables.
    #[error("Environment Error: {0}")]
    Env(#[from] std::env::VarError),

    /// Error specific to CLI logic or argument handling.
    #[error("CLI Error: {0}")]
    Cli(String),

    /// Error originating from user interaction prompts (`dialoguer`).
    #[error("Dialoguer Error: {0}")]
    Dialoguer(Arc<dialoguer::Error>),

    /// Error related to progress bar style templating (`indicatif`).
    #[error("Progress Style Template Error: {0}")]
    Template(Arc<indicatif::style::TemplateError>),
}

impl AppError {
    /// HTTP status carried by a request failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Request { status, .. } => Some(*status),
            AppError::Api(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True for failures of the remote data API (transport or status).
    pub fn is_network(&self) -> bool {
        matches!(self, AppError::Api(_) | AppError::Request { .. })
    }
}

/// A specialized `Result` type using the application's `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

// --- From implementations ---

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Api(Arc::new(err))
    }
}

impl From<dialoguer::Error> for AppError {
    fn from(err: dialoguer::Error) -> Self {
        AppError::Dialoguer(Arc::new(err))
    }
}

impl From<indicatif::style::TemplateError> for AppError {
    fn from(err: indicatif::style::TemplateError) -> Self {
        AppError::Template(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failure_reports_status() {
        let err = AppError::Request {
            status: 503,
            url: "http://localhost/api/stations".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert!(err.is_network());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn decode_failure_is_not_network() {
        let err = AppError::Decode("expected array".to_string());
        assert!(!err.is_network());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn missing_env_var_converts_and_clones() {
        let missing = std::env::var("CLIMATE_DASH_NEVER_SET");
        let err: AppError = missing.unwrap_err().into();
        let cloned = err.clone();
        assert!(matches!(cloned, AppError::Env(std::env::VarError::NotPresent)));
        assert!(!cloned.is_network());
    }
}
