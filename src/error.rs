//! Error taxonomy for the engine.
//!
//! `EngineError` is deliberately flat rather than nested per-subsystem:
//! every HTTP handler needs to map directly from a variant to a status
//! code, and every worker needs to decide retryability directly from a
//! variant, so the flat shape keeps both of those call sites simple.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    // client errors
    #[error("Missing required field: url")]
    MissingUrl,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Unsupported Amazon domain")]
    UnsupportedDomain,
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    // auth errors
    #[error("API key is required")]
    MissingCredential,
    #[error("Invalid API key")]
    InvalidCredential,

    // policy errors
    #[error("{0}")]
    RateLimited(String),
    #[error("Service temporarily unavailable")]
    BreakerOpen,

    // upstream errors
    #[error("Scrape timed out")]
    Timeout,
    #[error("CAPTCHA_REQUIRED")]
    Captcha,
    #[error("Invalid Amazon URL - ASIN not found")]
    ExtractionFailed,
    #[error("render error: {0}")]
    RenderError(String),
    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    // infrastructure errors
    #[error("request body too large")]
    BodyTooLarge,
    #[error("internal error: {0}")]
    Internal(String),

    // extractor availability
    #[error("Scraper for {0} is not yet implemented")]
    NoExtractor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl EngineError {
    /// Whether a worker should retry this failure — CAPTCHA is terminal
    /// without retry, other upstream failures retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout
                | EngineError::RenderError(_)
                | EngineError::BrowserUnavailable(_)
                | EngineError::ExtractionFailed
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EngineError::InvalidUrl(_) | EngineError::UnsupportedDomain => ErrorSeverity::Low,
            EngineError::BreakerOpen | EngineError::BrowserUnavailable(_) => ErrorSeverity::High,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Maps a variant to its HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::MissingUrl
            | EngineError::InvalidUrl(_)
            | EngineError::UnsupportedDomain
            | EngineError::MalformedBody(_) => 400,
            EngineError::MissingCredential => 401,
            EngineError::InvalidCredential => 403,
            EngineError::NoExtractor(_) => 501,
            EngineError::RateLimited(_) => 429,
            EngineError::BreakerOpen => 503,
            EngineError::Timeout => 504,
            EngineError::BodyTooLarge => 413,
            EngineError::Captcha
            | EngineError::ExtractionFailed
            | EngineError::RenderError(_)
            | EngineError::BrowserUnavailable(_)
            | EngineError::Internal(_) => 500,
        }
    }

    /// Short machine-readable error tag used in the `error` field of the
    /// JSON error body.
    pub fn error_tag(&self) -> &'static str {
        match self {
            EngineError::MissingUrl => "Missing required field: url",
            EngineError::InvalidUrl(_) => "Invalid URL",
            EngineError::UnsupportedDomain => "Unsupported Amazon domain",
            EngineError::MalformedBody(_) => "Malformed request",
            EngineError::MissingCredential => "API key is required",
            EngineError::InvalidCredential => "Invalid API key",
            EngineError::RateLimited(_) => "Rate limit exceeded",
            EngineError::BreakerOpen => "Service temporarily unavailable",
            EngineError::Timeout => "Timeout",
            EngineError::Captcha => "CAPTCHA_REQUIRED",
            EngineError::ExtractionFailed => "Invalid Amazon URL - ASIN not found",
            EngineError::RenderError(_) => "Scrape failed",
            EngineError::BrowserUnavailable(_) => "Browser unavailable",
            EngineError::BodyTooLarge => "Request body too large",
            EngineError::Internal(_) => "Internal server error",
            EngineError::NoExtractor(_) => "Scraper not available",
        }
    }
}
