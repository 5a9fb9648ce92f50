use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "OPENROUTER_API_KEY", "request.authorAge")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "gateway_config", "poem_request")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the gateway.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// User input rejected before any upstream call. The message is user-facing.
    #[error("{message}")]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Upstream provider answered with an error, either as an HTTP status or
    /// as an error object inside the event stream.
    #[error("Remote error from {provider}: HTTP {status}: {message}")]
    Remote {
        provider: String,
        status: u16,
        message: String,
    },

    /// The stream closed before any text was produced.
    #[error("Model {model} returned an empty response")]
    EmptyResponse { model: String },

    /// Every candidate failed with a retryable classification.
    #[error("All models are currently busy after {attempts} attempt(s){}", format_last(.last))]
    Exhausted {
        attempts: usize,
        last: Option<Box<Error>>,
    },

    /// Caller-initiated cancellation. Never a provider failure.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Counter store error ({store}): {message}")]
    Store {
        store: &'static str,
        message: String,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_last(last: &Option<Box<Error>>) -> String {
    match last {
        Some(e) => format!("; last error: {}", e),
        None => String::new(),
    }
}

impl Error {
    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn store(store: &'static str, msg: impl Into<String>) -> Self {
        Error::Store {
            store,
            message: msg.into(),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// The error of the final attempt: the wrapped error for [`Error::Exhausted`], otherwise `self`.
    pub fn last_attempt(&self) -> &Error {
        match self {
            Error::Exhausted {
                last: Some(inner), ..
            } => inner.last_attempt(),
            other => other,
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::store("redis", e.to_string())
    }
}
