//! Error types for the tool-calling loop

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the loop engine
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// API error from the model server, with the HTTP status when known
    #[error("API error: {message}")]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// The model asked for a tool that is not in the visible set
    #[error("Tool '{requested}' not found; visible tools: [{}]", .visible.join(", "))]
    ToolNotFound {
        requested: String,
        visible: Vec<String>,
    },

    /// The loop hit its iteration ceiling without a plain answer
    #[error("Maximum iterations ({max_iterations}) exceeded without a final answer")]
    MaxIterationsExceeded { max_iterations: u32 },

    /// A retryable failure persisted until the attempt ceiling
    #[error("Inference failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Control-flow signal asking the planner to replan; not a failure
    #[error("Replan requested: {reason}")]
    ReplanRequested { reason: String },

    /// The loop invocation was cancelled by its caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation attempted in a state that does not allow it
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Operation not supported by this implementation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], consumed by the retry classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Cooperative control flow (replan, cancellation). Never retried.
    ControlFlow,
    /// Infrastructure hiccups: transport, timeouts, 5xx.
    Transient,
    /// Caller bugs: bad arguments, illegal state, unsupported operations.
    ContractViolation,
    /// Deterministic failures that only a rate limit can make retryable.
    NonTransient,
    /// Anything else.
    Unclassified,
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error without a status code
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api {
            status: None,
            message: msg.into(),
        }
    }

    /// Create an API error for a failed HTTP response
    pub fn api_status(status: u16, msg: impl Into<String>) -> Self {
        Error::Api {
            status: Some(status),
            message: msg.into(),
        }
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a tool-not-found error
    pub fn tool_not_found(requested: impl Into<String>, visible: Vec<String>) -> Self {
        Error::ToolNotFound {
            requested: requested.into(),
            visible,
        }
    }

    /// Create a replan signal
    pub fn replan(reason: impl Into<String>) -> Self {
        Error::ReplanRequested {
            reason: reason.into(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new illegal state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Error::IllegalState(msg.into())
    }

    /// Create a new unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// True for signals that steer the loop rather than report a fault.
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Error::ReplanRequested { .. } | Error::Cancelled)
    }

    /// Classify this error for retry decisions.
    ///
    /// API errors carrying a 5xx status are transient; every other API error
    /// is non-transient and only retried when it reads like a rate limit.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::ReplanRequested { .. } | Error::Cancelled => ErrorClass::ControlFlow,
            Error::Http(_) | Error::Timeout | Error::Stream(_) => ErrorClass::Transient,
            Error::Api {
                status: Some(status),
                ..
            } if *status >= 500 => ErrorClass::Transient,
            Error::Api { .. } => ErrorClass::NonTransient,
            Error::Config(_)
            | Error::InvalidInput(_)
            | Error::IllegalState(_)
            | Error::Unsupported(_) => ErrorClass::ContractViolation,
            Error::Tool(_)
            | Error::ToolNotFound { .. }
            | Error::MaxIterationsExceeded { .. }
            | Error::RetriesExhausted { .. } => ErrorClass::NonTransient,
            Error::Json(_) | Error::Other(_) => ErrorClass::Unclassified,
        }
    }
}
