//! Error types for DaisyChain.
//!
//! The first five variants form the protocol taxonomy. Their `Display` output
//! starts with the taxonomy name and is shipped verbatim as the `error` field
//! of a response. The remaining variants describe local failures (sockets,
//! configuration, client-side RPC errors).

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for the DaisyChain bridge.
#[derive(Debug, Error)]
pub enum DaisyError {
    // Protocol taxonomy
    #[error("SchemaError: invalid request field '{field}': {message}")]
    Schema { field: String, message: String },

    #[error("LookupError: no object registered under id '{id}'")]
    Lookup { id: String },

    #[error("LookupError: empty root can only be used with '{bootstrap}', got '{method}'")]
    UnboundRoot { method: String, bootstrap: String },

    #[error("AttributeError: '{type_name}' object has no method '{method}'")]
    Attribute { type_name: String, method: String },

    #[error("InvocationError: {type_name}.{method} failed: {message}")]
    Invocation {
        type_name: String,
        method: String,
        message: String,
    },

    #[error("SerializationError: {message}")]
    Serialization { message: String },

    // Raised by method implementations for bad arguments; reported as InvocationError
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    // Transport errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Connection to {addr} failed: {message}")]
    Connection { addr: SocketAddr, message: String },

    #[error("Request to {addr} timed out after {after:?}")]
    Timeout {
        addr: SocketAddr,
        after: std::time::Duration,
    },

    #[error("Message of {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Error carried back by a host response.
    #[error("RPCError: {message}")]
    Rpc { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for DaisyChain operations.
pub type Result<T> = std::result::Result<T, DaisyError>;

impl From<std::io::Error> for DaisyError {
    fn from(err: std::io::Error) -> Self {
        DaisyError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DaisyError {
    fn from(err: serde_json::Error) -> Self {
        DaisyError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl DaisyError {
    /// Shorthand for an argument error raised inside a remote method.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        DaisyError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Shorthand for a serialization failure.
    pub fn serialization(message: impl Into<String>) -> Self {
        DaisyError::Serialization {
            message: message.into(),
        }
    }

    /// Taxonomy name used as the prefix of protocol error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            DaisyError::Schema { .. } | DaisyError::Json { .. } => "SchemaError",
            DaisyError::Lookup { .. } | DaisyError::UnboundRoot { .. } => "LookupError",
            DaisyError::Attribute { .. } => "AttributeError",
            DaisyError::Invocation { .. } | DaisyError::InvalidArguments { .. } => {
                "InvocationError"
            }
            DaisyError::Serialization { .. } => "SerializationError",
            DaisyError::Rpc { .. } => "RPCError",
            DaisyError::Io { .. }
            | DaisyError::Connection { .. }
            | DaisyError::Timeout { .. }
            | DaisyError::MessageTooLarge { .. } => "TransportError",
            DaisyError::Config { .. } => "ConfigError",
            DaisyError::Other(_) => "Error",
        }
    }

    /// Check if this error came from the transport rather than the host.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DaisyError::Io { .. }
                | DaisyError::Connection { .. }
                | DaisyError::Timeout { .. }
                | DaisyError::MessageTooLarge { .. }
        )
    }
}
