use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LookoutError {
    /// Upstream request failed: connection, timeout, non-2xx or undecodable body.
    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{0}")]
    NotConfigured(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP server error: {0}")]
    McpServer(String),
}

pub type Result<T> = std::result::Result<T, LookoutError>;

/// Coarse error classes surfaced to agents and the sidebar host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    NotConfigured,
    NotFound,
    Validation,
    Internal,
}

crate::enum_display!(ErrorKind, {
    Transport => "TransportError",
    NotConfigured => "NotConfigured",
    NotFound => "NotFound",
    Validation => "ValidationError",
    Internal => "InternalError",
});

impl LookoutError {
    pub fn transport(provider: &'static str, message: impl Into<String>) -> Self {
        LookoutError::Transport {
            provider,
            status: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LookoutError::Transport { .. } => ErrorKind::Transport,
            LookoutError::NotConfigured(_) => ErrorKind::NotConfigured,
            LookoutError::NotFound(_) => ErrorKind::NotFound,
            LookoutError::Validation(_) => ErrorKind::Validation,
            LookoutError::Config(_) => ErrorKind::NotConfigured,
            LookoutError::Io(_)
            | LookoutError::YamlParse(_)
            | LookoutError::Json(_)
            | LookoutError::McpServer(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status of a transport failure, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            LookoutError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LookoutError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        LookoutError::Transport {
            provider: "HTTP",
            status,
            message,
        }
    }
}

/// Error payload returned by tool and intent handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<LookoutError> for ToolError {
    fn from(err: LookoutError) -> Self {
        ToolError::new(err.kind(), err.to_string())
    }
}
