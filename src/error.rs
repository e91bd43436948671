use std::path::PathBuf;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EsError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("document #{position} has no id")]
    MissingId { position: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to serialize bulk line: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("error getting response: {0}")]
    Transport(#[from] reqwest::Error),
    /// Error response carrying the store's structured `error.type` / `error.reason`.
    #[error("[{status}] {error_type}: {reason}")]
    Response {
        status: StatusCode,
        error_type: String,
        reason: String,
    },
    /// Error response whose body could not be parsed as a structured error.
    #[error("[{status}] error parsing the response body: {body}")]
    Status { status: StatusCode, body: String },
    #[error("error parsing the response body: {0}")]
    Decode(String),
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EsError {
    pub fn is_transport(&self) -> bool {
        matches!(self, EsError::Transport(_))
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            EsError::Response { status, .. } | EsError::Status { status, .. } => Some(*status),
            EsError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EsError>;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured {
        #[serde(rename = "type")]
        error_type: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Plain(String),
}

/// Turns a non-success answer into an error, keeping the store's
/// `error.type` and `error.reason` when the body has them.
pub(crate) fn from_error_body(status: StatusCode, body: &str) -> EsError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorDetail::Structured { error_type, reason },
        }) => EsError::Response {
            status,
            error_type,
            reason: reason.unwrap_or_default(),
        },
        Ok(ErrorBody {
            error: ErrorDetail::Plain(reason),
        }) => EsError::Response {
            status,
            error_type: String::from("error"),
            reason,
        },
        Err(_) => EsError::Status {
            status,
            body: body.to_string(),
        },
    }
}
