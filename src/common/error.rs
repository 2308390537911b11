//! # Client Errors
//!
//! Every failure of a query round trip is surfaced to the caller as a
//! [`ClientError`]. The client never retries and never logs failures itself;
//! the caller decides what to do with each kind.
//!
//! | Variant | Raised by | Meaning |
//! |---------|-----------|---------|
//! | `InvalidEndpoint` | construction | the endpoint is not an http(s) URL |
//! | `InvalidRequest` | before any I/O | empty command sequence or bad auth parameters |
//! | `Transport` | `submit` | connection, DNS, timeout or body read failure |
//! | `Protocol` | `submit` | the server answered with a non-2xx status |
//! | `MalformedResponse` | `submit` | the body violates the `json`/`blobs` contract |
//! | `Command` | middleware | a command result reported a failing status |
//! | `NotAuthenticated` | middleware | an operation needed a session that is not held |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with status {status}: {body}")]
    Protocol { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("command {command} failed with status {status}: {info}")]
    Command {
        command: String,
        status: i64,
        info: String,
    },

    #[error("no session is held")]
    NotAuthenticated,
}

impl ClientError {
    /// True for the HTTP statuses that invalidate the presented credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Protocol { status, .. } if is_auth_failure(*status))
    }
}

/// 401 and 403 both mean the bearer token was not accepted.
pub(crate) fn is_auth_failure(status: u16) -> bool {
    status == 401 || status == 403
}

pub type Result<T> = std::result::Result<T, ClientError>;
