//! Error types for startup and request handling

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems, raised before any socket is bound
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid upload folder: {0:?}")]
    InvalidFolder(String),

    #[error("TLS requested but no {what} file was given")]
    TlsMaterialMissing { what: &'static str },

    #[error("cannot load TLS certificate/key: {0}")]
    TlsMaterialInvalid(#[source] std::io::Error),

    #[error("cannot create upload folder {path}: {source}")]
    UploadRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Why a file name or request path was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("name is empty")]
    Empty,
    #[error("name contains a path separator")]
    Separator,
    #[error("name refers to a parent or current directory")]
    Traversal,
    #[error("name contains control characters")]
    ControlCharacter,
    #[error("name is longer than {max} bytes")]
    TooLong { max: usize },
    #[error("name is a reserved device name")]
    Reserved,
    #[error("path resolves outside the upload folder")]
    OutsideRoot,
}

/// Per-request failures. None of these stop the listener.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is not multipart/form-data: {0}")]
    NotMultipart(#[from] MultipartRejection),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("no file parts in upload")]
    NoFiles,

    #[error("rejected file name {name:?}: {reason}")]
    PathRejected { name: String, reason: PathRejection },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("not found")]
    NotFound,
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::NotMultipart(rejection) => rejection.status(),
            RequestError::Multipart(err) => err.status(),
            RequestError::NoFiles => StatusCode::BAD_REQUEST,
            RequestError::PathRejected { .. } => StatusCode::FORBIDDEN,
            RequestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RequestError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected ({}): {}", status, self);
        }

        // Storage details stay in the log
        let message = match &self {
            RequestError::Storage(_) => "Failed to store upload".to_string(),
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}
