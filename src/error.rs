use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the remote services (lyrics, metadata search, cover art).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("no internet connection")]
    NoConnectivity,
    #[error("request timed out")]
    RequestTimeout,
    #[error("request was rejected as malformed")]
    BadRequest,
    #[error("nothing found")]
    NotFound,
    #[error("failed to parse response")]
    ParseError,
    #[error("server error")]
    ServerError,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("unknown network error")]
    Unknown,
}

impl NetworkError {
    /// Map an HTTP status that is not a success into the taxonomy.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest,
            404 => Self::NotFound,
            408 => Self::RequestTimeout,
            503 => Self::ServiceUnavailable,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::RequestTimeout
        } else if e.is_connect() {
            Self::NoConnectivity
        } else if e.is_decode() {
            Self::ParseError
        } else if let Some(status) = e.status() {
            Self::from_status(status)
        } else {
            Self::Unknown
        }
    }
}

impl From<tokio::time::error::Elapsed> for NetworkError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::RequestTimeout
    }
}

/// Opaque handle a writer hands out when a file needs a one-time grant
/// before it may be written. Whoever performs the grant uses it to know
/// which file is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionToken(pub String);

impl std::fmt::Display for PermissionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failures touching local files.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalError {
    #[error("no permission to read the file")]
    NoReadPermission,
    #[error("no permission to write {0}")]
    NoWritePermission(PermissionToken),
    #[error("failed to read: {0}")]
    FailedToRead(String),
    #[error("failed to write: {0}")]
    FailedToWrite(String),
    #[error("unknown local error: {0}")]
    Unknown(String),
}

impl LocalError {
    /// Classify an I/O failure that happened while writing `path`.
    pub fn from_io_write(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |e| match e.kind() {
            ErrorKind::PermissionDenied => {
                Self::NoWritePermission(PermissionToken(path.to_string_lossy().to_string()))
            }
            _ => Self::FailedToWrite(format!("{}: {}", path.display(), e)),
        }
    }

    /// Classify an I/O failure that happened while reading `path`.
    pub fn from_io_read(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |e| match e.kind() {
            ErrorKind::PermissionDenied => Self::NoReadPermission,
            _ => Self::FailedToRead(format!("{}: {}", path.display(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert_eq!(NetworkError::from_status(StatusCode::BAD_REQUEST), NetworkError::BadRequest);
        assert_eq!(NetworkError::from_status(StatusCode::NOT_FOUND), NetworkError::NotFound);
        assert_eq!(
            NetworkError::from_status(StatusCode::SERVICE_UNAVAILABLE),
            NetworkError::ServiceUnavailable
        );
        assert_eq!(
            NetworkError::from_status(StatusCode::BAD_GATEWAY),
            NetworkError::ServerError
        );
        assert_eq!(NetworkError::from_status(StatusCode::IM_A_TEAPOT), NetworkError::Unknown);
    }

    #[test]
    fn test_write_permission_carries_token() {
        let err = LocalError::NoWritePermission(PermissionToken("/music/a.flac".into()));
        assert_eq!(err.to_string(), "no permission to write /music/a.flac");
    }

    #[test]
    fn test_io_classification() {
        let path = Path::new("/music/a.flac");
        let denied = std::io::Error::new(ErrorKind::PermissionDenied, "nope");
        assert_eq!(
            LocalError::from_io_write(path)(denied),
            LocalError::NoWritePermission(PermissionToken("/music/a.flac".into()))
        );

        let missing = std::io::Error::new(ErrorKind::NotFound, "gone");
        assert!(matches!(
            LocalError::from_io_read(path)(missing),
            LocalError::FailedToRead(_)
        ));
    }
}
