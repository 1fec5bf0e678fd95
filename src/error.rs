use std::fmt;

use crate::operations::RemoteErrorKind;

#[derive(Debug)]
pub enum Error {
    /// Invalid long-lived token, invalid refresh token or missing credentials
    Auth(String),
    /// The service rejected the bearer credential
    Unauthenticated(String),
    Api(String),
    RateLimited,
    ConnectionError(String),
    ConnectionTimeout,
    /// A mutation reached the service and was rejected by it
    Remote {
        kind: RemoteErrorKind,
        message: String,
    },
    Validation(String),
    NoControllers,
    Http(reqwest::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl Error {
    /// Transient failures that the fleet poller answers with a full session recovery.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited
                | Error::ConnectionError(_)
                | Error::ConnectionTimeout
                | Error::Io(_)
                | Error::Http(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Error::Unauthenticated(msg) => write!(f, "Unauthenticated: {}", msg),
            Error::Api(msg) => write!(f, "API error: {}", msg),
            Error::RateLimited => write!(f, "You are being rate-limited. Try waiting a bit."),
            Error::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Error::ConnectionTimeout => write!(f, "Connection timed out"),
            Error::Remote { kind, message } => write!(f, "{}: {}", kind, message),
            Error::Validation(msg) => write!(f, "Invalid value: {}", msg),
            Error::NoControllers => write!(f, "No matching controllers found"),
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::ConnectionTimeout
        } else if err.is_connect() {
            Error::ConnectionError(err.to_string())
        } else {
            Error::Http(err)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
