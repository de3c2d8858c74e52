// Error types for the print service client. Every HTTP failure the server
// reports is turned into an `ApiError`; the surrounding enums say which
// operation it came from so the UI can decide whether to keep going.

use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Message used when the server gave us nothing readable to show.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// A non-success response from the Pharos API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub user_message: String,
    /// Kept as a raw JSON value: the server has sent both numbers and strings.
    pub error_code: serde_json::Value,
    pub request_url: Option<String>,
}

/// Error body as sent by the server. Every field is optional so a partial
/// body still yields whatever message it carries.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "Status", default, deserialize_with = "status_code")]
    status: Option<u16>,
    #[serde(rename = "UserMessage")]
    user_message: Option<String>,
    #[serde(rename = "ErrorCode", default)]
    error_code: serde_json::Value,
    #[serde(rename = "Request")]
    request: Option<String>,
}

/// `Status` arrives as a number or a numeric string. Anything else is
/// dropped so the rest of the body still counts.
fn status_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Status {
        Number(u64),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Option::<Status>::deserialize(deserializer)? {
        Some(Status::Number(n)) => u16::try_from(n).ok(),
        Some(Status::Text(s)) => s.trim().parse().ok(),
        Some(Status::Other(_)) | None => None,
    })
}

impl ApiError {
    /// Build an error from a response status and its raw body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => ApiError {
                status: parsed.status.unwrap_or(status.as_u16()),
                user_message: parsed
                    .user_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
                error_code: parsed.error_code,
                request_url: parsed.request,
            },
            Err(_) => ApiError::unknown(status),
        }
    }

    pub fn unknown(status: StatusCode) -> Self {
        ApiError {
            status: status.as_u16(),
            user_message: UNKNOWN_ERROR.to_string(),
            error_code: serde_json::Value::Null,
            request_url: None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Status {}] {}", self.status, self.user_message)
    }
}

impl std::error::Error for ApiError {}

/// Logon failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The saved token was refused; fall back to prompting for credentials.
    #[error("saved token expired or invalid: {0}")]
    TokenRejected(ApiError),

    #[error("logon failed: {0}")]
    CredentialsRejected(ApiError),

    /// Logon "succeeded" but the response can't be used to build a session.
    #[error("bad logon response: {0}")]
    BadResponse(String),
}

/// Per-document upload failures.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload rejected: {0}")]
    Rejected(ApiError),

    /// The server answered 201 Created with a body we could not parse.
    #[error("bad upload response: {0}")]
    BadResponse(String),

    #[error("could not encode print options: {0}")]
    Metadata(serde_json::Error),

    #[error("could not open {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for everything the client does.
#[derive(Debug, Error)]
pub enum PrintError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("could not list print jobs: {0}")]
    JobListing(ApiError),

    #[error("bad job listing response: {0}")]
    BadResponse(String),

    #[error("print job {0} failed on the server")]
    JobFailed(String),

    #[error("print job {job} still processing after {}s", waited.as_secs())]
    PollTimeout { job: String, waited: Duration },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PrintError {
    /// The server-supplied error, when there is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            PrintError::Auth(AuthError::TokenRejected(e))
            | PrintError::Auth(AuthError::CredentialsRejected(e))
            | PrintError::Upload(UploadError::Rejected(e))
            | PrintError::JobListing(e) => Some(e),
            _ => None,
        }
    }
}

/// Failures writing the preferences file. Reading never fails: a broken
/// file just means defaults.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("could not write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize preferences: {0}")]
    Serialize(#[from] toml::ser::Error),
}
