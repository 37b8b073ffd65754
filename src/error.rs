use std::time::Duration;

use aws_sdk_ecr::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Broad classes of resolution failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or missing account context
    Validation,
    /// Account-suffixed AWS variables present but incomplete
    PartialConfig,
    /// Neither suffixed nor standard AWS credentials available
    FallbackExhausted,
    /// Authorization-token or assume-role call failed
    Remote,
    /// Malformed registry token payload
    Decode,
    /// The helper verb is not implemented
    Unsupported,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid server URL {url:?}: {source}")]
    InvalidServerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("server URL {0:?} has no host")]
    MissingHost(String),

    #[error("account ID must be set")]
    MissingAccountId,

    #[error("environment variable {variable} not found")]
    IncompleteAccountCredentials { variable: String },

    #[error("no account credentials found and standard {variable} not found")]
    NoCredentials { variable: String },

    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    #[error("ecr: {0}")]
    Decode(String),

    #[error("token exchange timed out after {0:?}")]
    Timeout(Duration),

    #[error("{verb}: not supported")]
    NotSupported { verb: &'static str },
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidServerUrl { .. } | Self::MissingHost(_) | Self::MissingAccountId => {
                ErrorKind::Validation
            }
            Self::IncompleteAccountCredentials { .. } => ErrorKind::PartialConfig,
            Self::NoCredentials { .. } => ErrorKind::FallbackExhausted,
            Self::Remote { .. } | Self::Timeout(_) => ErrorKind::Remote,
            Self::Decode(_) => ErrorKind::Decode,
            Self::NotSupported { .. } => ErrorKind::Unsupported,
        }
    }
}

/// One-line description of a failed ECR or STS call.
///
/// Service errors report `<code>: <message>` from the response metadata.
/// Transport and construction failures fall back to the full error chain.
pub fn describe_sdk_error<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if let Some(service_error) = err.as_service_error() {
        match (service_error.code(), service_error.message()) {
            (Some(code), Some(message)) => return format!("{}: {}", code, message),
            (None, Some(message)) => return message.to_string(),
            (Some(code), None) => return code.to_string(),
            (None, None) => {}
        }
    }

    DisplayErrorContext(err).to_string()
}
