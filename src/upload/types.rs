//! Upload types
//!
//! Models for token acquisition and the per-run upload outcome.

use serde::Deserialize;

/// Bearer token used to authorize Graph requests
#[derive(Debug, Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Response from the identity authority's token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Outcome of one directory sync
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Files uploaded and deleted locally
    pub uploaded: usize,
    /// Files left in place for the next run (non-2xx upload status)
    pub skipped: usize,
}

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Token request failed: {0}")]
    TokenRequest(String),

    #[error("Token response carried no access token")]
    TokenMissing,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
