//! Browser error types

use thiserror::Error;

/// Browser-related errors
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript error: {0}")]
    JavaScriptError(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Click intercepted: {0}")]
    ClickIntercepted(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BrowserError {
    /// Whether this failure kind warrants re-running the same step.
    ///
    /// These are the transient UI-timing failures: the element has not
    /// appeared yet, stopped being clickable, or something briefly overlaid
    /// it. Everything else (launch, navigation, JS, lost connection) aborts
    /// the session attempt instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrowserError::Timeout(_)
                | BrowserError::ElementNotFound(_)
                | BrowserError::ClickIntercepted(_)
        )
    }
}

impl From<BrowserError> for String {
    fn from(err: BrowserError) -> String {
        err.to_string()
    }
}
