//! Export workflow driver
//!
//! Owns the whole run: launch a browser session, walk the step sequence with
//! per-step retries, restart the session from scratch when a step keeps
//! failing, then hand the downloaded files to the upload phase.
//!
//! The restart policy lives here, at the top level, as a bounded loop: a
//! session attempt that dies consumes one attempt from the budget, and when
//! the budget runs out the run fails with a typed error instead of looping
//! forever.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::browser::{BrowserError, BrowserSession, BrowserSessionConfig};
use crate::upload::{DriveUploader, TokenClient, UploadError, UploadReport};
use crate::workflow::steps::{export_sequence, load_steps, resolve_steps, StepSpec};
use crate::{AppConfig, ConfigError};

/// Retries per step before the session attempt is abandoned
const STEP_RETRIES: u32 = 2;

/// Grace period between the export click and teardown, so the download
/// finishes landing on disk
const DOWNLOAD_SETTLE: Duration = Duration::from_secs(1);

/// Workflow-level errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Step '{step}' failed after {attempts} attempt(s): {source}")]
    StepFailed {
        step: String,
        attempts: u32,
        #[source]
        source: BrowserError,
    },

    #[error("Browser session error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Gave up after {attempts} session attempt(s); last error: {last}")]
    RestartsExhausted { attempts: u32, last: String },

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl WorkflowError {
    /// Whether this failure tears the session down and consumes a restart
    fn is_session_failure(&self) -> bool {
        matches!(
            self,
            WorkflowError::StepFailed { .. } | WorkflowError::Browser(_)
        )
    }
}

/// Drives one export-and-upload run
pub struct ExportRunner {
    config: AppConfig,
    steps: Vec<StepSpec>,
}

impl ExportRunner {
    /// Build a runner from the app config, loading the step sequence from
    /// the configured file or falling back to the built-in one.
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let raw = match &config.steps_file {
            Some(path) => load_steps(path)?,
            None => export_sequence(),
        };
        let steps = resolve_steps(&raw, &config.step_vars());
        Ok(Self { config, steps })
    }

    /// Run the full workflow: export with bounded session restarts, then
    /// upload everything in the data directory.
    pub async fn run(&self) -> Result<UploadReport, WorkflowError> {
        let max_attempts = self.config.max_session_attempts;
        run_with_attempts(max_attempts, move |attempt| self.export_once(attempt)).await?;

        info!(
            "Export finished, uploading contents of {}",
            self.config.data_path.display()
        );

        let token_client = TokenClient::new(&self.config.authority, &self.config.client_id)?;
        let token = token_client
            .acquire(
                &self.config.username,
                &self.config.graph_password,
                &self.config.scope(),
            )
            .await?;

        let uploader = DriveUploader::new(self.config.endpoint(), token)?;
        let report = uploader.sync_directory(&self.config.data_path).await?;

        info!(
            "Upload finished: {} uploaded, {} left for the next run",
            report.uploaded, report.skipped
        );
        Ok(report)
    }

    /// One full session attempt: launch, click through every step, settle,
    /// tear down. The session is closed on both paths.
    async fn export_once(&self, attempt: u32) -> Result<(), WorkflowError> {
        info!(
            "Starting export session (attempt {}/{})",
            attempt, self.config.max_session_attempts
        );

        let session_config = BrowserSessionConfig::new(&self.config.data_path)
            .headless(self.config.headless)
            .chrome_path(self.config.chrome_path.clone())
            .step_timeout(self.config.step_timeout_secs);

        let session = BrowserSession::new(session_config).await?;

        match self.drive_sequence(&session).await {
            Ok(()) => {
                tokio::time::sleep(DOWNLOAD_SETTLE).await;
                session.close().await?;
                info!("Export session finished");
                Ok(())
            }
            Err(e) => {
                let _ = session.close().await;
                Err(e)
            }
        }
    }

    async fn drive_sequence(&self, session: &BrowserSession) -> Result<(), WorkflowError> {
        session.navigate(&self.config.console_url).await?;

        for step in &self.steps {
            info!("Step: {}", step.name);
            with_step_retry(&step.name, STEP_RETRIES, move |_| execute_step(session, step))
                .await?;
        }

        Ok(())
    }
}

/// Execute one step: wait for the find target to become clickable, type the
/// input if a non-empty value was supplied, click, then wait for the
/// expected element when one is given.
async fn execute_step(session: &BrowserSession, step: &StepSpec) -> Result<(), BrowserError> {
    session.wait_for_clickable(&step.find).await?;

    if let Some(input) = step.effective_input() {
        session.type_text(&input.field, &input.value).await?;
    }

    session.click(&step.click).await?;

    if let Some(expect) = &step.expect {
        session.wait_for_present(expect).await?;
    }

    Ok(())
}

/// Run one step operation with bounded retries on UI-timing failures.
///
/// Retryable failures (timeout, element not found, click intercepted) re-run
/// the step up to `retries` extra times; anything else, or a retryable
/// failure on the last attempt, surfaces as `StepFailed` so the session
/// attempt is abandoned.
async fn with_step_retry<F, Fut>(
    name: &str,
    retries: u32,
    mut op: F,
) -> Result<(), WorkflowError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), BrowserError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Step '{}' recovered on attempt {}", name, attempt);
                }
                return Ok(());
            }
            Err(e) if e.is_retryable() && attempt <= retries => {
                warn!(
                    "Step '{}' attempt {}/{} failed: {} - retrying",
                    name,
                    attempt,
                    retries + 1,
                    e
                );
            }
            Err(e) => {
                return Err(WorkflowError::StepFailed {
                    step: name.to_string(),
                    attempts: attempt,
                    source: e,
                });
            }
        }
    }
}

/// Run session attempts until one succeeds or the budget is exhausted.
///
/// Only session failures (a dead step or a browser error) consume an
/// attempt; anything else aborts immediately. The exhaustion error carries
/// the last failure so the give-up condition shows up in logs and exit
/// status.
async fn run_with_attempts<F, Fut>(max_attempts: u32, mut attempt_fn: F) -> Result<(), WorkflowError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), WorkflowError>>,
{
    let mut last: Option<WorkflowError> = None;

    for attempt in 1..=max_attempts {
        match attempt_fn(attempt).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_session_failure() => {
                warn!(
                    "Session attempt {}/{} failed: {} - restarting from scratch",
                    attempt, max_attempts, e
                );
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(WorkflowError::RestartsExhausted {
        attempts: max_attempts,
        last: last.map(|e| e.to_string()).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn intercepted() -> BrowserError {
        BrowserError::ClickIntercepted("#export".into())
    }

    #[tokio::test]
    async fn test_step_recovers_after_two_intercepted_clicks() {
        let calls = Cell::new(0u32);
        let result = with_step_retry("download_csv", STEP_RETRIES, |_| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(intercepted())
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_step_gives_up_after_three_timeouts() {
        let calls = Cell::new(0u32);
        let result = with_step_retry("run_search", STEP_RETRIES, |_| {
            calls.set(calls.get() + 1);
            async { Err(BrowserError::Timeout("30s".into())) }
        })
        .await;

        assert_eq!(calls.get(), 3);
        match result {
            Err(WorkflowError::StepFailed { step, attempts, .. }) => {
                assert_eq!(step, "run_search");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected StepFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_step_error_fails_immediately() {
        let calls = Cell::new(0u32);
        let result = with_step_retry("log_in_ibm", STEP_RETRIES, |_| {
            calls.set(calls.get() + 1);
            async { Err(BrowserError::NavigationFailed("dns".into())) }
        })
        .await;

        assert_eq!(calls.get(), 1);
        match result {
            Err(WorkflowError::StepFailed { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("expected StepFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_restarts_until_success() {
        let calls = Cell::new(0u32);
        let result = run_with_attempts(3, |_| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 2 {
                    Err(WorkflowError::StepFailed {
                        step: "enter_password".into(),
                        attempts: 3,
                        source: BrowserError::Timeout("30s".into()),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_restart_budget_exhaustion_is_observable() {
        let calls = Cell::new(0u32);
        let result = run_with_attempts(3, |_| {
            calls.set(calls.get() + 1);
            async {
                Err(WorkflowError::StepFailed {
                    step: "select_application".into(),
                    attempts: 3,
                    source: BrowserError::ElementNotFound("a[tabindex]".into()),
                })
            }
        })
        .await;

        assert_eq!(calls.get(), 3);
        match result {
            Err(WorkflowError::RestartsExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("select_application"));
            }
            other => panic!("expected RestartsExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_session_error_does_not_consume_restarts() {
        let calls = Cell::new(0u32);
        let result = run_with_attempts(3, |_| {
            calls.set(calls.get() + 1);
            async {
                Err(WorkflowError::Upload(UploadError::TokenMissing))
            }
        })
        .await;

        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(WorkflowError::Upload(_))));
    }
}
