//! Export workflow module
//!
//! The scripted click-through that logs into the console, configures the
//! saved search view and triggers the CSV export, plus the driver that runs
//! it with bounded retries.

mod runner;
mod steps;

pub use runner::{ExportRunner, WorkflowError};
pub use steps::{export_sequence, load_steps, resolve_steps, StepInput, StepSpec, StepVars};
