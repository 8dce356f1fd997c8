//! Browser automation module
//!
//! Handles launching and controlling the headless Chrome/Chromium instance
//! that drives the Tealeaf console.

mod errors;
mod session;

pub use errors::BrowserError;
pub use session::{find_chrome, BrowserSession, BrowserSessionConfig, Selector};
