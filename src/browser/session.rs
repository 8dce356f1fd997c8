//! Browser session management
//!
//! Handles launching and controlling the single Chrome instance that drives
//! the analytics console. Downloads are routed to the configured data
//! directory via CDP.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::BrowserError;

/// Find Chrome/Chromium executable on the system
pub fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// A DOM lookup: a CSS selector, optionally narrowed to elements whose
/// innerText contains a given substring (querySelector has no text axis,
/// so text-filtered lookups run through injected JS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Selector {
    /// Plain CSS selector
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    /// CSS selector narrowed by an innerText substring
    pub fn with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: Some(text.into()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} (text ~ {:?})", self.css, text),
            None => write!(f, "{}", self.css),
        }
    }
}

/// Encode a Rust string as a JS string literal
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Configuration for a browser session
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSessionConfig {
    /// Path to Chrome/Chromium executable
    pub chrome_path: Option<String>,
    /// Run in headless mode
    pub headless: bool,
    /// Directory where the console's CSV exports are saved
    pub download_dir: PathBuf,
    /// Per-step wait timeout in seconds
    pub step_timeout_secs: u64,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            download_dir: std::env::temp_dir().join("tealeaf-exporter"),
            step_timeout_secs: 30,
            window_width: 1200,
            window_height: 1040,
        }
    }
}

impl BrowserSessionConfig {
    /// Create config with the given download directory
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ..Default::default()
        }
    }

    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set Chrome path
    pub fn chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Set per-step timeout
    pub fn step_timeout(mut self, timeout_secs: u64) -> Self {
        self.step_timeout_secs = timeout_secs;
        self
    }
}

/// A browser session driving the analytics console
pub struct BrowserSession {
    /// The browser instance (taken on close)
    browser: Option<Browser>,
    /// The single page the workflow runs on
    page: Page,
    /// CDP event handler task
    handler_task: tokio::task::JoinHandle<()>,
    /// Whether the browser process is still connected
    alive: Arc<AtomicBool>,
    /// Session configuration
    config: BrowserSessionConfig,
}

impl BrowserSession {
    /// Launch Chrome and prepare the working page.
    ///
    /// Image loading is disabled and downloads are redirected to the
    /// configured directory, matching how the console export is collected.
    pub async fn new(config: BrowserSessionConfig) -> Result<Self, BrowserError> {
        info!("Launching browser (headless: {})", config.headless);

        if config.chrome_path.is_none() && find_chrome().is_none() {
            return Err(BrowserError::LaunchFailed(
                "Chrome/Chromium not found; install it or set the chrome path".to_string(),
            ));
        }

        let mut builder = BrowserConfig::builder();

        if config.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        } else if let Some(chrome_path) = find_chrome() {
            info!("Auto-detected Chrome at: {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        }

        builder = builder
            // Required when running as root (e.g., in Docker or on a VPS)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            // The console renders fine without images and loads much faster
            .arg("--blink-settings=imagesEnabled=false")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .window_size(config.window_width, config.window_height);

        let browser_config = builder
            .build()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // When the handler stream ends, Chrome has disconnected or crashed
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {:?}", e);
                }
            }
            warn!("Chrome disconnected (event handler ended)");
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        // Adopt the initial blank tab, closing any extras
        let page = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let main_page = if !pages.is_empty() {
                pages.remove(0)
            } else {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            };

            for extra_page in pages {
                debug!("Closing extra blank tab");
                let _ = extra_page.close().await;
            }

            main_page
        };

        // Route downloads into the data directory
        std::fs::create_dir_all(&config.download_dir)?;
        let download_params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(config.download_dir.to_string_lossy().to_string())
            .build()
            .map_err(BrowserError::LaunchFailed)?;
        page.execute(download_params)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        info!(
            "Browser session ready (downloads -> {})",
            config.download_dir.display()
        );

        Ok(Self {
            browser: Some(browser),
            page,
            handler_task,
            alive,
            config,
        })
    }

    /// Check if the browser process is still connected
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Per-step wait timeout
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.config.step_timeout_secs)
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!("Navigating to: {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    /// Execute JavaScript on the page, with a 30 second guard against a hung
    /// renderer. The script must evaluate to a JSON value.
    pub async fn execute_js(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let result = tokio::time::timeout(Duration::from_secs(30), self.page.evaluate(script))
            .await
            .map_err(|_| BrowserError::Timeout("JavaScript execution timed out".to_string()))?
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Probe the state of a selector: missing, hidden, or clickable.
    async fn probe(&self, selector: &Selector) -> Result<String, BrowserError> {
        let script = format!(
            r#"
            (function() {{
                const els = document.querySelectorAll({css});
                const text = {text};
                for (const el of els) {{
                    if (text !== null && !(el.innerText || '').includes(text)) continue;
                    const style = window.getComputedStyle(el);
                    const visible = el.offsetParent !== null
                        && style.visibility !== 'hidden'
                        && style.display !== 'none';
                    if (visible && !el.disabled) return 'clickable';
                    return 'hidden';
                }}
                return 'missing';
            }})()
            "#,
            css = js_string(&selector.css),
            text = selector
                .text
                .as_deref()
                .map(js_string)
                .unwrap_or_else(|| "null".to_string()),
        );

        match self.execute_js(&script).await? {
            serde_json::Value::String(state) => Ok(state),
            other => Err(BrowserError::JavaScriptError(format!(
                "unexpected probe result: {}",
                other
            ))),
        }
    }

    /// Wait until the element is present, visible and enabled.
    pub async fn wait_for_clickable(&self, selector: &Selector) -> Result<(), BrowserError> {
        self.wait_for(selector, true, self.step_timeout()).await
    }

    /// Wait until the element exists in the DOM (visibility not required).
    pub async fn wait_for_present(&self, selector: &Selector) -> Result<(), BrowserError> {
        self.wait_for(selector, false, self.step_timeout()).await
    }

    async fn wait_for(
        &self,
        selector: &Selector,
        require_clickable: bool,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive() {
                return Err(BrowserError::ConnectionLost(
                    "browser exited while waiting".to_string(),
                ));
            }

            let state = self.probe(selector).await?;
            let satisfied = if require_clickable {
                state == "clickable"
            } else {
                state != "missing"
            };
            if satisfied {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "waited {}s for {} ({})",
                    timeout.as_secs(),
                    selector,
                    state
                )));
            }

            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Click an element.
    ///
    /// Pure-CSS selectors get a native CDP click with a hit-test first: if
    /// another element sits on top of the click point the step fails with
    /// `ClickIntercepted` so the caller can retry. Text-filtered selectors
    /// are clicked in JS since the matched node has no stable CSS handle.
    pub async fn click(&self, selector: &Selector) -> Result<(), BrowserError> {
        if selector.text.is_some() {
            return self.click_via_js(selector).await;
        }

        let element = self
            .page
            .find_element(selector.css.as_str())
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", selector, e)))?;

        let _ = element.scroll_into_view().await;

        let hit = format!(
            r#"
            (function() {{
                const el = document.querySelector({css});
                if (!el) return 'missing';
                const r = el.getBoundingClientRect();
                const at = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
                if (!at) return 'intercepted';
                return (el === at || el.contains(at) || at.contains(el)) ? 'ok' : 'intercepted';
            }})()
            "#,
            css = js_string(&selector.css),
        );

        match self.execute_js(&hit).await?.as_str() {
            Some("ok") => {}
            Some("missing") => {
                return Err(BrowserError::ElementNotFound(selector.to_string()));
            }
            _ => {
                return Err(BrowserError::ClickIntercepted(selector.to_string()));
            }
        }

        element
            .click()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(())
    }

    /// Click the first element matching a text-filtered selector via JS
    async fn click_via_js(&self, selector: &Selector) -> Result<(), BrowserError> {
        let script = format!(
            r#"
            (function() {{
                const els = document.querySelectorAll({css});
                const text = {text};
                for (const el of els) {{
                    if (text !== null && !(el.innerText || '').includes(text)) continue;
                    el.scrollIntoView({{block: 'center'}});
                    el.click();
                    return 'clicked';
                }}
                return 'missing';
            }})()
            "#,
            css = js_string(&selector.css),
            text = selector
                .text
                .as_deref()
                .map(js_string)
                .unwrap_or_else(|| "null".to_string()),
        );

        match self.execute_js(&script).await?.as_str() {
            Some("clicked") => Ok(()),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    /// Type text into an input field (clicks it first to focus)
    pub async fn type_text(&self, selector: &Selector, text: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector.css.as_str())
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", selector, e)))?;

        element
            .click()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?
            .type_str(text)
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(())
    }

    /// Close the browser session: graceful close, short grace period, then
    /// force kill so no Chrome processes are left behind.
    pub async fn close(mut self) -> Result<(), BrowserError> {
        self.alive.store(false, Ordering::Relaxed);

        if let Some(mut browser) = self.browser.take() {
            let _ = browser.close().await;
            tokio::time::sleep(Duration::from_millis(500)).await;
            let _ = browser.kill().await;
        }

        self.handler_task.abort();

        info!("Browser session closed");
        Ok(())
    }
}
