//! Headless Chrome renderer. The browser API is synchronous, so rendering
//! runs on the blocking pool; cancellation races the blocking task.

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptionsBuilder};
use tracing::{info, warn};

use siphon_core::ExtractError;

use crate::{RenderOptions, Renderer, Rendering, WaitUntil};

pub struct ChromeRenderer {
    /// DevTools websocket for a remote browser; absent means local launch.
    remote_endpoint: Option<String>,
    default_timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(remote_endpoint: Option<String>, default_timeout: Duration) -> Self {
        Self { remote_endpoint, default_timeout }
    }

    fn connect(&self) -> Result<Browser, ExtractError> {
        if let Some(ws) = &self.remote_endpoint {
            return Browser::connect(ws.clone())
                .map_err(|e| ExtractError::Network(format!("browser connect: {}", e)));
        }

        let mut extra_args: Vec<OsString> = vec![
            OsString::from("--no-sandbox"),
            OsString::from("--disable-dev-shm-usage"),
            OsString::from("--disable-gpu"),
        ];
        if let Ok(proxy) = std::env::var("BROWSER_PROXY") {
            extra_args.push(OsString::from(format!("--proxy-server={}", proxy)));
        }

        let mut builder = LaunchOptionsBuilder::default();
        builder
            .headless(true)
            .window_size(Some((1920, 1080)))
            .args(extra_args.iter().map(|a| a.as_ref()).collect());
        if let Ok(chrome_path) = std::env::var("CHROME_PATH") {
            builder.path(Some(std::path::PathBuf::from(chrome_path)));
        }
        let launch_options = builder
            .build()
            .map_err(|e| ExtractError::Config(format!("browser launch options: {}", e)))?;
        Browser::new(launch_options)
            .map_err(|e| ExtractError::Network(format!("browser launch: {}", e)))
    }

    fn render_blocking(
        browser: &Browser,
        url: &str,
        wait_for: WaitUntil,
        timeout: Duration,
    ) -> Result<Rendering, ExtractError> {
        let tab = browser
            .new_tab()
            .map_err(|e| ExtractError::Network(format!("new tab: {}", e)))?;
        tab.set_default_timeout(timeout);

        tab.navigate_to(url)
            .map_err(|e| ExtractError::Network(format!("navigate: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| ExtractError::Network(format!("navigation wait: {}", e)))?;

        // `load` fires with wait_until_navigated; the stricter modes poll
        // for the document to settle.
        if wait_for != WaitUntil::Load {
            let settle = match wait_for {
                WaitUntil::Networkidle => Duration::from_millis(1500),
                _ => Duration::from_millis(300),
            };
            std::thread::sleep(settle);
        }

        let html = tab
            .get_content()
            .map_err(|e| ExtractError::Parse(format!("page content: {}", e)))?;
        let final_url = tab.get_url();
        let _ = tab.close(true);

        Ok(Rendering { html, final_url, network: Vec::new(), console: Vec::new() })
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    fn available(&self) -> bool {
        if self.remote_endpoint.is_some() {
            return true;
        }
        // A local launch needs a binary on this machine.
        std::env::var("CHROME_PATH").is_ok()
            || which_chrome().is_some()
    }

    async fn render(&self, url: &str, opts: &RenderOptions) -> Result<Rendering, ExtractError> {
        let timeout = if opts.timeout_ms > 0 {
            Duration::from_millis(opts.timeout_ms)
        } else {
            self.default_timeout
        };
        info!(url, ?opts.wait_for, "rendering via headless browser");

        let browser = self.connect()?;
        let url = url.to_string();
        let wait_for = opts.wait_for;
        let browser = Arc::new(browser);
        let task_browser = Arc::clone(&browser);
        let task = tokio::task::spawn_blocking(move || {
            Self::render_blocking(&task_browser, &url, wait_for, timeout)
        });

        let rendered = match &opts.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(ExtractError::Cancelled),
                    joined = task => joined,
                }
            }
            None => task.await,
        };
        match rendered {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "render task panicked");
                Err(ExtractError::Network("renderer crashed".into()))
            }
        }
    }
}

fn which_chrome() -> Option<std::path::PathBuf> {
    const CANDIDATES: &[&str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ];
    CANDIDATES
        .iter()
        .map(std::path::PathBuf::from)
        .find(|p| p.exists())
}

/// Stand-in renderer for configurations without a browser: never available.
pub struct NullRenderer;

#[async_trait]
impl Renderer for NullRenderer {
    fn available(&self) -> bool {
        false
    }

    async fn render(&self, _url: &str, _opts: &RenderOptions) -> Result<Rendering, ExtractError> {
        Err(ExtractError::Config("no renderer configured".into()))
    }
}
