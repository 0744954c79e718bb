//! Chromium-based renderer using chromiumoxide.

use super::{Launcher, NavigationResult, RenderContext, Renderer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use pitchscrape::ScrapeError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const HEAP_SCRIPT: &str =
    "(performance && performance.memory) ? performance.memory.usedJSHeapSize : null";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. PITCHSCRAPE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("PITCHSCRAPE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.pitchscrape/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".pitchscrape/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".pitchscrape/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".pitchscrape/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".pitchscrape/chromium/chrome-linux64/chrome"),
                home.join(".pitchscrape/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches Chromium processes.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    /// Explicit executable; discovered with [`find_chromium`] when unset.
    pub executable: Option<PathBuf>,
    pub headless: bool,
}

impl ChromiumLauncher {
    pub fn new(executable: Option<PathBuf>, headless: bool) -> Self {
        Self {
            executable,
            headless,
        }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        let path = match &self.executable {
            Some(path) => path.clone(),
            None => find_chromium().context(
                "Chromium not found. Install Chrome/Chromium or set PITCHSCRAPE_CHROMIUM_PATH.",
            )?,
        };
        let renderer = ChromiumRenderer::launch(path, self.headless).await?;
        Ok(Arc::new(renderer))
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    connected: Arc<AtomicBool>,
    active_count: Arc<AtomicUsize>,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance at `chrome_path`.
    pub async fn launch(chrome_path: PathBuf, headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
        if headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--window-size=1920,1080")
            .arg(format!("--user-agent={USER_AGENT}"))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&connected);
        // The handler stream ends when the websocket to the browser closes.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("browser handler: {e}");
                }
            }
            flag.store(false, Ordering::SeqCst);
            tracing::debug!("browser connection closed");
        });

        Ok(Self {
            browser: Mutex::new(browser),
            connected,
            active_count: Arc::new(AtomicUsize::new(0)),
            handler,
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        self.handler.abort();
        self.connected.store(false, Ordering::SeqCst);
        closed.context("failed to close browser")?;
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn open_pages(&self) -> Result<usize> {
        let pages = self
            .browser
            .lock()
            .await
            .pages()
            .await
            .context("failed to list pages")?;
        Ok(pages.len())
    }

    async fn memory_usage(&self) -> Result<Option<u64>> {
        let pages = self
            .browser
            .lock()
            .await
            .pages()
            .await
            .context("failed to list pages")?;
        let Some(page) = pages.first() else {
            return Ok(None);
        };
        let value: serde_json::Value = page
            .evaluate(HEAP_SCRIPT)
            .await
            .context("heap query failed")?
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert heap result: {e:?}"))?;
        Ok(value.as_u64().or_else(|| value.as_f64().map(|v| v as u64)))
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => Err(ScrapeError::Navigation(e.to_string()).into()),
            Err(_) => Err(ScrapeError::Timeout {
                what: "navigation".into(),
                after_ms: timeout_ms,
            }
            .into()),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::act;

    const ROWS_PAGE: &str = "data:text/html,<div class='row'>1</div><div class='row'>2</div>";

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_launch_probe_and_restart_signals() {
        let renderer = ChromiumLauncher::new(None, true)
            .launch()
            .await
            .expect("launch");
        assert!(renderer.is_connected());

        let mut page = renderer.new_context().await.expect("page");
        page.navigate(ROWS_PAGE, 10_000).await.expect("navigate");
        act::wait_for_selector(page.as_ref(), ".row", Duration::from_secs(5))
            .await
            .expect("rows");
        assert_eq!(act::count(page.as_ref(), ".row").await.expect("count"), 2);

        assert_eq!(renderer.active_contexts(), 1);
        assert!(renderer.open_pages().await.expect("open pages") >= 1);
        assert!(renderer.memory_usage().await.is_ok());

        page.close().await.expect("close page");
        assert_eq!(renderer.active_contexts(), 0);

        renderer.shutdown().await.expect("shutdown");
        assert!(!renderer.is_connected());
    }
}
