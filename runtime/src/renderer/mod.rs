//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide), plus the
//! `Launcher` that creates renderers so a session can be replaced without
//! the caller knowing which engine is behind it.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use pitchscrape::ScrapeError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of contexts created through this renderer and not yet closed.
    fn active_contexts(&self) -> usize;
    /// Whether the connection to the browser process is still up.
    fn is_connected(&self) -> bool;
    /// Number of pages the browser currently has open.
    async fn open_pages(&self) -> Result<usize>;
    /// JS heap in use, when the engine exposes it.
    async fn memory_usage(&self) -> Result<Option<u64>>;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Creates fresh renderers.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Renderer>>;
}

/// Convert a renderer error into the pipeline taxonomy.
///
/// Errors that already carry a [`ScrapeError`] (timeouts, failed
/// navigations) keep it; anything else from the browser is a protocol error.
pub fn into_scrape_error(err: anyhow::Error) -> ScrapeError {
    match err.downcast::<ScrapeError>() {
        Ok(scrape) => scrape,
        Err(other) => ScrapeError::Protocol(format!("{other:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitchscrape::ErrorKind;

    #[test]
    fn test_into_scrape_error_keeps_timeout() {
        let err = anyhow::Error::new(ScrapeError::Timeout {
            what: "navigate".into(),
            after_ms: 100,
        });
        match into_scrape_error(err) {
            ScrapeError::Timeout { after_ms, .. } => assert_eq!(after_ms, 100),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_into_scrape_error_defaults_to_protocol() {
        let err = anyhow::anyhow!("websocket closed").context("evaluate failed");
        let converted = into_scrape_error(err);
        assert_eq!(converted.kind(), ErrorKind::Transient);
        assert!(converted.to_string().contains("websocket closed"));
    }
}
