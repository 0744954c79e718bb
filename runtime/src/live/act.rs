//! Page actions on a live context: waits, clicks and overlay dismissal.
//!
//! Everything here goes through [`RenderContext::execute_js`], so it works
//! with any renderer. Selectors are passed to the page as JSON string
//! literals.

use crate::renderer::{into_scrape_error, RenderContext};
use pitchscrape::{ScrapeError, ScrapeResult};
use rand::Rng;
use std::time::{Duration, Instant};

/// How often `wait_for_selector` re-checks the page.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn js_str(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Number of elements matching `selector`.
pub async fn count(ctx: &dyn RenderContext, selector: &str) -> ScrapeResult<usize> {
    let script = format!("document.querySelectorAll({}).length", js_str(selector));
    let value = ctx.execute_js(&script).await.map_err(into_scrape_error)?;
    Ok(value.as_u64().unwrap_or(0) as usize)
}

/// Wait until `selector` matches something.
///
/// Exceeding `timeout` is a [`ScrapeError::Timeout`], which the retry layer
/// treats as transient.
pub async fn wait_for_selector(
    ctx: &dyn RenderContext,
    selector: &str,
    timeout: Duration,
) -> ScrapeResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if count(ctx, selector).await? > 0 {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ScrapeError::Timeout {
                what: format!("selector {selector}"),
                after_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Like [`wait_for_selector`], but a timeout is reported as `false`.
pub async fn wait_for_optional(
    ctx: &dyn RenderContext,
    selector: &str,
    timeout: Duration,
) -> ScrapeResult<bool> {
    match wait_for_selector(ctx, selector, timeout).await {
        Ok(()) => Ok(true),
        Err(ScrapeError::Timeout { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Click the first element matching `selector`. Returns whether one was found.
pub async fn click(ctx: &dyn RenderContext, selector: &str) -> ScrapeResult<bool> {
    let script = format!(
        "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
        js_str(selector)
    );
    let value = ctx.execute_js(&script).await.map_err(into_scrape_error)?;
    Ok(value.as_bool().unwrap_or(false))
}

/// Click the first element matching `selector` whose trimmed text equals
/// `text`, ignoring case.
pub async fn click_by_text(
    ctx: &dyn RenderContext,
    selector: &str,
    text: &str,
) -> ScrapeResult<bool> {
    let script = format!(
        "(() => {{ const want = {}.toUpperCase(); \
         const el = Array.from(document.querySelectorAll({})) \
           .find(e => (e.innerText || e.textContent || '').trim().toUpperCase() === want); \
         if (!el) return false; el.click(); return true; }})()",
        js_str(text),
        js_str(selector)
    );
    let value = ctx.execute_js(&script).await.map_err(into_scrape_error)?;
    Ok(value.as_bool().unwrap_or(false))
}

/// Click the first element matching `selector` whose text contains any of
/// `needles`, ignoring case.
pub async fn click_containing(
    ctx: &dyn RenderContext,
    selector: &str,
    needles: &[&str],
) -> ScrapeResult<bool> {
    let needles: Vec<String> = needles.iter().map(|n| n.to_uppercase()).collect();
    let needles = serde_json::to_string(&needles)?;
    let script = format!(
        "(() => {{ const needles = {needles}; \
         const el = Array.from(document.querySelectorAll({})) \
           .find(e => {{ const t = (e.innerText || '').toUpperCase(); return needles.some(n => t.includes(n)); }}); \
         if (!el) return false; el.click(); return true; }})()",
        js_str(selector)
    );
    let value = ctx.execute_js(&script).await.map_err(into_scrape_error)?;
    Ok(value.as_bool().unwrap_or(false))
}

/// Best-effort dismissal of consent banners and dialogs.
///
/// Returns how many of `selectors` were clicked. Failures are swallowed.
pub async fn dismiss_overlays(ctx: &dyn RenderContext, selectors: &[&str]) -> usize {
    let mut clicked = 0;
    for selector in selectors {
        match click(ctx, selector).await {
            Ok(true) => clicked += 1,
            Ok(false) => {}
            Err(e) => tracing::debug!(selector, "overlay dismissal failed: {e}"),
        }
    }
    clicked
}

/// Sleep for a random duration in `[min, max]`.
pub async fn settle(min: Duration, max: Duration) {
    tokio::time::sleep(random_delay(min, max)).await;
}

/// Uniform random duration in `[min, max]`; `min` when the range is empty.
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::NavigationResult;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers `querySelectorAll(..).length` with a count that starts
    /// matching after `appear_after` polls; records every script.
    struct ScriptedContext {
        polls: AtomicUsize,
        appear_after: usize,
        scripts: Mutex<Vec<String>>,
    }

    impl ScriptedContext {
        fn new(appear_after: usize) -> Self {
            Self {
                polls: AtomicUsize::new(0),
                appear_after,
                scripts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RenderContext for ScriptedContext {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 0,
            })
        }
        async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
            self.scripts.lock().unwrap().push(script.to_string());
            if script.contains(".length") {
                let n = self.polls.fetch_add(1, Ordering::SeqCst);
                let found = if n >= self.appear_after { 1 } else { 0 };
                return Ok(serde_json::json!(found));
            }
            Ok(serde_json::json!(script.contains("onetrust")))
        }
        async fn get_html(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn get_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_wait_for_selector_polls_until_present() {
        let ctx = ScriptedContext::new(2);
        wait_for_selector(&ctx, ".row", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(ctx.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_for_selector_times_out() {
        let ctx = ScriptedContext::new(usize::MAX);
        let err = wait_for_selector(&ctx, ".row", Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(!wait_for_optional(&ctx, ".row", Duration::from_millis(50))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_selectors_are_quoted() {
        let ctx = ScriptedContext::new(0);
        click(&ctx, "div[data-testid='x\"y']").await.unwrap();
        let scripts = ctx.scripts.lock().unwrap();
        assert!(scripts[0].contains(r#""div[data-testid='x\"y']""#));
    }

    #[tokio::test]
    async fn test_dismiss_overlays_counts_clicks() {
        let ctx = ScriptedContext::new(0);
        let clicked = dismiss_overlays(
            &ctx,
            &["#onetrust-accept-btn-handler", "[data-testid='wcl-dialogCloseButton']"],
        )
        .await;
        assert_eq!(clicked, 1);
    }

    #[test]
    fn test_random_delay_in_range() {
        let min = Duration::from_millis(10);
        let max = Duration::from_millis(20);
        for _ in 0..50 {
            let d = random_delay(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(random_delay(max, min), max);
    }
}
