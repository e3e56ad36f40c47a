use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::app::{MurmurError, Result};
use crate::browser::{BrowserConfig, BrowserSession, SessionManager};
use crate::fetcher::Cursor;

/// Chrome-backed session manager using chromiumoxide.
///
/// The browser process is launched on first use and shared by every session
/// handed out afterwards.
pub struct ChromeSessionManager {
    config: BrowserConfig,
    browser: OnceCell<Arc<Browser>>,
}

impl ChromeSessionManager {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: OnceCell::new(),
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>> {
        let browser = self
            .browser
            .get_or_try_init(|| Self::launch(&self.config))
            .await?;
        Ok(browser.clone())
    }

    async fn launch(config: &BrowserConfig) -> Result<Arc<Browser>> {
        let mut builder = ChromeConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .request_timeout(config.timeout());

        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder
            .build()
            .map_err(|e| MurmurError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            MurmurError::Browser(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        info!("Launched headless browser");
        Ok(Arc::new(browser))
    }
}

#[async_trait]
impl SessionManager for ChromeSessionManager {
    async fn acquire(&self) -> Result<Box<dyn BrowserSession>> {
        let browser = self.browser().await?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| MurmurError::Browser(format!("Failed to create page: {}", e)))?;

        if let Some(ref ua) = self.config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| MurmurError::Browser(format!("Failed to set user agent: {}", e)))?;
        }

        Ok(Box::new(ChromeSession {
            page,
            config: self.config.clone(),
            clicks: 0,
        }))
    }
}

struct ChromeSession {
    page: Page,
    config: BrowserConfig,
    clicks: u32,
}

impl ChromeSession {
    async fn eval_bool(&self, script: String) -> Result<bool> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| MurmurError::Browser(format!("Script execution failed: {}", e)))?
            .into_value::<bool>()
            .map_err(|e| MurmurError::Browser(format!("Failed to parse result: {:?}", e)))
    }

    async fn accept_consent(&self) -> Result<()> {
        if self.config.consent_selectors.is_empty() {
            return Ok(());
        }
        if self.eval_bool(consent_script(&self.config.consent_selectors)).await? {
            debug!("Accepted cookie consent dialog");
            tokio::time::sleep(self.config.scroll_pause()).await;
        }
        Ok(())
    }

    async fn scroll(&self) -> Result<()> {
        let script = format!(
            "(() => {{ window.scrollBy(0, {}); return true; }})()",
            self.config.scroll_distance_px
        );
        for _ in 0..self.config.scroll_steps {
            self.eval_bool(script.clone()).await?;
            tokio::time::sleep(self.config.scroll_pause()).await;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn render(&mut self, url: &str) -> Result<String> {
        let navigation = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| MurmurError::Browser(format!("Navigation failed: {}", e)))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| MurmurError::Browser(format!("Navigation failed: {}", e)))?;
            Ok::<_, MurmurError>(())
        };

        tokio::time::timeout(self.config.timeout(), navigation)
            .await
            .map_err(|_| MurmurError::Browser(format!("Timed out loading {}", url)))??;

        tokio::time::sleep(self.config.wait_after_load()).await;

        self.accept_consent().await?;
        self.scroll().await?;
        self.clicks = 0;

        self.content().await
    }

    async fn click_load_more(&mut self) -> Result<Option<Cursor>> {
        if self.config.load_more_labels.is_empty() {
            return Ok(None);
        }

        let clicked = self
            .eval_bool(load_more_script(&self.config.load_more_labels))
            .await?;
        if !clicked {
            return Ok(None);
        }

        self.clicks += 1;
        tokio::time::sleep(self.config.load_more_wait()).await;
        Ok(Some(Cursor::LoadMore(self.clicks)))
    }

    async fn content(&mut self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| MurmurError::Browser(format!("Failed to read page content: {}", e)))
    }

    async fn release(self: Box<Self>) -> Result<()> {
        self.page
            .close()
            .await
            .map_err(|e| MurmurError::Browser(format!("Failed to close page: {}", e)))
    }
}

fn js_string_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// JavaScript that presses the first consent button found
pub(crate) fn consent_script(selectors: &[String]) -> String {
    let selectors = js_string_array(selectors);
    format!(
        r#"
        (() => {{
            const selectors = {selectors};
            for (const selector of selectors) {{
                const button = document.querySelector(selector);
                if (button) {{
                    button.click();
                    return true;
                }}
            }}
            return false;
        }})()
        "#
    )
}

/// JavaScript that presses the first visible "load more" control
pub(crate) fn load_more_script(labels: &[String]) -> String {
    let labels = js_string_array(
        &labels
            .iter()
            .map(|l| l.to_lowercase())
            .collect::<Vec<_>>(),
    );
    format!(
        r#"
        (() => {{
            const labels = {labels};
            const candidates = document.querySelectorAll('a, button, span, div[role="button"]');
            for (const el of candidates) {{
                const text = (el.innerText || '').trim().toLowerCase();
                if (!text || text.length > 80) continue;
                if (!labels.some(label => text.includes(label))) continue;
                if (el.offsetParent === null) continue;
                el.click();
                return true;
            }}
            return false;
        }})()
        "#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_more_script_embeds_lowercased_labels() {
        let script = load_more_script(&["View More Comments".to_string()]);
        assert!(script.contains(r#"["view more comments"]"#));
        assert!(script.contains("el.click()"));
    }

    #[test]
    fn test_consent_script_escapes_selectors() {
        let script = consent_script(&["button[title=\"Accept all\"]".to_string()]);
        assert!(script.contains(r#"["button[title=\"Accept all\"]"]"#));
    }

    #[test]
    fn test_manager_does_not_launch_eagerly() {
        let manager = ChromeSessionManager::new(BrowserConfig::default());
        assert!(manager.browser.get().is_none());
    }
}
