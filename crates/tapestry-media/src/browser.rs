//! Headless browser sessions used to resolve playable media URLs.
//!
//! A session navigates to a post page, waits for the video container to
//! render and reads the first `<source src>` under the `<video>` element.
//! The session's cookies are returned alongside so a plain HTTP client can
//! fetch the media with the same authentication.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Element that wraps the video player on a post page.
pub const VIDEO_CONTAINER_ID: &str = "main-content-video_detail";
/// Default wait for the container to render.
pub const DEFAULT_ELEMENT_WAIT_SECS: u64 = 20;

/// A browser cookie carried over to the HTTP download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

/// Media source resolved from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub page_url: String,
    pub src_url: String,
    pub cookies: Vec<SessionCookie>,
}

impl ResolvedMedia {
    /// Value for a `Cookie` request header, or `None` without cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// An open browser session. Not reentrant: one resolution at a time.
#[async_trait]
pub trait BrowserSession: Send {
    async fn resolve_media(&mut self, page_url: &str) -> MediaResult<ResolvedMedia>;

    /// End the session. Must be called on every exit path.
    async fn close(self: Box<Self>) -> MediaResult<()>;
}

/// Opens browser sessions on demand.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self) -> MediaResult<Box<dyn BrowserSession>>;
}

/// WebDriver connection settings.
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// chromedriver endpoint
    pub url: String,
    pub element_wait_secs: u64,
    pub headless: bool,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".to_string(),
            element_wait_secs: DEFAULT_ELEMENT_WAIT_SECS,
            headless: true,
        }
    }
}

impl WebDriverConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("WEBDRIVER_URL").unwrap_or(defaults.url),
            element_wait_secs: std::env::var("ACQUISITION_WAIT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.element_wait_secs),
            headless: std::env::var("WEBDRIVER_HEADLESS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.headless),
        }
    }

    fn capabilities(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut args = vec![
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--mute-audio",
            "--window-size=1280,1024",
        ];
        if self.headless {
            args.push("--headless=new");
        }
        let mut caps = serde_json::Map::new();
        caps.insert("browserName".to_string(), json!("chrome"));
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        caps
    }
}

/// Launches Chrome sessions through a WebDriver server.
#[derive(Debug, Clone, Default)]
pub struct WebDriverLauncher {
    config: WebDriverConfig,
}

impl WebDriverLauncher {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn open(&self) -> MediaResult<Box<dyn BrowserSession>> {
        let client = ClientBuilder::native()
            .capabilities(self.config.capabilities())
            .connect(&self.config.url)
            .await
            .map_err(|e| MediaError::browser_failed(format!("webdriver connect: {}", e)))?;

        info!(webdriver = %self.config.url, "Opened browser session");
        Ok(Box::new(WebDriverSession {
            client,
            wait: Duration::from_secs(self.config.element_wait_secs),
        }))
    }
}

struct WebDriverSession {
    client: Client,
    wait: Duration,
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn resolve_media(&mut self, page_url: &str) -> MediaResult<ResolvedMedia> {
        self.client
            .goto(page_url)
            .await
            .map_err(|e| MediaError::browser_failed(format!("navigate to {}: {}", page_url, e)))?;

        let container = self
            .client
            .wait()
            .at_most(self.wait)
            .for_element(Locator::Id(VIDEO_CONTAINER_ID))
            .await
            .map_err(|e| match e {
                CmdError::WaitTimeout => MediaError::ElementTimeout {
                    selector: format!("#{}", VIDEO_CONTAINER_ID),
                    secs: self.wait.as_secs(),
                },
                other => MediaError::browser_failed(other.to_string()),
            })?;

        let video = container
            .find(Locator::Css("video"))
            .await
            .map_err(|_| MediaError::MissingElement("video".to_string()))?;
        let source = video
            .find(Locator::Css("source"))
            .await
            .map_err(|_| MediaError::MissingElement("video source".to_string()))?;
        let src_url = source
            .attr("src")
            .await
            .map_err(|e| MediaError::browser_failed(e.to_string()))?
            .filter(|src| !src.is_empty())
            .ok_or_else(|| MediaError::MissingElement("video source src".to_string()))?;

        let cookies = self
            .client
            .get_all_cookies()
            .await
            .map_err(|e| MediaError::browser_failed(format!("read cookies: {}", e)))?
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name().to_string(),
                value: c.value().to_string(),
            })
            .collect::<Vec<_>>();

        debug!(page_url, cookies = cookies.len(), "Resolved media source");
        Ok(ResolvedMedia {
            page_url: page_url.to_string(),
            src_url,
            cookies,
        })
    }

    async fn close(self: Box<Self>) -> MediaResult<()> {
        if let Err(e) = self.client.clone().close().await {
            warn!("Failed to close browser session: {}", e);
            return Err(MediaError::browser_failed(e.to_string()));
        }
        debug!("Closed browser session");
        Ok(())
    }
}
