use crate::config::CrawlConfig;
use crate::error::RenderError;
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;
use url::Url;

/// How long to wait for the ready selector after navigation
const READY_WAIT: Duration = Duration::from_secs(10);

/// Returns the DOM of a page after its client-side scripts have run.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &Url) -> Result<String, RenderError>;

    /// Releases any resources held between renders
    async fn shutdown(&self) {}
}

/// Renders pages through a pool of WebDriver sessions.
///
/// Sessions are opened lazily, reused between pages, and discarded after any
/// failure so a broken browser never serves a second page.
pub struct WebDriverRenderer {
    webdriver_url: String,
    navigation_timeout: Duration,
    ready_selector: Option<String>,
    ready_wait: Duration,
    sessions: Mutex<Vec<Client>>,
    permits: Semaphore,
}

impl WebDriverRenderer {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            navigation_timeout: config.navigation_timeout(),
            ready_selector: config.ready_selector.clone(),
            ready_wait: READY_WAIT,
            sessions: Mutex::new(Vec::new()),
            permits: Semaphore::new(config.max_sessions.max(1)),
        }
    }

    async fn connect(&self) -> Result<Client, RenderError> {
        let mut capabilities = serde_json::Map::new();
        capabilities.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!({ "args": ["--headless=new", "--disable-gpu"] }),
        );

        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities);
        match builder.connect(&self.webdriver_url).await {
            Ok(client) => {
                ::log::debug!("Connected to WebDriver at {}", self.webdriver_url);
                Ok(client)
            }
            Err(e) => {
                ::log::error!(
                    "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
                );
                Err(RenderError::Connect {
                    endpoint: self.webdriver_url.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn snapshot(&self, client: &Client, url: &Url) -> Result<String, RenderError> {
        client
            .goto(url.as_str())
            .await
            .map_err(|e| navigation_error(url, e))?;

        if let Some(selector) = &self.ready_selector {
            if let Err(e) = client
                .wait()
                .at_most(self.ready_wait)
                .for_element(Locator::Css(selector.as_str()))
                .await
            {
                // Not fatal: snapshot whatever has rendered so far
                ::log::debug!("Ready selector {} not found on {}: {}", selector, url, e);
            }
        }

        client.source().await.map_err(|e| navigation_error(url, e))
    }

    async fn discard(&self, client: Client) {
        if let Err(e) = client.close().await {
            ::log::warn!("Failed to close WebDriver session: {}", e);
        }
    }
}

#[async_trait]
impl PageRenderer for WebDriverRenderer {
    async fn render(&self, url: &Url) -> Result<String, RenderError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| RenderError::Connect {
                endpoint: self.webdriver_url.clone(),
                message: e.to_string(),
            })?;

        let limit = self.navigation_timeout.saturating_add(self.ready_wait);

        let pooled = self.sessions.lock().await.pop();
        let client = match pooled {
            Some(client) => client,
            None => match timeout(limit, self.connect()).await {
                Ok(connected) => connected?,
                Err(_) => {
                    ::log::error!(
                        "WebDriver at {} did not create a session within {} seconds",
                        self.webdriver_url,
                        limit.as_secs()
                    );
                    return Err(RenderError::Timeout {
                        url: url.to_string(),
                        secs: limit.as_secs(),
                    });
                }
            },
        };

        let started = std::time::Instant::now();
        match timeout(limit, self.snapshot(&client, url)).await {
            Ok(Ok(html)) => {
                ::log::debug!(
                    "Rendered {} in {:.2} seconds",
                    url,
                    started.elapsed().as_secs_f64()
                );
                self.sessions.lock().await.push(client);
                Ok(html)
            }
            Ok(Err(e)) => {
                self.discard(client).await;
                Err(e)
            }
            Err(_) => {
                self.discard(client).await;
                Err(RenderError::Timeout {
                    url: url.to_string(),
                    secs: limit.as_secs(),
                })
            }
        }
    }

    async fn shutdown(&self) {
        let sessions: Vec<Client> = self.sessions.lock().await.drain(..).collect();
        ::log::debug!("Closing {} WebDriver sessions", sessions.len());
        for client in sessions {
            self.discard(client).await;
        }
    }
}

fn navigation_error(url: &Url, error: fantoccini::error::CmdError) -> RenderError {
    if error.to_string().contains("Unable to find session") {
        ::log::warn!("Lost WebDriver session while rendering {}", url);
    }
    RenderError::Navigation {
        url: url.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_unresponsive_webdriver_times_out() {
        // Accepts connections and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let renderer = WebDriverRenderer {
            webdriver_url: format!("http://{}", addr),
            navigation_timeout: Duration::ZERO,
            ready_selector: None,
            ready_wait: Duration::from_millis(200),
            sessions: Mutex::new(Vec::new()),
            permits: Semaphore::new(1),
        };
        let url = Url::parse("https://example.fandom.com/wiki/Demo_Game").unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), renderer.render(&url))
            .await
            .expect("render should give up on its own");
        assert!(matches!(result, Err(RenderError::Timeout { .. })));
        assert!(renderer.sessions.lock().await.is_empty());
    }
}
