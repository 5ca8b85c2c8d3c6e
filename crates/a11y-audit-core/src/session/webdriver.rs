use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::{ElementHandle, ElementQuery, Key, Session, SessionError, SessionFactory, WaitState};

/// W3C identifier under which drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Slack on top of the longest driver-side timeout before the HTTP call itself gives up.
const REQUEST_GRACE: Duration = Duration::from_secs(15);

/// Browser the driver should launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
    Edge,
}

impl BrowserKind {
    fn capabilities(self, headless: bool, timeouts: Value) -> Value {
        let (name, options_key, headless_arg) = match self {
            BrowserKind::Chrome => ("chrome", "goog:chromeOptions", "--headless=new"),
            BrowserKind::Firefox => ("firefox", "moz:firefoxOptions", "-headless"),
            BrowserKind::Edge => ("MicrosoftEdge", "ms:edgeOptions", "--headless=new"),
        };
        let args: Vec<&str> = if headless { vec![headless_arg] } else { Vec::new() };
        let mut capabilities = json!({
            "browserName": name,
            "timeouts": timeouts,
        });
        capabilities[options_key] = json!({ "args": args });
        capabilities
    }
}

impl FromStr for BrowserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserKind::Chrome),
            "firefox" => Ok(BrowserKind::Firefox),
            "edge" | "msedge" => Ok(BrowserKind::Edge),
            other => Err(format!("unknown browser `{other}` (expected chrome, firefox or edge)")),
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Edge => "edge",
        })
    }
}

/// Connection settings for a W3C WebDriver endpoint.
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    pub endpoint: String,
    pub browser: BrowserKind,
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub script_timeout: Duration,
}

/// Launches one fresh browser per session through a WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverFactory {
    http: Client,
    endpoint: String,
    capabilities: Value,
}

impl WebDriverFactory {
    pub fn new(config: &WebDriverConfig) -> Result<Self> {
        let request_timeout =
            config.page_load_timeout.max(config.script_timeout) + REQUEST_GRACE;
        let http = Client::builder()
            .user_agent(concat!("a11y-audit/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .context("failed to build WebDriver HTTP client")?;
        let timeouts = json!({
            "pageLoad": millis(config.page_load_timeout),
            "script": millis(config.script_timeout),
        });
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            capabilities: config.browser.capabilities(config.headless, timeouts),
        })
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn launch(&self) -> Result<Box<dyn Session>, SessionError> {
        let url = format!("{}/session", self.endpoint);
        let body = json!({ "capabilities": { "alwaysMatch": self.capabilities } });
        let value = send(&self.http, Method::POST, &url, Some(body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Malformed("new session response has no sessionId".into()))?
            .to_string();
        debug!(session = %session_id, "browser session started");
        Ok(Box::new(WebDriverSession {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            session_id,
            closed: false,
        }))
    }
}

/// One browser instance driven over the WebDriver protocol.
pub struct WebDriverSession {
    http: Client,
    endpoint: String,
    session_id: String,
    closed: bool,
}

impl WebDriverSession {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let url = format!("{}/session/{}{}", self.endpoint, self.session_id, path);
        send(&self.http, method, &url, body).await
    }

    async fn find_element(&self, query: &ElementQuery) -> Result<ElementHandle, SessionError> {
        let (using, value) = locator(query);
        let found = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        found
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementHandle(id.to_string()))
            .ok_or_else(|| SessionError::Malformed("find element response has no element reference".into()))
    }
}

#[async_trait]
impl Session for WebDriverSession {
    fn id(&self) -> &str {
        &self.session_id
    }

    async fn goto(&mut self, url: &str) -> Result<(), SessionError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SessionError::Malformed("current URL is not a string".into()))
    }

    async fn key_down(&mut self, key: Key) -> Result<(), SessionError> {
        let actions = json!({
            "actions": [{
                "type": "key",
                "id": "keyboard",
                "actions": [{ "type": "keyDown", "value": key.webdriver_code() }],
            }]
        });
        trace!(%key, "key down");
        self.command(Method::POST, "/actions", Some(actions))
            .await
            .map(drop)
    }

    async fn wait_for_element(
        &mut self,
        query: &ElementQuery,
        state: WaitState,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find_element(query).await {
                Ok(handle) => {
                    if state == WaitState::Attached || self.is_visible(&handle).await? {
                        return Ok(handle);
                    }
                }
                Err(err) if err.is_no_such_element() => {}
                Err(err) => return Err(err),
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SessionError::Timeout(timeout));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> Result<bool, SessionError> {
        let path = format!("/element/{}/displayed", element.0);
        let value = self.command(Method::GET, &path, None).await?;
        value
            .as_bool()
            .ok_or_else(|| SessionError::Malformed("displayed response is not a boolean".into()))
    }

    async fn execute_async(&mut self, script: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        self.command(
            Method::POST,
            "/execute/async",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let url = format!("{}/session/{}", self.endpoint, self.session_id);
        send(&self.http, Method::DELETE, &url, None).await.map(drop)
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(session = %self.session_id, "browser session dropped without release");
        }
    }
}

async fn send(
    http: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, SessionError> {
    trace!(%method, url, "webdriver command");
    let mut request = http.request(method.clone(), url);
    if method == Method::POST {
        request = request.json(&body.unwrap_or_else(|| json!({})));
    }
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;
    parse_envelope(status.is_success(), &text)
}

/// Unwrap the `{"value": ...}` envelope every WebDriver response uses.
fn parse_envelope(success: bool, text: &str) -> Result<Value, SessionError> {
    let mut envelope: Value = serde_json::from_str(text)
        .map_err(|err| SessionError::Malformed(format!("invalid JSON ({err}): {}", truncate(text, 200))))?;
    let value = envelope
        .get_mut("value")
        .map(Value::take)
        .ok_or_else(|| SessionError::Malformed("response has no `value` member".into()))?;
    if let Some(code) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(SessionError::Protocol {
            code: code.to_string(),
            message: message.to_string(),
        });
    }
    if !success {
        return Err(SessionError::Malformed(format!(
            "request failed without an error object: {}",
            truncate(text, 200)
        )));
    }
    Ok(value)
}

fn locator(query: &ElementQuery) -> (&'static str, String) {
    match query {
        ElementQuery::Css(css) => ("css selector", css.clone()),
        ElementQuery::XPath(xpath) => ("xpath", xpath.clone()),
        ElementQuery::Text(needle) => ("xpath", text_xpath(needle)),
    }
}

/// XPath matching an element whose own text node contains `needle`, ignoring ASCII case.
fn text_xpath(needle: &str) -> String {
    format!(
        "//*[not(self::script) and not(self::style)][text()[contains(translate(normalize-space(.), \
         'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), {})]]",
        xpath_literal(&needle.trim().to_ascii_lowercase())
    )
}

fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "…"
}
