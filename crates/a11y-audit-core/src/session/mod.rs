use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{CheckError, Operation};
use crate::target::ScanTarget;

pub mod webdriver;

/// Keys a check can press on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Tab,
    Enter,
    Escape,
    Space,
    ArrowDown,
    ArrowUp,
}

impl Key {
    /// Code point the WebDriver actions API uses for this key.
    pub fn webdriver_code(self) -> &'static str {
        match self {
            Key::Tab => "\u{E004}",
            Key::Enter => "\u{E007}",
            Key::Escape => "\u{E00C}",
            Key::Space => "\u{E00D}",
            Key::ArrowUp => "\u{E013}",
            Key::ArrowDown => "\u{E015}",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Key::Tab => "Tab",
            Key::Enter => "Enter",
            Key::Escape => "Escape",
            Key::Space => "Space",
            Key::ArrowDown => "ArrowDown",
            Key::ArrowUp => "ArrowUp",
        })
    }
}

/// How an element is located in the live document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementQuery {
    Css(String),
    #[serde(rename = "xpath")]
    XPath(String),
    /// Element whose own text contains the needle, compared case-insensitively.
    Text(String),
}

impl fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementQuery::Css(css) => write!(f, "css={css}"),
            ElementQuery::XPath(xpath) => write!(f, "xpath={xpath}"),
            ElementQuery::Text(text) => write!(f, "text={text}"),
        }
    }
}

/// Condition an element wait resolves on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Attached,
    Visible,
}

/// Opaque reference to an element inside one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// Driver-level failures, before they are attributed to a check step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("webdriver request failed: {0}")]
    Transport(String),
    #[error("webdriver error `{code}`: {message}")]
    Protocol { code: String, message: String },
    #[error("timed out after {}", format_wait(.0))]
    Timeout(Duration),
    #[error("unexpected webdriver response: {0}")]
    Malformed(String),
    #[error("session already closed")]
    Closed,
}

impl SessionError {
    /// Whether the driver gave up on a bounded wait.
    pub fn is_timeout(&self) -> bool {
        match self {
            SessionError::Timeout(_) => true,
            SessionError::Protocol { code, .. } => code == "timeout" || code == "script timeout",
            _ => false,
        }
    }

    pub fn is_no_such_element(&self) -> bool {
        matches!(self, SessionError::Protocol { code, .. } if code == "no such element")
    }
}

fn format_wait(wait: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*wait)
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SessionError::Transport(format!("request timed out: {err}"));
        }
        SessionError::Transport(err.to_string())
    }
}

/// A live, isolated browsing context bound to one document.
#[async_trait]
pub trait Session: Send {
    /// Identifier assigned by the browser driver.
    fn id(&self) -> &str;

    async fn goto(&mut self, url: &str) -> Result<(), SessionError>;

    async fn current_url(&mut self) -> Result<String, SessionError>;

    /// Press (without releasing) a key on the focused document.
    async fn key_down(&mut self, key: Key) -> Result<(), SessionError>;

    /// Poll until an element matching `query` reaches `state`.
    async fn wait_for_element(
        &mut self,
        query: &ElementQuery,
        state: WaitState,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError>;

    async fn is_visible(&mut self, element: &ElementHandle) -> Result<bool, SessionError>;

    /// Run an asynchronous script; the last argument passed to the script is the completion callback.
    async fn execute_async(&mut self, script: &str, args: Vec<Value>) -> Result<Value, SessionError>;

    /// Release the browser. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Launches fresh browser sessions. One call, one browser.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Session>, SessionError>;
}

/// Opens sessions navigated to a scan target and guarantees their release.
#[derive(Clone)]
pub struct SessionProvider {
    factory: Arc<dyn SessionFactory>,
    navigation_timeout: Duration,
}

impl SessionProvider {
    pub fn new(factory: Arc<dyn SessionFactory>, navigation_timeout: Duration) -> Self {
        Self {
            factory,
            navigation_timeout,
        }
    }

    /// Launch a browser and navigate it to `target`.
    ///
    /// A session whose navigation fails is closed before the error is returned.
    pub async fn open(&self, target: &ScanTarget) -> Result<Box<dyn Session>, CheckError> {
        let mut session = self
            .factory
            .launch()
            .await
            .map_err(|err| CheckError::Session(err.to_string()))?;
        debug!(session = session.id(), url = %target, "navigating");

        let navigation =
            tokio::time::timeout(self.navigation_timeout, session.goto(target.as_str())).await;
        let failure = match navigation {
            Ok(Ok(())) => return Ok(session),
            Ok(Err(err)) if err.is_timeout() => self.navigation_timeout_error(),
            Ok(Err(err)) => CheckError::Navigation {
                url: target.to_string(),
                reason: err.to_string(),
            },
            Err(_) => self.navigation_timeout_error(),
        };
        self.release(session).await;
        Err(failure)
    }

    /// Close a session, logging rather than propagating teardown failures.
    pub async fn release(&self, mut session: Box<dyn Session>) {
        let id = session.id().to_string();
        match session.close().await {
            Ok(()) => debug!(session = %id, "session released"),
            Err(err) => warn!(session = %id, error = %err, "failed to release browser session"),
        }
    }

    fn navigation_timeout_error(&self) -> CheckError {
        CheckError::Timeout {
            operation: Operation::Navigation,
            budget: self.navigation_timeout,
        }
    }
}
