//! Minimal W3C WebDriver client.
//!
//! Talks to a running driver (chromedriver, geckodriver) over its HTTP
//! endpoint. Only the commands needed to open a page, locate a control and
//! click it are implemented.

use std::fmt;

use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

/// Key of the element reference in W3C responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Element location strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
    LinkText(String),
    PartialLinkText(String),
}

impl Locator {
    /// W3C `using` value.
    pub fn using(&self) -> &'static str {
        match self {
            Self::Css(_) => "css selector",
            Self::XPath(_) => "xpath",
            Self::LinkText(_) => "link text",
            Self::PartialLinkText(_) => "partial link text",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Css(v) | Self::XPath(v) | Self::LinkText(v) | Self::PartialLinkText(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.using(), self.value())
    }
}

#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("WebDriver error (status={status}, error={error}): {message}")]
    Command {
        status: u16,
        error: String,
        message: String,
    },
    #[error("Parse error: {0}")]
    Parse(String),
}

impl WebDriverError {
    fn code(&self) -> Option<&str> {
        match self {
            Self::Command { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }

    /// The browser session is gone (closed window, crashed browser, driver restart).
    pub fn is_invalid_session(&self) -> bool {
        matches!(self.code(), Some("invalid session id" | "no such window"))
    }

    pub fn is_no_such_element(&self) -> bool {
        self.code() == Some("no such element")
    }

    /// The element was found but cannot be acted upon right now.
    pub fn is_element_state(&self) -> bool {
        matches!(
            self.code(),
            Some(
                "stale element reference"
                    | "element not interactable"
                    | "element click intercepted"
            )
        )
    }
}

/// Browser capabilities requested when creating a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub browser_name: String,
    pub headless: bool,
    /// Persistent user-data-dir so a manual login survives restarts.
    pub profile_dir: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            browser_name: "chrome".to_string(),
            headless: false,
            profile_dir: None,
        }
    }
}

impl SessionOptions {
    fn capabilities(&self) -> Value {
        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-first-run".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(dir) = &self.profile_dir {
            args.push(format!("--user-data-dir={}", dir));
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": self.browser_name,
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct ErrorValue {
    error: String,
    #[serde(default)]
    message: String,
}

/// WebDriver endpoint client. Stateless: every command takes the session id.
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    client: Client,
    base_url: String,
}

impl WebDriverClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new browser session and return its id.
    #[instrument(skip(self))]
    pub async fn new_session(&self, options: &SessionOptions) -> Result<String, WebDriverError> {
        let value = self
            .command(Method::POST, "session", Some(options.capabilities()))
            .await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Parse("missing sessionId".to_string()))?;
        debug!(session_id = id, "WebDriver session created");
        Ok(id.to_string())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), WebDriverError> {
        self.command(Method::DELETE, &format!("session/{}", session_id), None)
            .await
            .map(|_| ())
    }

    pub async fn navigate(&self, session_id: &str, url: &str) -> Result<(), WebDriverError> {
        self.command(
            Method::POST,
            &format!("session/{}/url", session_id),
            Some(json!({ "url": url })),
        )
        .await
        .map(|_| ())
    }

    pub async fn current_url(&self, session_id: &str) -> Result<String, WebDriverError> {
        let value = self
            .command(Method::GET, &format!("session/{}/url", session_id), None)
            .await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| WebDriverError::Parse("current url is not a string".to_string()))
    }

    /// Locate one element. `Ok(None)` when nothing matches.
    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn find_element(
        &self,
        session_id: &str,
        locator: &Locator,
    ) -> Result<Option<String>, WebDriverError> {
        let result = self
            .command(
                Method::POST,
                &format!("session/{}/element", session_id),
                Some(json!({ "using": locator.using(), "value": locator.value() })),
            )
            .await;

        match result {
            Ok(value) => value
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| Some(id.to_string()))
                .ok_or_else(|| WebDriverError::Parse("missing element reference".to_string())),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn click(&self, session_id: &str, element_id: &str) -> Result<(), WebDriverError> {
        self.command(
            Method::POST,
            &format!("session/{}/element/{}/click", session_id, element_id),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    /// Send a raw command and return the unwrapped `value`.
    pub async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|e| WebDriverError::Parse(format!("{}: {}", e, text)))?;

        if !status.is_success() {
            let err: ErrorValue = serde_json::from_value(envelope.value)
                .map_err(|e| WebDriverError::Parse(e.to_string()))?;
            return Err(WebDriverError::Command {
                status: status.as_u16(),
                error: err.error,
                message: err.message,
            });
        }

        Ok(envelope.value)
    }
}
