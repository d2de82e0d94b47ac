//! Environment-driven configuration.
//!
//! Every setting comes from an environment variable (optionally loaded from a
//! `.env` file by `main`). Missing variables fall back to defaults; present but
//! malformed ones are a configuration error naming the variable.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_BROWSER_TARGET_URL: &str = "https://mail.google.com/mail/u/0/#settings/accounts";

/// "Check mail now" in the account languages we know about.
const CHECK_MAIL_LABELS: &[&str] = &[
    "Check mail now",
    "Consultar el correo ahora",
    "E-Mails jetzt abrufen",
    "Consulter les e-mails maintenant",
];

const FALLBACK_CHECK_MAIL_CSS: &str = "[role='link'][aria-label*='Check mail']";

/// How the poll action reaches Gmail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Gmail REST API with OAuth2 credentials.
    Api,
    /// A WebDriver-controlled browser clicking the UI control.
    Browser,
}

impl PollMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "browser" => Ok(Self::Browser),
            other => Err(format!("unknown mode '{}', expected api or browser", other)),
        }
    }
}

/// One configured action strategy, written as `kind:value`.
///
/// API kinds: `labels`, `query:<gmail search>`.
/// Browser kinds: `css:<selector>`, `xpath:<expr>`, `text:<link text>`,
/// `partial:<partial link text>`.
///
/// `ACTION_STRATEGIES` separates descriptors with `|`, so a descriptor cannot
/// contain one. An XPath union (`//a | //button`) is written as two `xpath:`
/// descriptors, or as a single path with an `or` predicate
/// (`//*[self::a or self::button]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyDescriptor {
    Labels,
    Query(String),
    Css(String),
    XPath(String),
    Text(String),
    Partial(String),
}

impl StrategyDescriptor {
    pub fn mode(&self) -> PollMode {
        match self {
            Self::Labels | Self::Query(_) => PollMode::Api,
            Self::Css(_) | Self::XPath(_) | Self::Text(_) | Self::Partial(_) => PollMode::Browser,
        }
    }

    /// The unread query over `labels`, e.g. `label:INBOX is:unread`.
    pub fn unread_query(labels: &[String]) -> Self {
        let mut parts: Vec<String> = labels.iter().map(|l| format!("label:{}", l)).collect();
        parts.push("is:unread".to_string());
        Self::Query(parts.join(" "))
    }

    pub fn defaults_for(mode: PollMode, labels: &[String]) -> Vec<Self> {
        match mode {
            PollMode::Api => vec![Self::unread_query(labels), Self::Labels],
            PollMode::Browser => CHECK_MAIL_LABELS
                .iter()
                .map(|label| {
                    Self::XPath(format!(
                        "//*[(@role='link' or @role='button' or self::a or self::button) and normalize-space()='{}']",
                        label
                    ))
                })
                .chain(std::iter::once(Self::Css(FALLBACK_CHECK_MAIL_CSS.to_string())))
                .collect(),
        }
    }
}

impl fmt::Display for StrategyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Labels => f.write_str("labels"),
            Self::Query(v) => write!(f, "query:{}", v),
            Self::Css(v) => write!(f, "css:{}", v),
            Self::XPath(v) => write!(f, "xpath:{}", v),
            Self::Text(v) => write!(f, "text:{}", v),
            Self::Partial(v) => write!(f, "partial:{}", v),
        }
    }
}

impl FromStr for StrategyDescriptor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s == "labels" {
            return Ok(Self::Labels);
        }

        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("'{}' is not of the form kind:value", s))?;
        if value.is_empty() {
            return Err(format!("'{}' has an empty value", s));
        }
        let value = value.to_string();

        match kind {
            "query" => Ok(Self::Query(value)),
            "css" => Ok(Self::Css(value)),
            "xpath" => Ok(Self::XPath(value)),
            "text" => Ok(Self::Text(value)),
            "partial" => Ok(Self::Partial(value)),
            other => Err(format!("unknown strategy kind '{}'", other)),
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub mode: PollMode,
    pub interval: Duration,
    /// `None` runs until shutdown.
    pub max_cycles: Option<u64>,
    pub attempt_timeout: Duration,
    pub auth_timeout: Duration,
    pub failure_threshold: u32,
    pub strategies: Vec<StrategyDescriptor>,
    pub labels: Vec<String>,
    pub max_messages: u32,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub webdriver_url: String,
    pub browser_target_url: String,
    pub browser_profile_dir: Option<PathBuf>,
    pub browser_headless: bool,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl PollerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mode: PollMode = parse_or(&get, "POLL_MODE", PollMode::Api)?;

        let interval = parse_or::<u64>(&get, "CHECK_INTERVAL", 60)?;
        if interval == 0 {
            return Err(Error::invalid_var("CHECK_INTERVAL", "0", "must be positive"));
        }

        let max_cycles = parse_or::<u64>(&get, "MAX_CYCLES", 0)?;
        let attempt_timeout = positive_secs(&get, "ATTEMPT_TIMEOUT_SECS", 30)?;
        let auth_timeout = positive_secs(&get, "AUTH_TIMEOUT_SECS", 300)?;

        let failure_threshold = parse_or::<u32>(&get, "FAILURE_ESCALATION_THRESHOLD", 5)?;
        if failure_threshold == 0 {
            return Err(Error::invalid_var(
                "FAILURE_ESCALATION_THRESHOLD",
                "0",
                "must be positive",
            ));
        }

        let labels: Vec<String> = get("GMAIL_LABELS")
            .unwrap_or_else(|| "INBOX".to_string())
            .split(',')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if labels.is_empty() {
            return Err(Error::invalid_var(
                "GMAIL_LABELS",
                &get("GMAIL_LABELS").unwrap_or_default(),
                "no labels given",
            ));
        }

        let max_messages = parse_or::<u32>(&get, "MAX_MESSAGES", 10)?;
        if max_messages == 0 {
            return Err(Error::invalid_var("MAX_MESSAGES", "0", "must be positive"));
        }

        let strategies = match get("ACTION_STRATEGIES") {
            Some(raw) => parse_strategies(&raw, mode)?,
            None => StrategyDescriptor::defaults_for(mode, &labels),
        };

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        if let Err(e) = tracing::Level::from_str(&log_level) {
            return Err(Error::invalid_var("LOG_LEVEL", &log_level, e));
        }

        Ok(Self {
            mode,
            interval: Duration::from_secs(interval),
            max_cycles: (max_cycles > 0).then_some(max_cycles),
            attempt_timeout,
            auth_timeout,
            failure_threshold,
            strategies,
            labels,
            max_messages,
            credentials_path: get("CREDENTIALS_PATH")
                .unwrap_or_else(|| "credentials.json".to_string())
                .into(),
            token_path: get("TOKEN_PATH")
                .unwrap_or_else(|| "token.json".to_string())
                .into(),
            webdriver_url: get("WEBDRIVER_URL").unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
            browser_target_url: get("BROWSER_TARGET_URL")
                .unwrap_or_else(|| DEFAULT_BROWSER_TARGET_URL.to_string()),
            browser_profile_dir: get("BROWSER_PROFILE_DIR").map(PathBuf::from),
            browser_headless: parse_bool(&get, "BROWSER_HEADLESS", false)?,
            log_level: log_level.to_ascii_lowercase(),
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.to_string()).collect()
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e| Error::invalid_var(name, &raw, e)),
        None => Ok(default),
    }
}

fn positive_secs(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> Result<Duration> {
    let secs = parse_or::<u64>(get, name, default)?;
    if secs == 0 {
        return Err(Error::invalid_var(name, "0", "must be positive"));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> Result<bool> {
    match get(name) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::invalid_var(name, &raw, "expected true or false")),
        },
    }
}

fn parse_strategies(raw: &str, mode: PollMode) -> Result<Vec<StrategyDescriptor>> {
    let mut strategies = Vec::new();
    for part in raw.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        let descriptor: StrategyDescriptor = part
            .parse()
            .map_err(|e| Error::invalid_var("ACTION_STRATEGIES", raw, e))?;
        if descriptor.mode() != mode {
            return Err(Error::invalid_var(
                "ACTION_STRATEGIES",
                raw,
                format!("'{}' cannot be used in {} mode", descriptor, mode),
            ));
        }
        strategies.push(descriptor);
    }

    if strategies.is_empty() {
        return Err(Error::invalid_var("ACTION_STRATEGIES", raw, "no strategies given"));
    }
    Ok(strategies)
}
