//! Startup wiring: turns a [`PollerConfig`] into a ready [`Poller`].

use std::path::Path;
use std::sync::Arc;

use mail_transport::gmail::GmailClient;
use mail_transport::oauth::{ClientSecrets, GMAIL_READONLY_SCOPE};
use mail_transport::webdriver::{SessionOptions, WebDriverClient};
use tracing::{info, warn};

use crate::action::{self, ActionStrategy, GmailReporter};
use crate::config::{PollMode, PollerConfig};
use crate::credentials::platforms::{GoogleAuthenticator, WebDriverAuthenticator};
use crate::credentials::{
    AuthenticationSession, Authenticator, DEFAULT_EXPIRY_SKEW, FileCredentialStore, SessionConfig,
    SessionState,
};
use crate::poll::{CycleReporter, LogReporter, PollCycleRunner, Poller, RecoveryController};
use crate::{Error, Result};

/// Fail fast when material the loop cannot work without is absent.
pub fn check_bootstrap(config: &PollerConfig) -> Result<()> {
    if config.mode == PollMode::Api && !config.credentials_path.is_file() {
        return Err(Error::MissingBootstrap {
            path: config.credentials_path.clone(),
        });
    }
    Ok(())
}

pub fn log_banner(config: &PollerConfig) {
    info!(
        mode = %config.mode,
        interval_secs = config.interval.as_secs(),
        max_cycles = ?config.max_cycles,
        labels = %config.labels.join(", "),
        max_messages = config.max_messages,
        threshold = config.failure_threshold,
        "Starting inbox poller"
    );
    for (i, name) in config.strategy_names().iter().enumerate() {
        info!(order = i + 1, strategy = %name, "Action strategy");
    }
}

/// Build the poller and restore any persisted credential.
pub async fn build(config: &PollerConfig) -> Result<Poller> {
    check_bootstrap(config)?;

    let client = mail_transport::create_client_builder(config.attempt_timeout)
        .build()
        .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;

    let (authenticator, strategies, reporter) = match config.mode {
        PollMode::Api => api_components(config, client).await?,
        PollMode::Browser => browser_components(config, client)?,
    };

    let store = Arc::new(FileCredentialStore::new(&config.token_path));
    let mut session = AuthenticationSession::new(
        store,
        authenticator,
        SessionConfig {
            auth_timeout: config.auth_timeout,
            expiry_skew: DEFAULT_EXPIRY_SKEW,
        },
    );

    match session.restore().await {
        SessionState::Active => info!(path = %config.token_path.display(), "Restored credential"),
        SessionState::Stale => info!("Restored credential needs renewal"),
        state => warn!(
            %state,
            path = %config.token_path.display(),
            "No usable credential, first cycle will authenticate"
        ),
    }

    let runner = PollCycleRunner::new(session, strategies, reporter, config.attempt_timeout);
    Ok(Poller::new(
        runner,
        RecoveryController::new(config.failure_threshold),
    ))
}

type Components = (
    Arc<dyn Authenticator>,
    Vec<Arc<dyn ActionStrategy>>,
    Arc<dyn CycleReporter>,
);

async fn api_components(config: &PollerConfig, client: reqwest::Client) -> Result<Components> {
    let secrets = load_secrets(&config.credentials_path).await?;
    let authenticator = GoogleAuthenticator::new(
        client.clone(),
        secrets,
        vec![GMAIL_READONLY_SCOPE.to_string()],
    );

    let gmail = GmailClient::new(client);
    let strategies = action::gmail_strategies(
        &config.strategies,
        &gmail,
        &config.labels,
        config.max_messages,
    )?;

    Ok((
        Arc::new(authenticator),
        strategies,
        Arc::new(GmailReporter::new(gmail, config.attempt_timeout)),
    ))
}

fn browser_components(config: &PollerConfig, client: reqwest::Client) -> Result<Components> {
    let driver = WebDriverClient::new(client, &config.webdriver_url);
    let options = SessionOptions {
        headless: config.browser_headless,
        profile_dir: config
            .browser_profile_dir
            .as_ref()
            .map(|p| p.display().to_string()),
        ..SessionOptions::default()
    };

    let strategies =
        action::browser_strategies(&config.strategies, &driver, &config.browser_target_url)?;
    let authenticator =
        WebDriverAuthenticator::new(driver, options, config.browser_target_url.clone());

    Ok((Arc::new(authenticator), strategies, Arc::new(LogReporter)))
}

async fn load_secrets(path: &Path) -> Result<ClientSecrets> {
    ClientSecrets::load(path)
        .await
        .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
}
