//! Test doubles shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use mail_transport::gmail::MessageRef;
use parking_lot::Mutex;

use crate::action::{ActionOutput, ActionStrategy, StrategyError};
use crate::credentials::{
    AuthContext, AuthError, AuthenticationSession, Authenticator, Credential, CredentialStore,
    MemoryCredentialStore, SessionConfig, StorageError,
};
use crate::poll::{CycleReporter, PollCycleRunner, Poller, RecoveryController, ReportError};

/// Serve `app` on an ephemeral loopback port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    format!("http://{}", addr)
}

pub fn test_client() -> reqwest::Client {
    mail_transport::create_client_builder(Duration::from_secs(5))
        .build()
        .expect("build test client")
}

/// Store whose every operation fails.
#[derive(Default)]
pub struct FailingStore {
    saves: AtomicUsize,
}

impl FailingStore {
    pub fn save_attempts(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn error(op: &'static str) -> StorageError {
        StorageError::Io {
            op,
            path: "token.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        }
    }
}

#[async_trait]
impl CredentialStore for FailingStore {
    async fn load(&self) -> Result<Option<Credential>, StorageError> {
        Err(Self::error("reading"))
    }

    async fn save(&self, _credential: &Credential) -> Result<(), StorageError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(Self::error("writing"))
    }
}

#[derive(Clone, Copy)]
enum AuthMode {
    Issue,
    Fail,
    Panic,
}

/// Authenticator that hands out a fixed credential, always fails, or panics.
pub struct StaticAuthenticator {
    mode: AuthMode,
    calls: AtomicUsize,
}

impl StaticAuthenticator {
    fn with_mode(mode: AuthMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::with_mode(AuthMode::Issue)
    }

    pub fn failing() -> Self {
        Self::with_mode(AuthMode::Fail)
    }

    pub fn panicking() -> Self {
        Self::with_mode(AuthMode::Panic)
    }

    fn issue(&self) -> Result<Credential, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            AuthMode::Issue => Ok(Credential::new(format!("token-{}", n))
                .with_expiry(Utc::now() + chrono::Duration::hours(1))),
            AuthMode::Fail => Err(AuthError::AcquireFailed("static failure".into())),
            AuthMode::Panic => panic!("authenticator panic"),
        }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn renew(&self, _current: &Credential) -> Result<Credential, AuthError> {
        self.issue()
    }

    async fn acquire(&self, _previous: Option<Credential>) -> Result<Credential, AuthError> {
        self.issue()
    }
}

/// Session that authenticates on first use without interaction.
pub fn active_session() -> AuthenticationSession {
    AuthenticationSession::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(StaticAuthenticator::ok()),
        SessionConfig::default(),
    )
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Messages(usize),
    Trigger,
    NotApplicable,
    Fail,
    Unauthorized,
    Hang,
    Panic,
}

pub struct ScriptedStrategy {
    id: String,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl ScriptedStrategy {
    pub fn new(id: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionStrategy for ScriptedStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, _context: &AuthContext) -> Result<ActionOutput, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Messages(n) => Ok(ActionOutput::Messages(
                (0..*n)
                    .map(|i| MessageRef {
                        id: format!("m{}", i),
                        thread_id: format!("t{}", i),
                    })
                    .collect(),
            )),
            Behavior::Trigger => Ok(ActionOutput::Triggered {
                locator: self.id.clone(),
            }),
            Behavior::NotApplicable => {
                Err(StrategyError::NotApplicable(format!("{} absent", self.id)))
            }
            Behavior::Fail => Err(StrategyError::Failed(format!("{} broke", self.id))),
            Behavior::Unauthorized => Err(StrategyError::Unauthorized("401".into())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(StrategyError::Failed("woke up".into()))
            }
            Behavior::Panic => panic!("scripted panic"),
        }
    }
}

/// Reporter that records strategy ids, optionally failing, stalling or panicking.
pub struct RecordingReporter {
    reports: Mutex<Vec<String>>,
    failure: Option<ReportError>,
    delay: Duration,
    panic: bool,
}

impl RecordingReporter {
    fn build(failure: Option<ReportError>, delay: Duration, panic: bool) -> Arc<Self> {
        Arc::new(Self {
            reports: Mutex::new(Vec::new()),
            failure,
            delay,
            panic,
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::build(None, Duration::ZERO, false)
    }

    /// Fails every report with `error`.
    pub fn failing(error: ReportError) -> Arc<Self> {
        Self::build(Some(error), Duration::ZERO, false)
    }

    /// Succeeds after `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(None, delay, false)
    }

    pub fn panicking() -> Arc<Self> {
        Self::build(None, Duration::ZERO, true)
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl CycleReporter for RecordingReporter {
    async fn report(
        &self,
        _context: &AuthContext,
        strategy: &str,
        _output: &ActionOutput,
    ) -> Result<(), ReportError> {
        self.reports.lock().push(strategy.to_string());
        if self.panic {
            panic!("reporter panic");
        }
        tokio::time::sleep(self.delay).await;
        match &self.failure {
            None => Ok(()),
            Some(ReportError::Unauthorized(m)) => Err(ReportError::Unauthorized(m.clone())),
            Some(ReportError::Failed(m)) => Err(ReportError::Failed(m.clone())),
        }
    }
}

/// Poller over scripted strategies with an always-authenticating session.
pub fn poller_with(behaviors: Vec<Behavior>) -> Poller {
    let strategies = behaviors
        .into_iter()
        .enumerate()
        .map(|(i, b)| ScriptedStrategy::new(&format!("s{}", i), b) as Arc<dyn ActionStrategy>)
        .collect();
    let runner = PollCycleRunner::new(
        active_session(),
        strategies,
        RecordingReporter::ok(),
        Duration::from_millis(200),
    );
    Poller::new(runner, RecoveryController::new(5))
}
