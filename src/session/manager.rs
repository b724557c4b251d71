//! Credential session manager
//!
//! Obtains a Vault token, keeps it alive and publishes every new token
//! through a `watch` channel. A static token is published once at start.
//! AppRole credentials get a background task that logs in, renews at two
//! thirds of the lease and logs in again when renewal stops working.

use super::method::{AuthMethod, Lease, TokenIssuer};
use crate::config::SessionConfig;
use crate::errors::{Result, SyncError};
use crate::observability::MetricsRecorder;
use crate::secrets::SecretString;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The token currently in use.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SecretString,
    pub renewable: bool,
    pub lease_duration: Duration,
    pub issued_at: DateTime<Utc>,
    /// Why the last renewal failed, kept until the next login
    pub last_renewal_error: Option<String>,
}

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    RetryWait,
    Active,
    Renewing,
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::RetryWait => "retry_wait",
            Self::Active => "active",
            Self::Renewing => "renewing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
struct PhaseState {
    phase: SessionPhase,
    renewer: Option<CancellationToken>,
}

enum RenewOutcome {
    Cancelled,
    Relogin(String),
}

struct Shared {
    method: AuthMethod,
    issuer: Arc<dyn TokenIssuer>,
    retry_delay: Duration,
    renew_increment: Option<String>,
    state: Mutex<PhaseState>,
    closing: CancellationToken,
    sessions: watch::Sender<Option<Arc<Session>>>,
    metrics: MetricsRecorder,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PhaseState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    /// Move to `to` unless the session is closed.
    fn transition(&self, to: SessionPhase) -> bool {
        let mut state = self.lock();
        if state.phase == SessionPhase::Closed {
            return false;
        }
        debug!(from = %state.phase, to = %to, "Session phase change");
        state.phase = to;
        true
    }

    /// Enter `Active` with a fresh renewer. A renewer registered after
    /// close is cancelled right away.
    fn activate(&self, renewer: CancellationToken) -> bool {
        let mut state = self.lock();
        if state.phase == SessionPhase::Closed {
            renewer.cancel();
            return false;
        }
        if let Some(previous) = state.renewer.replace(renewer) {
            previous.cancel();
        }
        state.phase = SessionPhase::Active;
        true
    }

    fn close(&self) -> bool {
        let renewer = {
            let mut state = self.lock();
            if state.phase == SessionPhase::Closed {
                return false;
            }
            state.phase = SessionPhase::Closed;
            state.renewer.take()
        };
        if let Some(renewer) = renewer {
            renewer.cancel();
        }
        self.closing.cancel();
        true
    }

    fn publish(&self, lease: &Lease) {
        let session = Session {
            token: lease.token.clone(),
            renewable: lease.renewable,
            lease_duration: lease.duration,
            issued_at: Utc::now(),
            last_renewal_error: None,
        };
        self.sessions.send_replace(Some(Arc::new(session)));
    }

    fn update_session<F: FnOnce(&mut Session)>(&self, update: F) {
        self.sessions.send_if_modified(|current| {
            let Some(session) = current.as_ref() else {
                return false;
            };
            let mut next = Session::clone(session);
            update(&mut next);
            *current = Some(Arc::new(next));
            true
        });
    }

    /// Log in and make the token current.
    async fn establish(&self) -> Result<Lease> {
        let lease = self.method.login(&*self.issuer).await?;
        self.issuer.install_token(&lease.token)?;
        self.publish(&lease);
        Ok(lease)
    }

    async fn run(self: Arc<Self>) {
        loop {
            if !self.transition(SessionPhase::Authenticating) {
                break;
            }

            let lease = match self.establish().await {
                Ok(lease) => {
                    self.metrics.record_login(self.method.name(), true);
                    lease
                }
                Err(e) => {
                    self.metrics.record_login(self.method.name(), false);
                    error!(error = %e, method = self.method.name(), "Failed to request client token");
                    if !self.transition(SessionPhase::RetryWait) {
                        break;
                    }
                    tokio::select! {
                        _ = self.closing.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => continue,
                    }
                }
            };

            let renewer = self.closing.child_token();
            if !self.activate(renewer.clone()) {
                break;
            }
            info!(
                method = self.method.name(),
                renewable = lease.renewable,
                lease_secs = lease.duration.as_secs(),
                "Obtained client token"
            );

            match self.keep_renewed(lease, &renewer).await {
                RenewOutcome::Cancelled => break,
                RenewOutcome::Relogin(reason) => {
                    warn!(reason = %reason, "Client token can no longer be renewed, logging in again");
                    self.update_session(|s| s.last_renewal_error = Some(reason));
                }
            }
        }
        debug!("Session loop stopped");
    }

    async fn keep_renewed(&self, mut lease: Lease, renewer: &CancellationToken) -> RenewOutcome {
        loop {
            if lease.duration.is_zero() {
                renewer.cancelled().await;
                return RenewOutcome::Cancelled;
            }

            tokio::select! {
                _ = renewer.cancelled() => return RenewOutcome::Cancelled,
                _ = tokio::time::sleep(lease.duration * 2 / 3) => {}
            }

            if !lease.renewable {
                return RenewOutcome::Relogin("lease is not renewable".to_string());
            }
            if !self.transition(SessionPhase::Renewing) {
                return RenewOutcome::Cancelled;
            }

            let renewed = tokio::select! {
                _ = renewer.cancelled() => return RenewOutcome::Cancelled,
                renewed = self.issuer.renew_self(self.renew_increment.as_deref()) => renewed,
            };

            match renewed {
                Ok(renewed) => {
                    self.metrics.record_renewal(true);
                    if !self.transition(SessionPhase::Active) {
                        return RenewOutcome::Cancelled;
                    }
                    if renewed.duration.is_zero() {
                        return RenewOutcome::Relogin("lease exhausted".to_string());
                    }
                    debug!(lease_secs = renewed.duration.as_secs(), "Renewed client token");
                    lease.renewable = renewed.renewable;
                    lease.duration = renewed.duration;
                    self.update_session(|s| {
                        s.renewable = renewed.renewable;
                        s.lease_duration = renewed.duration;
                    });
                }
                Err(e) => {
                    self.metrics.record_renewal(false);
                    return RenewOutcome::Relogin(e.to_string());
                }
            }
        }
    }
}

/// Owns the Vault token lifecycle.
///
/// Dropping the manager closes it.
pub struct SessionManager {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Start a session. A static token is installed before this returns;
    /// renewable methods continue in a background task and
    /// [`SessionManager::wait_for_token`] tells when the first token is in.
    pub async fn start(
        method: AuthMethod,
        issuer: Arc<dyn TokenIssuer>,
        config: &SessionConfig,
        metrics: MetricsRecorder,
    ) -> Result<Self> {
        info!(name = method.name(), "Configure auth method");

        let (sessions, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            method,
            issuer,
            retry_delay: config.login_retry_delay(),
            renew_increment: config.renew_increment(),
            state: Mutex::new(PhaseState { phase: SessionPhase::Unauthenticated, renewer: None }),
            closing: CancellationToken::new(),
            sessions,
            metrics,
        });

        if !shared.method.is_renewable() {
            shared.transition(SessionPhase::Authenticating);
            if let Err(e) = shared.establish().await {
                shared.close();
                return Err(e);
            }
            shared.transition(SessionPhase::Active);
            return Ok(Self { shared, task: Mutex::new(None) });
        }

        let task = tokio::spawn(Arc::clone(&shared).run());
        Ok(Self { shared, task: Mutex::new(Some(task)) })
    }

    /// Wait until a token was published.
    ///
    /// Fails with [`SyncError::AuthTimeout`] when none arrives in time and
    /// with [`SyncError::MissingToken`] when the session closes first.
    pub async fn wait_for_token(&self, timeout: Duration) -> Result<Arc<Session>> {
        let mut sessions = self.shared.sessions.subscribe();
        let closing = self.shared.closing.clone();

        let wait = async {
            tokio::select! {
                biased;
                session = sessions.wait_for(Option::is_some) => match session {
                    Ok(session) => session.as_ref().map(Arc::clone).ok_or(SyncError::MissingToken),
                    Err(_) => Err(SyncError::MissingToken),
                },
                _ = closing.cancelled() => Err(SyncError::MissingToken),
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::AuthTimeout { timeout_ms: timeout.as_millis() as u64 }),
        }
    }

    /// The currently published session, if any
    pub fn current(&self) -> Option<Arc<Session>> {
        self.shared.sessions.borrow().clone()
    }

    /// Observe token changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Session>>> {
        self.shared.sessions.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.phase()
    }

    pub fn method(&self) -> &AuthMethod {
        &self.shared.method
    }

    /// Whether a background task keeps the token alive
    pub fn has_background_task(&self) -> bool {
        self.lock_task().is_some()
    }

    /// Stop renewing. Safe to call any number of times.
    pub fn close(&self) {
        if self.shared.close() {
            info!(method = self.shared.method.name(), "Closed vault session");
        }
    }

    /// Close and wait for the background task to finish
    pub async fn shutdown(&self) {
        self.close();
        let task = self.lock_task().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Session task ended abnormally");
            }
        }
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("method", &self.shared.method.name())
            .field("phase", &self.shared.phase())
            .finish()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.close();
    }
}
