//! Client-side permission synchronization
//!
//! A [`PermissionSession`] holds the allow-set of one subject and keeps it
//! fresh by polling the store on a fixed interval. Consumers query the held
//! set without I/O; change handlers fire once per poll that observes a real
//! difference and never on a poll that finds the same set.
//!
//! Lifecycle: `Unauthenticated -> Active -> Terminated`. Authenticating again
//! starts a fresh activation with a new timer.

mod config;

pub use config::{SyncConfig, DEFAULT_POLL_INTERVAL, POLL_INTERVAL_ENV};

use crate::auth::{self, AllowDelta, AllowSet};
use crate::storage::{RelationStore, StorageError, SubjectId};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No subject bound yet
    Unauthenticated,
    /// Bound to a subject, polling
    Active,
    /// Ended explicitly, held set cleared
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unauthenticated => write!(f, "unauthenticated"),
            SessionState::Active => write!(f, "active"),
            SessionState::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("invalid subject name: {0}")]
    InvalidName(String),

    #[error("subject not found: {0}")]
    NotFound(String),

    #[error("session is not active")]
    NotActive,

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => SyncError::NotFound(msg),
            other => SyncError::Storage(other.to_string()),
        }
    }
}

/// Called with the new allow-set and what changed
pub type ChangeHandler = Arc<dyn Fn(&AllowSet, &AllowDelta) + Send + Sync>;

/// The subject a session is bound to
struct Activation {
    epoch: u64,
    subject_id: SubjectId,
    name: String,
    shutdown: Option<oneshot::Sender<()>>,
}

struct SessionInner {
    id: Uuid,
    store: Arc<dyn RelationStore>,
    config: SyncConfig,
    state: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,

    /// Bumped on every activation and termination; poll results carrying an
    /// older epoch are discarded
    epoch: AtomicU64,
    active: Mutex<Option<Activation>>,
    allowed: RwLock<AllowSet>,
    handlers: Mutex<Vec<ChangeHandler>>,
}

impl SessionInner {
    fn set_state(&self, state: SessionState) {
        let _ = self.state.send(state);
    }

    /// Replace the held set if `fresh` differs and `epoch` is current.
    ///
    /// Returns true when a change was applied and handlers were notified.
    fn apply(&self, epoch: u64, fresh: AllowSet) -> bool {
        let (snapshot, delta) = {
            let mut allowed = self.allowed.write();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                debug!(session = %self.id, epoch, "Discarding stale poll result");
                return false;
            }

            let delta = allowed.delta(&fresh);
            if delta.is_empty() {
                return false;
            }

            *allowed = fresh;
            (allowed.clone(), delta)
        };

        info!(session = %self.id, delta = %delta, allowed = %snapshot, "Permissions changed");

        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(&snapshot, &delta);
        }

        true
    }

    /// Cancel the current activation, if any. Returns true if one existed.
    fn stop(&self) -> bool {
        let activation = self.active.lock().take();

        let Some(mut activation) = activation else {
            return false;
        };

        if let Some(shutdown) = activation.shutdown.take() {
            let _ = shutdown.send(());
        }

        let mut allowed = self.allowed.write();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *allowed = AllowSet::new();

        debug!(session = %self.id, subject = %activation.name, "Stopped polling");
        true
    }
}

/// Poll loop for one activation
async fn poll_task(
    inner: Arc<SessionInner>,
    epoch: u64,
    subject_id: SubjectId,
    mut shutdown: oneshot::Receiver<()>,
) {
    let period = inner.config.poll_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    // A slow fetch pushes the schedule back instead of bursting to catch up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        match inner.store.granted_tokens(subject_id).await {
            Ok(fresh) => {
                inner.apply(epoch, fresh);
            }
            Err(e) => {
                // Keep serving the last known set
                warn!(session = %inner.id, subject_id, error = %e, "Permission poll failed");
            }
        }
    }

    debug!(session = %inner.id, epoch, "Poll task finished");
}

/// A client's synchronized view of one subject's permissions
///
/// Dropping the session cancels its poll task.
pub struct PermissionSession {
    inner: Arc<SessionInner>,
}

impl PermissionSession {
    pub fn new(store: Arc<dyn RelationStore>, config: SyncConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Unauthenticated);

        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            store,
            config,
            state: state_tx,
            state_rx,
            epoch: AtomicU64::new(0),
            active: Mutex::new(None),
            allowed: RwLock::new(AllowSet::new()),
            handlers: Mutex::new(Vec::new()),
        });

        Self { inner }
    }

    /// Session identifier, used in logs
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_rx.borrow()
    }

    /// Get a receiver for state changes
    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.inner.state_rx.clone()
    }

    /// Name of the bound subject while active
    pub fn subject(&self) -> Option<String> {
        self.inner.active.lock().as_ref().map(|a| a.name.clone())
    }

    /// Register a handler invoked on every applied change
    pub fn on_change<F>(&self, handler: F)
    where
        F: Fn(&AllowSet, &AllowDelta) + Send + Sync + 'static,
    {
        self.inner.handlers.lock().push(Arc::new(handler));
    }

    /// Bind the session to a subject and start polling.
    ///
    /// Fails with `NotFound` if the name does not resolve, leaving the
    /// session as it was. An already active session is restarted.
    pub async fn authenticate(&self, name: &str) -> Result<(), SyncError> {
        let name = auth::parse_subject_name(name).map_err(|e| SyncError::InvalidName(e.to_string()))?;

        let subject_id = self.inner.store.find_subject(&name).await?;
        let initial = self.inner.store.granted_tokens(subject_id).await?;

        self.inner.stop();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let epoch = {
            let mut active = self.inner.active.lock();
            let mut allowed = self.inner.allowed.write();

            let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *allowed = initial;

            *active = Some(Activation {
                epoch,
                subject_id,
                name: name.clone(),
                shutdown: Some(shutdown_tx),
            });
            epoch
        };

        tokio::spawn(poll_task(self.inner.clone(), epoch, subject_id, shutdown_rx));
        self.inner.set_state(SessionState::Active);

        info!(
            session = %self.inner.id,
            subject = %name,
            subject_id,
            allowed = %self.allow_set(),
            interval = ?self.inner.config.poll_interval,
            "Session active"
        );
        Ok(())
    }

    /// End the session: stop polling and clear the held set.
    ///
    /// Returns false if the session was not active.
    pub fn end(&self) -> bool {
        if !self.inner.stop() {
            return false;
        }

        self.inner.set_state(SessionState::Terminated);
        info!(session = %self.inner.id, "Session ended");
        true
    }

    /// Fetch now instead of waiting for the next tick.
    ///
    /// Returns true if the held set changed.
    pub async fn refresh(&self) -> Result<bool, SyncError> {
        let (epoch, subject_id) = self
            .inner
            .active
            .lock()
            .as_ref()
            .map(|a| (a.epoch, a.subject_id))
            .ok_or(SyncError::NotActive)?;

        let fresh = self.inner.store.granted_tokens(subject_id).await?;
        Ok(self.inner.apply(epoch, fresh))
    }

    /// Whether a token is in the held set. No I/O.
    pub fn is_allowed(&self, token: char) -> bool {
        self.inner.allowed.read().allows(token)
    }

    /// Copy of the held set
    pub fn allow_set(&self) -> AllowSet {
        self.inner.allowed.read().clone()
    }

    /// Filter text through the held set
    pub fn filter(&self, text: &str) -> String {
        self.inner.allowed.read().filter(text)
    }
}

impl Drop for PermissionSession {
    fn drop(&mut self) {
        self.inner.stop();
    }
}
