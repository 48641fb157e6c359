//! Live sessions and the registry that owns them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::error::{SessionError, SessionId};
use super::launcher::ProcessHandle;

/// Target placeholder shown when nothing has been loaded.
pub const NO_TARGET: &str = "No program loaded";

/// A debugger session.
///
/// The process handle sits behind an async mutex; holding it is what
/// serializes commands on this session.
pub struct Session {
    id: SessionId,
    seq: u64,
    working_dir: PathBuf,
    pid: Option<u32>,
    ready: AtomicBool,
    target: RwLock<Option<String>>,
    process: Mutex<ProcessHandle>,
}

impl Session {
    /// Wrap a spawned process. The session starts out not ready.
    pub fn new(id: SessionId, seq: u64, working_dir: PathBuf, process: ProcessHandle) -> Self {
        Self {
            id,
            seq,
            working_dir,
            pid: process.pid(),
            ready: AtomicBool::new(false),
            target: RwLock::new(None),
            process: Mutex::new(process),
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Creation sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Working directory of the debugger process.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Debugger process id.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Mark the session ready. Never reverts.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Whether the readiness handshake completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Loaded target, if any.
    pub async fn target(&self) -> Option<String> {
        self.target.read().await.clone()
    }

    /// Record the loaded target.
    pub async fn set_target(&self, target: impl Into<String>) {
        *self.target.write().await = Some(target.into());
    }

    /// The process handle, locked per exchange.
    pub fn process(&self) -> &Mutex<ProcessHandle> {
        &self.process
    }

    /// Listing entry for this session.
    pub async fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            target: self
                .target()
                .await
                .unwrap_or_else(|| NO_TARGET.to_string()),
            working_dir: self.working_dir.display().to_string(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("seq", &self.seq)
            .field("working_dir", &self.working_dir)
            .field("pid", &self.pid)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id.
    pub id: SessionId,
    /// Loaded target or [`NO_TARGET`].
    pub target: String,
    /// Working directory.
    pub working_dir: String,
}

/// Concurrent map from session id to session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    next_seq: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next creation sequence number.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a session. Fails if the id is taken.
    pub fn insert(&self, session: Session) -> Result<Arc<Session>, SessionError> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(entry) => Err(SessionError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let session = Arc::new(session);
                entry.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// Look up a session.
    pub fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Unregister a session.
    pub fn remove(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .remove(id)
            .map(|(_, session)| session)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All sessions in creation order.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        sessions.sort_by_key(|s| s.seq());
        sessions
    }

    /// All ids in creation order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.snapshot().iter().map(|s| s.id().clone()).collect()
    }

    /// Listing in creation order.
    pub async fn list(&self) -> Vec<SessionSummary> {
        // Map guards are released by snapshot() before anything is awaited.
        let sessions = self.snapshot();
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(session.summary().await);
        }
        summaries
    }
}
