//! # Staging Area
//!
//! Per-session, ordered holding of uploaded files until the owning identity is
//! authorized and the files are flushed to remote storage.
//!
//! ## Lifecycle
//!
//! ```text
//! stage -> stage -> ... -> drain_all (empties, keeps the session)
//!                      \-> idle timeout (session discarded)
//! ```
//!
//! Every session has its own lock. `stage` and `drain_all` for one session
//! are serialized by it, so a file staged while a drain is in progress lands
//! in the next drain, never in both and never in neither.

use bridge_traits::remote::UploadPayload;
use bridge_traits::time::Clock;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, UploadError};

/// Browser session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session id from its cookie value
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| UploadError::InvalidSessionId(e.to_string()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A file as received, before it is given a position.
#[derive(Clone)]
pub struct PendingFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PendingFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Final component of a client-supplied file name. Browsers may send
/// `C:\fakepath\a.txt` or a relative directory path.
///
/// ```
/// use core_upload::file_basename;
///
/// assert_eq!(file_basename("C:\\fakepath\\report.pdf"), "report.pdf");
/// assert_eq!(file_basename("photos/2024/a.jpg"), "a.jpg");
/// ```
pub fn file_basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

impl fmt::Debug for PendingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A file held by the staging area. Immutable once staged.
#[derive(Clone)]
pub struct StagedFile {
    original_name: String,
    content_type: String,
    bytes: Bytes,
    position: usize,
}

impl StagedFile {
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_payload(self) -> UploadPayload {
        UploadPayload::new(self.original_name, self.content_type, self.bytes)
    }
}

impl fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedFile")
            .field("original_name", &self.original_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .field("position", &self.position)
            .finish()
    }
}

struct StagingSession {
    files: Vec<StagedFile>,
    next_position: usize,
    last_access: DateTime<Utc>,
    /// Set when the sweeper removed this session from the map
    retired: bool,
}

impl StagingSession {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            files: Vec::new(),
            next_position: 0,
            last_access: now,
            retired: false,
        }
    }

    fn reset(&mut self) {
        self.files.clear();
        self.next_position = 0;
    }
}

type SessionSlot = Arc<Mutex<StagingSession>>;

pub struct StagingArea {
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
    idle_timeout: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl StagingArea {
    pub fn new(idle_timeout: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: chrono::Duration::from_std(idle_timeout)
                .unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn idle_timeout(&self) -> chrono::Duration {
        self.idle_timeout
    }

    /// Append `file` to the session and return its position.
    ///
    /// Positions start at 0 and increase by one per staged file until the
    /// session is drained.
    pub async fn stage(&self, session: &SessionId, file: PendingFile) -> usize {
        loop {
            let slot = self.slot_or_insert(session).await;
            let mut entry = slot.lock().await;
            if entry.retired {
                continue;
            }

            let now = self.clock.now();
            if self.is_idle(&entry, now) {
                debug!(session_id = %session, "Staging session expired, starting over");
                entry.reset();
            }

            let position = entry.next_position;
            entry.next_position += 1;
            entry.last_access = now;
            entry.files.push(StagedFile {
                original_name: file.file_name,
                content_type: file.content_type,
                bytes: file.bytes,
                position,
            });

            debug!(session_id = %session, position, "File staged");
            return position;
        }
    }

    /// Remove and return every staged file of the session in stage order.
    ///
    /// An unknown or expired session yields an empty vector.
    pub async fn drain_all(&self, session: &SessionId) -> Vec<StagedFile> {
        let Some(slot) = self.slot(session).await else {
            return Vec::new();
        };

        let mut entry = slot.lock().await;
        if entry.retired {
            return Vec::new();
        }

        let now = self.clock.now();
        if self.is_idle(&entry, now) {
            entry.reset();
        }
        entry.last_access = now;
        entry.next_position = 0;
        let files = std::mem::take(&mut entry.files);

        debug!(session_id = %session, count = files.len(), "Staging session drained");
        files
    }

    /// Discard the session's files without delivering them.
    pub async fn discard(&self, session: &SessionId) {
        let removed = self.sessions.write().await.remove(session);
        if let Some(slot) = removed {
            slot.lock().await.retired = true;
        }
    }

    /// Number of files currently staged for the session.
    pub async fn len(&self, session: &SessionId) -> usize {
        let Some(slot) = self.slot(session).await else {
            return 0;
        };
        let entry = slot.lock().await;
        if entry.retired || self.is_idle(&entry, self.clock.now()) {
            0
        } else {
            entry.files.len()
        }
    }

    pub async fn is_empty(&self, session: &SessionId) -> bool {
        self.len(session).await == 0
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop every session idle for longer than the timeout.
    ///
    /// Sessions whose lock is held are in use and therefore skipped.
    pub async fn purge_expired(&self) -> Vec<SessionId> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let mut purged = Vec::new();

        sessions.retain(|id, slot| match slot.try_lock() {
            Ok(mut entry) if self.is_idle(&entry, now) => {
                entry.retired = true;
                purged.push(*id);
                false
            }
            _ => true,
        });

        if !purged.is_empty() {
            info!(count = purged.len(), "Purged idle staging sessions");
        }
        purged
    }

    fn is_idle(&self, entry: &StagingSession, now: DateTime<Utc>) -> bool {
        now - entry.last_access > self.idle_timeout
    }

    async fn slot(&self, session: &SessionId) -> Option<SessionSlot> {
        self.sessions.read().await.get(session).cloned()
    }

    async fn slot_or_insert(&self, session: &SessionId) -> SessionSlot {
        if let Some(slot) = self.slot(session).await {
            return slot;
        }
        let now = self.clock.now();
        self.sessions
            .write()
            .await
            .entry(*session)
            .or_insert_with(|| Arc::new(Mutex::new(StagingSession::new(now))))
            .clone()
    }
}
