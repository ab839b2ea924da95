//! Chunked upload sessions.
//!
//! A session accumulates chunk text in call order until a final chunk
//! arrives. Each session sits behind its own mutex so appends and the
//! finalize step of one upload never interleave; the map lock is only held
//! for lookup, insert and removal.
//!
//! ```text
//! INIT ──chunk──▶ RECEIVING ──final──▶ FINALIZING ──ok──▶ COMPLETE
//!   │                 │                    │
//!   └─────────────────┴────── error ───────┴──────────▶ FAILED
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::dataset::parser::ParseOptions;
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Init,
    Receiving,
    Finalizing,
    Complete,
    Failed,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Complete | UploadState::Failed)
    }
}

#[derive(Debug)]
pub struct UploadSession {
    pub upload_id: String,
    pub dataset_name: String,
    pub filename: Option<String>,
    pub parse: ParseOptions,
    text: String,
    pub received_bytes: usize,
    pub chunks_received: usize,
    pub last_chunk_index: Option<u64>,
    pub state: UploadState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(dataset_name: impl Into<String>, filename: Option<String>, parse: ParseOptions) -> Self {
        let now = Utc::now();
        Self {
            upload_id: Uuid::new_v4().to_string(),
            dataset_name: dataset_name.into(),
            filename,
            parse,
            text: String::new(),
            received_bytes: 0,
            chunks_received: 0,
            last_chunk_index: None,
            state: UploadState::Init,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_idle(&self, max_idle_seconds: i64) -> bool {
        (Utc::now() - self.last_activity).num_seconds() > max_idle_seconds
    }

    pub fn ensure_open(&self) -> AppResult<()> {
        if self.state.is_terminal() {
            return Err(AppError::SessionClosed(self.upload_id.clone()));
        }
        Ok(())
    }

    /// Appends one chunk. `chunk_index` is informational only: chunks are
    /// always concatenated in call order.
    pub fn append(&mut self, chunk: &str, chunk_index: Option<u64>, max_bytes: usize) -> AppResult<()> {
        self.ensure_open()?;
        self.touch();

        if self.received_bytes + chunk.len() > max_bytes {
            self.fail();
            return Err(AppError::PayloadTooLarge { limit: max_bytes });
        }

        if let Some(index) = chunk_index {
            let expected = self.last_chunk_index.map(|i| i + 1).unwrap_or(0);
            if index != expected {
                tracing::warn!(
                    upload_id = %self.upload_id,
                    chunk_index = index,
                    expected,
                    "Chunk index out of sequence, appending in arrival order"
                );
            }
            self.last_chunk_index = Some(index);
        }

        self.text.push_str(chunk);
        self.received_bytes += chunk.len();
        self.chunks_received += 1;
        self.state = UploadState::Receiving;
        Ok(())
    }

    /// Moves to FINALIZING and hands over the accumulated text.
    pub fn begin_finalize(&mut self) -> AppResult<String> {
        self.ensure_open()?;
        self.state = UploadState::Finalizing;
        Ok(std::mem::take(&mut self.text))
    }

    pub fn complete(&mut self) {
        self.state = UploadState::Complete;
        self.text = String::new();
        self.touch();
    }

    pub fn fail(&mut self) {
        self.state = UploadState::Failed;
        self.text = String::new();
        self.touch();
    }
}

pub type SharedSession = Arc<Mutex<UploadSession>>;

/// Live upload sessions keyed by upload id.
#[derive(Clone)]
pub struct UploadSessionManager {
    sessions: Arc<RwLock<HashMap<String, SharedSession>>>,
    max_sessions: usize,
    idle_timeout_seconds: i64,
}

impl UploadSessionManager {
    pub fn new(max_sessions: usize, idle_timeout_seconds: i64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
            idle_timeout_seconds,
        }
    }

    /// Registers a session, reaping idle ones first when the limit is hit.
    pub async fn open_session(&self, session: UploadSession) -> AppResult<String> {
        let mut sessions = self.sessions.write().await;

        if sessions.len() >= self.max_sessions {
            let reaped = reap_locked(&mut sessions, self.idle_timeout_seconds);
            if reaped > 0 {
                tracing::warn!(reaped, "Reaped idle upload sessions to make room");
            }
            if sessions.len() >= self.max_sessions {
                return Err(AppError::SessionLimitReached);
            }
        }

        let id = session.upload_id.clone();
        sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        Ok(id)
    }

    pub async fn get(&self, upload_id: &str) -> AppResult<SharedSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(upload_id)
            .cloned()
            .ok_or_else(|| AppError::UnknownSession(upload_id.to_string()))
    }

    pub async fn remove(&self, upload_id: &str) -> Option<SharedSession> {
        self.sessions.write().await.remove(upload_id)
    }

    /// Drops every session idle past the timeout. Sessions currently locked
    /// by a chunk call are skipped.
    pub async fn reap_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let reaped = reap_locked(&mut sessions, self.idle_timeout_seconds);
        if reaped > 0 {
            tracing::warn!(reaped, "Reaped idle upload sessions");
        }
        reaped
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for UploadSessionManager {
    fn default() -> Self {
        Self::new(100, 3600)
    }
}

fn reap_locked(sessions: &mut HashMap<String, SharedSession>, idle_timeout_seconds: i64) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| match session.try_lock() {
        Ok(guard) => !guard.is_idle(idle_timeout_seconds),
        Err(_) => true,
    });
    before - sessions.len()
}
