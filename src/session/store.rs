//! On-disk session persistence
//!
//! One JSON file per session under `<workingDirectory>/.feature-factory/
//! sessions/`. Writes are atomic: serialize to a temp file, fsync, rename.
//! The file-per-session layout with rename gives last-writer-wins without
//! any in-process locking.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{SessionStatus, WorkflowState};

/// Errors from session persistence
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session {session_id} is not resumable (status: {status:?})")]
    NotResumable {
        session_id: String,
        status: SessionStatus,
    },

    #[error("Failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// File-backed session store
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Store rooted at `<working_directory>/.feature-factory/sessions/`
    pub fn new(working_directory: &Path) -> Self {
        Self {
            sessions_dir: working_directory.join(".feature-factory").join("sessions"),
        }
    }

    /// Directory holding the session files
    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Persist a session snapshot atomically
    pub async fn save(&self, state: &WorkflowState) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(&self.sessions_dir).await?;

        let path = self.session_path(&state.session_id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path).await?;
        debug!("Persisted session {} ({:?})", state.session_id, state.status);
        Ok(())
    }

    /// Load one session by id
    pub async fn load(&self, session_id: &str) -> Result<WorkflowState, SessionError> {
        let path = self.session_path(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(session_id.to_string()));
            }
            Err(e) => return Err(SessionError::Io(e)),
        };

        Ok(serde_json::from_str(&content)?)
    }

    /// Load a session and validate it can be resumed
    pub async fn load_resumable(&self, session_id: &str) -> Result<WorkflowState, SessionError> {
        let state = self.load(session_id).await?;
        if !state.is_resumable() {
            return Err(SessionError::NotResumable {
                session_id: session_id.to_string(),
                status: state.status,
            });
        }
        Ok(state)
    }

    /// List all sessions, most recently updated first
    ///
    /// Unreadable or corrupt files are skipped with a warning so one bad
    /// artifact never hides the rest.
    pub async fn list(&self) -> Result<Vec<WorkflowState>, SessionError> {
        let mut sessions = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.sessions_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(SessionError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match tokio::fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<WorkflowState>(&content) {
                    Ok(state) => sessions.push(state),
                    Err(e) => warn!("Skipping corrupt session file {}: {}", path.display(), e),
                },
                Err(e) => warn!("Skipping unreadable session file {}: {}", path.display(), e),
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// The most recently updated resumable session, if any
    pub async fn get_resumable_session(&self) -> Result<Option<WorkflowState>, SessionError> {
        let sessions = self.list().await?;
        Ok(sessions.into_iter().find(WorkflowState::is_resumable))
    }

    /// Delete sessions older than `max_age` and, optionally, failed ones
    ///
    /// Returns the deleted session ids.
    pub async fn cleanup(&self, max_age: chrono::Duration, include_failed: bool) -> Result<Vec<String>, SessionError> {
        let cutoff = chrono::Utc::now() - max_age;
        let mut deleted = Vec::new();

        for state in self.list().await? {
            let stale = state.updated_at < cutoff;
            let failed = include_failed && state.status == SessionStatus::Failed;
            if stale || failed {
                let path = self.session_path(&state.session_id);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => deleted.push(state.session_id),
                    Err(e) => warn!("Failed to delete session file {}: {}", path.display(), e),
                }
            }
        }

        if !deleted.is_empty() {
            info!("Cleaned up {} sessions", deleted.len());
        }
        Ok(deleted)
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", session_id))
    }
}
