//! Session stores: an in-memory map and a write-through JSON file store

use super::store::{Session, SessionSummary};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Storage backend for consultation sessions.
///
/// Implementations must be safe to share across tasks; the consultation
/// manager holds one behind an `Arc` and never keeps a lock across an await.
pub trait SessionStore: Send + Sync {
    /// Fetch a snapshot of a session
    fn get(&self, session_id: &str) -> crate::Result<Option<Session>>;

    /// Insert or replace a session
    fn put(&self, session: &Session) -> crate::Result<()>;

    /// Delete a session; returns whether it existed
    fn remove(&self, session_id: &str) -> crate::Result<bool>;

    /// Summaries of every stored session, most recently updated first
    fn list(&self) -> crate::Result<Vec<SessionSummary>>;
}

/// Process-local store; sessions vanish on restart
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &str) -> crate::Result<Option<Session>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    fn put(&self, session: &Session) -> crate::Result<()> {
        self.sessions
            .write()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn remove(&self, session_id: &str) -> crate::Result<bool> {
        Ok(self.sessions.write().remove(session_id).is_some())
    }

    fn list(&self) -> crate::Result<Vec<SessionSummary>> {
        let mut summaries: Vec<_> = self.sessions.read().values().map(Session::summary).collect();
        sort_summaries(&mut summaries);
        Ok(summaries)
    }
}

/// Persists each session as `<sessions_dir>/<session_id>.json`.
///
/// Reads go through an in-memory cache populated lazily from disk; every
/// `put` rewrites the session file.
#[derive(Debug)]
pub struct FileSessionStore {
    sessions_dir: PathBuf,
    cache: RwLock<HashMap<String, Session>>,
}

impl FileSessionStore {
    /// Create a store rooted at `sessions_dir`, creating the directory
    pub fn new<P: AsRef<Path>>(sessions_dir: P) -> crate::Result<Self> {
        let sessions_dir = sessions_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&sessions_dir)?;
        Ok(Self {
            sessions_dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.json", crate::utils::safe_filename(session_id)))
    }

    fn load(&self, session_id: &str) -> crate::Result<Option<Session>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let session: Session = serde_json::from_str(&content).map_err(|e| {
            crate::Error::Store(format!("corrupt session file {}: {}", path.display(), e))
        })?;
        Ok(Some(session))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, session_id: &str) -> crate::Result<Option<Session>> {
        if let Some(session) = self.cache.read().get(session_id) {
            return Ok(Some(session.clone()));
        }

        let loaded = self.load(session_id)?;
        if let Some(session) = &loaded {
            self.cache
                .write()
                .insert(session_id.to_string(), session.clone());
        }
        Ok(loaded)
    }

    fn put(&self, session: &Session) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(session)?;
        let path = self.session_path(&session.session_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;

        self.cache
            .write()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn remove(&self, session_id: &str) -> crate::Result<bool> {
        let cached = self.cache.write().remove(session_id).is_some();

        let path = self.session_path(session_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(cached)
        }
    }

    fn list(&self) -> crate::Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();

        for entry in std::fs::read_dir(&self.sessions_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let parsed = std::fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<Session>(&content).ok());
            match parsed {
                Some(session) => summaries.push(session.summary()),
                None => tracing::warn!("Skipping unreadable session file {}", path.display()),
            }
        }

        sort_summaries(&mut summaries);
        Ok(summaries)
    }
}

fn sort_summaries(summaries: &mut [SessionSummary]) {
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}
