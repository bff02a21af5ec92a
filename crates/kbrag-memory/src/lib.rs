//! kbrag-memory
//!
//! Short-lived conversational context: one bounded FIFO of exchanges per
//! session, expired lazily after a period of inactivity.
//!
//! Sessions live in an arena keyed by id. The map lock is only held to look a
//! session up (or to remove it); each session has its own mutex, so work on
//! different sessions never serialises. When both locks are needed the map
//! lock is taken first.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use kbrag_core::config::RetrievalConfig;
use kbrag_core::error::{lock_poisoned, Error, Result};

/// One query/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub query: String,
    pub response: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct Session {
    history: VecDeque<Exchange>,
    last_activity: Instant,
    /// Set when the session is dropped from the arena; holders of a stale
    /// handle must look the id up again.
    retired: bool,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self { history: VecDeque::new(), last_activity: now, retired: false }
    }

    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > timeout
    }
}

type SessionHandle = Arc<Mutex<Session>>;

pub struct ConversationMemory {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    max_history: usize,
    timeout: Duration,
}

impl ConversationMemory {
    pub fn new(max_history: usize, timeout: Duration) -> Result<Self> {
        if max_history == 0 {
            return Err(Error::InvalidConfig("max_conversation_history must be positive".into()));
        }
        Ok(Self { sessions: RwLock::new(HashMap::new()), max_history, timeout })
    }

    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Self::new(config.max_conversation_history, config.session_timeout())
    }

    pub fn max_history(&self) -> usize { self.max_history }
    pub fn timeout(&self) -> Duration { self.timeout }

    /// Record an exchange, evicting the oldest one beyond the bound. A
    /// session that went stale starts over with an empty history.
    pub fn append(&self, session_id: &str, query: &str, response: &str) -> Result<()> {
        let exchange = Exchange { query: query.to_string(), response: response.to_string(), at: Utc::now() };
        loop {
            let handle = self.get_or_create(session_id)?;
            let mut session = handle.lock().map_err(lock_poisoned)?;
            if session.retired {
                continue;
            }
            let now = Instant::now();
            if session.is_stale(now, self.timeout) {
                tracing::info!(session_id, dropped = session.history.len(), "session expired; starting fresh");
                session.history.clear();
            }
            session.history.push_back(exchange);
            while session.history.len() > self.max_history {
                session.history.pop_front();
            }
            session.last_activity = now;
            return Ok(());
        }
    }

    /// History of `session_id`, oldest first. Reading does not count as
    /// activity; an expired session is dropped and yields nothing.
    pub fn get_context(&self, session_id: &str) -> Result<Vec<Exchange>> {
        let Some(handle) = self.get(session_id)? else {
            return Ok(Vec::new());
        };
        {
            let session = handle.lock().map_err(lock_poisoned)?;
            if session.retired {
                return Ok(Vec::new());
            }
            if !session.is_stale(Instant::now(), self.timeout) {
                return Ok(session.history.iter().cloned().collect());
            }
        }
        self.expire_if_stale(session_id)?;
        Ok(Vec::new())
    }

    /// Drop `session_id` if it has been idle longer than the timeout.
    pub fn expire_if_stale(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(lock_poisoned)?;
        let Some(handle) = sessions.get(session_id).cloned() else {
            return Ok(false);
        };
        let mut session = handle.lock().map_err(lock_poisoned)?;
        if !session.is_stale(Instant::now(), self.timeout) {
            return Ok(false);
        }
        session.retired = true;
        sessions.remove(session_id);
        tracing::info!(session_id, "session expired");
        Ok(true)
    }

    /// Drop every stale session; returns how many were removed.
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().map_err(lock_poisoned)?;
        let before = sessions.len();
        let mut poisoned = false;
        sessions.retain(|_, handle| match handle.lock() {
            Ok(mut session) if session.is_stale(now, self.timeout) => {
                session.retired = true;
                false
            }
            Ok(_) => true,
            Err(_) => {
                poisoned = true;
                true
            }
        });
        if poisoned {
            return Err(Error::Internal("lock poisoned".into()));
        }
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = sessions.len(), "swept expired sessions");
        }
        Ok(removed)
    }

    /// Sweep on a fixed interval until the memory is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(memory) = weak.upgrade() else { break };
                if let Err(e) = memory.sweep_expired() {
                    tracing::warn!(error = %e, "session sweep failed");
                }
            }
        })
    }

    pub fn session_count(&self) -> Result<usize> {
        Ok(self.sessions.read().map_err(lock_poisoned)?.len())
    }

    fn get(&self, session_id: &str) -> Result<Option<SessionHandle>> {
        Ok(self.sessions.read().map_err(lock_poisoned)?.get(session_id).cloned())
    }

    fn get_or_create(&self, session_id: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.get(session_id)? {
            return Ok(handle);
        }
        let mut sessions = self.sessions.write().map_err(lock_poisoned)?;
        let handle = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(Instant::now()))));
        Ok(Arc::clone(handle))
    }
}
