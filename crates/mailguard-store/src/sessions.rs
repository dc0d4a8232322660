//! Per-user, per-thread conversation tracking
//!
//! Each (user, thread) pair has at most one live session. Sessions
//! accumulate email fingerprints and a monotonically non-decreasing
//! suspicion score across related messages, go idle-expired under a
//! timer-driven sweep, or are closed explicitly once a terminal verdict is
//! reached. Expired and closed sessions move to a bounded archive for audit
//! and are excluded from active lookups; once the archive is full the oldest
//! snapshots are dropped.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Default maximum number of archived session snapshots
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 1024;

/// Lifecycle state of a conversation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Receiving related messages
    Active,
    /// Evicted by the idle sweep
    Expired,
    /// Closed by a terminal verdict
    Closed,
}

/// Read-only snapshot of a conversation session
///
/// External callers never mutate session state directly; snapshots are
/// copies taken under the tracker's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    /// Owning user
    pub user_id: String,

    /// Mail thread the session tracks
    pub thread_id: String,

    /// Ordered fingerprints of the emails seen in this thread
    pub fingerprints: Vec<String>,

    /// Accumulated suspicion score in [0, 1]; never decreases
    pub suspicion: f32,

    /// When the session was created
    pub created_at: SystemTime,

    /// Last `touch` time; drives idle expiry
    pub last_activity: SystemTime,

    /// Lifecycle state at snapshot time
    pub state: SessionState,
}

struct SessionEntry {
    fingerprints: Vec<String>,
    suspicion: f32,
    created_at: SystemTime,
    last_activity: SystemTime,
}

impl SessionEntry {
    fn view(&self, user_id: &str, thread_id: &str, state: SessionState) -> SessionView {
        SessionView {
            user_id: user_id.to_string(),
            thread_id: thread_id.to_string(),
            fingerprints: self.fingerprints.clone(),
            suspicion: self.suspicion,
            created_at: self.created_at,
            last_activity: self.last_activity,
            state,
        }
    }
}

/// Session tracker with bounded-lifetime state
///
/// The live map only ever holds active sessions, so `get` cannot observe an
/// expired or closed one. Mutation is serialized per key by the map lock;
/// each operation is a single atomic read-modify-write.
pub struct ConversationTracker {
    sessions: RwLock<HashMap<(String, String), SessionEntry>>,
    archive: Mutex<VecDeque<SessionView>>,
    archive_capacity: usize,
    idle_timeout: Duration,
}

impl ConversationTracker {
    /// Create a tracker with the given idle timeout
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            archive: Mutex::new(VecDeque::new()),
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
            idle_timeout,
        }
    }

    /// Override how many archived snapshots are retained
    pub fn with_archive_capacity(mut self, capacity: usize) -> Self {
        self.archive_capacity = capacity.max(1);
        self
    }

    /// Create-or-update the session for (user, thread)
    ///
    /// Appends the fingerprint (consecutive duplicates collapse), refreshes
    /// last-activity, and returns a snapshot.
    pub fn touch(&self, user_id: &str, thread_id: &str, fingerprint: &str) -> SessionView {
        self.touch_inner(user_id, thread_id, fingerprint, None)
    }

    /// `touch` that also raises the accumulated suspicion score
    ///
    /// The score only moves upward: the stored value becomes
    /// `max(current, suspicion)`, preserving monotonicity under any
    /// interleaving of concurrent calls.
    pub fn touch_scored(
        &self,
        user_id: &str,
        thread_id: &str,
        fingerprint: &str,
        suspicion: f32,
    ) -> SessionView {
        self.touch_inner(user_id, thread_id, fingerprint, Some(suspicion))
    }

    fn touch_inner(
        &self,
        user_id: &str,
        thread_id: &str,
        fingerprint: &str,
        suspicion: Option<f32>,
    ) -> SessionView {
        let now = SystemTime::now();
        let key = (user_id.to_string(), thread_id.to_string());

        let mut sessions = self.sessions.write();
        let entry = sessions.entry(key).or_insert_with(|| {
            debug!(user = user_id, thread = thread_id, "session created");
            SessionEntry {
                fingerprints: Vec::new(),
                suspicion: 0.0,
                created_at: now,
                last_activity: now,
            }
        });

        if entry.fingerprints.last().map(String::as_str) != Some(fingerprint) {
            entry.fingerprints.push(fingerprint.to_string());
        }
        if let Some(score) = suspicion {
            entry.suspicion = entry.suspicion.max(score.clamp(0.0, 1.0));
        }
        entry.last_activity = now;

        entry.view(user_id, thread_id, SessionState::Active)
    }

    /// Snapshot of the active session for (user, thread), if any
    ///
    /// A missing session is not an error; it is simply absent.
    pub fn get(&self, user_id: &str, thread_id: &str) -> Option<SessionView> {
        let sessions = self.sessions.read();
        sessions
            .get(&(user_id.to_string(), thread_id.to_string()))
            .map(|e| e.view(user_id, thread_id, SessionState::Active))
    }

    /// Close the session after a terminal verdict; returns its final snapshot
    pub fn close(&self, user_id: &str, thread_id: &str) -> Option<SessionView> {
        let key = (user_id.to_string(), thread_id.to_string());
        let entry = self.sessions.write().remove(&key)?;

        let view = entry.view(user_id, thread_id, SessionState::Closed);
        let mut archive = self.archive.lock();
        archive.push_back(view.clone());
        if archive.len() > self.archive_capacity {
            archive.pop_front();
        }
        debug!(user = user_id, thread = thread_id, "session closed");
        Some(view)
    }

    /// Evict sessions idle longer than the configured timeout
    ///
    /// Transitions are forward-only (`active -> expired`); a concurrent
    /// `touch` either lands before the sweep (refreshing last-activity) or
    /// after it (creating a fresh session). Returns the eviction count.
    pub fn sweep(&self) -> usize {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write();

        let expired_keys: Vec<(String, String)> = sessions
            .iter()
            .filter(|(_, e)| {
                now.duration_since(e.last_activity)
                    .map_or(false, |idle| idle > self.idle_timeout)
            })
            .map(|(k, _)| k.clone())
            .collect();

        let mut archive = self.archive.lock();
        for key in &expired_keys {
            if let Some(entry) = sessions.remove(key) {
                archive.push_back(entry.view(&key.0, &key.1, SessionState::Expired));
            }
        }
        while archive.len() > self.archive_capacity {
            archive.pop_front();
        }

        if !expired_keys.is_empty() {
            info!(evicted = expired_keys.len(), "session sweep evicted idle sessions");
        }
        expired_keys.len()
    }

    /// Number of live sessions
    pub fn active_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Archived (expired or closed) session snapshots, oldest first
    ///
    /// Bounded by the archive capacity; the oldest snapshots are gone once
    /// the cap is reached.
    pub fn archived(&self) -> Vec<SessionView> {
        self.archive.lock().iter().cloned().collect()
    }
}

/// Run the eviction sweep on a fixed interval until the task is aborted
pub fn spawn_sweeper(
    tracker: Arc<ConversationTracker>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracker.sweep();
        }
    })
}
