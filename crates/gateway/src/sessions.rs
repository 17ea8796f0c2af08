//! Conversation sessions — bounded message windows with LRU eviction.
//!
//! Sessions are in-memory only; checkpointed workflow state survives
//! eviction (it lives in the checkpoint store) and can be resumed by key.
//! The per-session turn lock serializes chat turns; the store's map lock
//! is only ever held for map bookkeeping, never across I/O.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use ward_domain::tool::Message;
use ward_domain::trace::TraceEvent;

struct SessionEntry {
    messages: Vec<Message>,
    workflow_runs: HashMap<String, String>,
    turn_lock: Arc<tokio::sync::Mutex<()>>,
    last_used: DateTime<Utc>,
}

impl SessionEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            messages: Vec::new(),
            workflow_runs: HashMap::new(),
            turn_lock: Arc::new(tokio::sync::Mutex::new(())),
            last_used: now,
        }
    }
}

pub struct ConversationStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    window_size: usize,
    lru_capacity: usize,
}

impl ConversationStore {
    pub fn new(window_size: usize, lru_capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            window_size: window_size.max(1),
            lru_capacity: lru_capacity.max(1),
        }
    }

    /// Look up (or create) a session and return its id plus the turn lock.
    pub fn resolve_or_create(&self, session_id: Option<&str>) -> (String, Arc<tokio::sync::Mutex<()>>) {
        let id = session_id
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let entry = sessions.entry(id.clone()).or_insert_with(|| SessionEntry::new(now));
        entry.last_used = now;
        let lock = entry.turn_lock.clone();
        drop(sessions);
        self.evict_over_capacity();
        (id, lock)
    }

    /// Append a message, trimming the window from the front.
    pub fn append(&self, session_id: &str, message: Message) {
        let mut sessions = self.sessions.lock();
        let entry = sessions
            .entry(session_id.to_owned())
            .or_insert_with(|| SessionEntry::new(Utc::now()));
        entry.messages.push(message);
        let overflow = entry.messages.len().saturating_sub(self.window_size);
        if overflow > 0 {
            entry.messages.drain(..overflow);
        }
        entry.last_used = Utc::now();
    }

    /// The retained message window, oldest first.
    pub fn window(&self, session_id: &str) -> Vec<Message> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|e| e.messages.clone())
            .unwrap_or_default()
    }

    /// Remember the active run for a workflow kind in this session.
    pub fn set_workflow_run(&self, session_id: &str, kind: &str, run_id: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry
                .workflow_runs
                .insert(kind.to_owned(), run_id.to_owned());
        }
    }

    pub fn workflow_run(&self, session_id: &str, kind: &str) -> Option<String> {
        self.sessions
            .lock()
            .get(session_id)
            .and_then(|e| e.workflow_runs.get(kind).cloned())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Drop least-recently-used sessions beyond capacity. Sessions with a
    /// held turn lock are mid-turn and are skipped this round.
    pub fn evict_over_capacity(&self) {
        let mut sessions = self.sessions.lock();
        while sessions.len() > self.lru_capacity {
            let victim = sessions
                .iter()
                .filter(|(_, e)| e.turn_lock.try_lock().is_ok())
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| id.clone());
            let Some(id) = victim else { break };
            sessions.remove(&id);
            TraceEvent::SessionEvicted { session_id: id }.emit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_trims_oldest_messages() {
        let store = ConversationStore::new(3, 100);
        let (id, _) = store.resolve_or_create(None);
        for i in 0..5 {
            store.append(&id, Message::user(format!("m{i}")));
        }
        let window = store.window(&id);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].content, "m2");
        assert_eq!(window[2].content, "m4");
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let store = ConversationStore::new(8, 2);
        let (a, _) = store.resolve_or_create(Some("a"));
        let (b, _) = store.resolve_or_create(Some("b"));
        store.append(&a, Message::user("keep a fresh"));
        let (_c, _) = store.resolve_or_create(Some("c"));

        assert_eq!(store.session_count(), 2);
        // b was the stalest.
        assert!(store.window(&b).is_empty());
        assert_eq!(store.window(&a).len(), 1);
    }

    #[test]
    fn workflow_run_pointers_round_trip() {
        let store = ConversationStore::new(8, 10);
        let (id, _) = store.resolve_or_create(Some("s1"));
        store.set_workflow_run(&id, "admission", "run-1");
        assert_eq!(
            store.workflow_run(&id, "admission").as_deref(),
            Some("run-1")
        );
        assert!(store.workflow_run(&id, "clinical_decision").is_none());
    }

    #[tokio::test]
    async fn sessions_mid_turn_survive_eviction() {
        let store = ConversationStore::new(8, 1);
        let (a, lock_a) = store.resolve_or_create(Some("a"));
        let _held = lock_a.lock().await;
        let (_b, _) = store.resolve_or_create(Some("b"));

        // "a" holds its turn lock, so eviction passes over it and the
        // newcomer is the victim instead.
        store.append(&a, Message::user("still here"));
        assert_eq!(store.window(&a).len(), 1);
    }
}
