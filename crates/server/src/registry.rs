//! Process-wide session registry
//!
//! A guarded map from call id to session, plus a periodic reaper for calls
//! whose carrier went away without a `stop`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use voicebot_pipeline::CallSession;

/// Registry of active call sessions, keyed by call id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<CallSession>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, session: Arc<CallSession>) {
        self.sessions
            .write()
            .insert(session.call_id.clone(), session);
    }

    /// Remove and close a session
    pub fn remove(&self, call_id: &str) -> Option<Arc<CallSession>> {
        let session = self.sessions.write().remove(call_id);
        if let Some(ref session) = session {
            session.close();
        }
        session
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.read().get(call_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Drop sessions idle past `idle_timeout`
    pub fn reap_idle(&self, idle_timeout: Duration) -> usize {
        let idle: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.idle_for() > idle_timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for call_id in &idle {
            if let Some(session) = self.remove(call_id) {
                session.close();
                tracing::info!(call_id = %call_id, "Reaped idle session");
            }
        }
        idle.len()
    }

    /// Start the periodic idle-reap task; the returned sender stops it
    pub fn start_reaper(
        self: &Arc<Self>,
        idle_timeout: Duration,
        interval: Duration,
    ) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reaped = registry.reap_idle(idle_timeout);
                        if reaped > 0 {
                            tracing::info!(reaped, remaining = registry.count(), "Session reap pass");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicebot_core::SampleRate;

    #[test]
    fn test_insert_get_remove() {
        let registry = SessionRegistry::new();
        let session = Arc::new(CallSession::new("CA1", SampleRate::Hz8000));

        registry.insert(session.clone());
        assert_eq!(registry.count(), 1);
        assert!(registry.get("CA1").is_some());

        let removed = registry.remove("CA1").unwrap();
        assert!(!removed.is_active());
        assert!(registry.get("CA1").is_none());
    }

    #[test]
    fn test_reap_idle_only() {
        let registry = SessionRegistry::new();
        registry.insert(Arc::new(CallSession::new("CA1", SampleRate::Hz8000)));

        // Fresh session survives a zero-tolerance pass only if it has activity
        assert_eq!(registry.reap_idle(Duration::from_secs(60)), 0);
        assert_eq!(registry.count(), 1);

        assert_eq!(registry.reap_idle(Duration::from_nanos(0)), 1);
        assert_eq!(registry.count(), 0);
    }
}
