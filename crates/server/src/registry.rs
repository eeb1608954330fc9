//! Active session registry
//!
//! Explicit per-process bookkeeping of live media streams and call status
//! callbacks. Instantiated per `AppState` rather than held in a global so
//! tests run against isolated registries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

/// One live media stream
#[derive(Debug, Clone)]
pub struct ActiveCall {
    pub stream_sid: String,
    pub call_sid: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Registry of active streams and last-known call statuses
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: RwLock<HashMap<String, ActiveCall>>,
    statuses: RwLock<HashMap<String, String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream once the provider's `start` event arrives
    pub fn insert(&self, stream_sid: String, call_sid: Option<String>) {
        let call = ActiveCall {
            stream_sid: stream_sid.clone(),
            call_sid,
            started_at: Utc::now(),
        };
        info!(stream_sid = %call.stream_sid, call_sid = ?call.call_sid, "Stream registered");
        self.active.write().insert(stream_sid, call);
        metrics::gauge!("bridge_active_sessions").set(self.count() as f64);
    }

    /// Remove a stream; safe to call after it was already removed
    pub fn remove(&self, stream_sid: &str) {
        if self.active.write().remove(stream_sid).is_some() {
            debug!(stream_sid, "Stream unregistered");
        }
        metrics::gauge!("bridge_active_sessions").set(self.count() as f64);
    }

    pub fn get(&self, stream_sid: &str) -> Option<ActiveCall> {
        self.active.read().get(stream_sid).cloned()
    }

    pub fn count(&self) -> usize {
        self.active.read().len()
    }

    /// Record a provider status callback for a call
    pub fn update_call_status(&self, call_sid: String, status: String) {
        debug!(call_sid = %call_sid, status = %status, "Call status updated");
        self.statuses.write().insert(call_sid, status);
    }

    pub fn call_status(&self, call_sid: &str) -> Option<String> {
        self.statuses.read().get(call_sid).cloned()
    }

    /// Register a stream and tie its removal to the returned guard
    pub fn register(self: &Arc<Self>, stream_sid: String, call_sid: Option<String>) -> SessionGuard {
        self.insert(stream_sid.clone(), call_sid);
        SessionGuard {
            registry: Arc::clone(self),
            stream_sid,
        }
    }
}

/// Removes the registration when dropped, so cleanup runs on every exit
/// path of the session task, early returns and panics included
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    stream_sid: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.stream_sid);
    }
}
