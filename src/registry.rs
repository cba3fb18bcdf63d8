use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::Method;

/// Live mapping from request id to its cancellation token.
#[derive(Debug, Default)]
pub(crate) struct InFlightRegistry {
    entries: Mutex<HashMap<String, CancellationToken>>,
    sequence: AtomicU64,
}

impl InFlightRegistry {
    /// Registers a new attempt. The entry is removed when the guard drops.
    pub(crate) fn register(self: &Arc<Self>, method: Method, path: &str) -> InFlightGuard {
        let submitted_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("{method}-{path}-{submitted_ms}-{sequence}");
        let token = CancellationToken::new();

        self.entries.lock().insert(id.clone(), token.clone());

        InFlightGuard {
            registry: Arc::clone(self),
            id,
            token,
        }
    }

    /// Cancels and removes every entry, returning how many were cancelled.
    pub(crate) fn cancel_all(&self) -> usize {
        let drained: Vec<(String, CancellationToken)> = self.entries.lock().drain().collect();
        for (id, token) in &drained {
            tracing::debug!(request_id = %id, "cancelling in-flight request");
            token.cancel();
        }
        drained.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn remove(&self, id: &str) {
        self.entries.lock().remove(id);
    }
}

/// Registry entry for one attempt; deregisters on drop.
pub(crate) struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    id: String,
    token: CancellationToken,
}

impl InFlightGuard {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::InFlightRegistry;
    use crate::Method;

    #[test]
    fn guard_drop_deregisters() {
        let registry = Arc::new(InFlightRegistry::default());
        let guard = registry.register(Method::Get, "/health");
        assert_eq!(registry.len(), 1);
        assert!(guard.id().starts_with("GET-/health-"));

        drop(guard);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn identical_calls_get_distinct_ids() {
        let registry = Arc::new(InFlightRegistry::default());
        let first = registry.register(Method::Get, "/same");
        let second = registry.register(Method::Get, "/same");

        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn cancel_all_signals_and_empties() {
        let registry = Arc::new(InFlightRegistry::default());
        let first = registry.register(Method::Get, "/a");
        let second = registry.register(Method::Post, "/b");

        assert_eq!(registry.cancel_all(), 2);
        assert_eq!(registry.len(), 0);
        assert!(first.token().is_cancelled());
        assert!(second.token().is_cancelled());

        // Dropping guards after a bulk cancel is a no-op.
        drop(first);
        drop(second);
        assert_eq!(registry.len(), 0);
    }
}
