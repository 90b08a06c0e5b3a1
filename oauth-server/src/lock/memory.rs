use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Process-local locks. Correct only when a single server instance is running.
#[derive(Clone, Default)]
pub struct InMemoryLocks {
    held: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl InMemoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match held.get(key) {
            Some((_, deadline)) if *deadline > now => false,
            _ => {
                held.insert(key.to_string(), (token.to_string(), now + ttl));
                true
            }
        }
    }

    pub(super) fn release(&self, key: &str, token: &str) {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if held.get(key).is_some_and(|(owner, _)| owner == token) {
            held.remove(key);
        }
    }
}
