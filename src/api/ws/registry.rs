// src/api/ws/registry.rs
// Process-wide table of open channels per user

use std::collections::HashMap;

use parking_lot::RwLock;

/// user_id -> ids of that user's open connections. Grows on connect,
/// shrinks on disconnect.
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<String, Vec<String>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, user_id: &str, connection_id: &str) {
        self.inner
            .write()
            .entry(user_id.to_string())
            .or_default()
            .push(connection_id.to_string());
    }

    pub fn unregister(&self, user_id: &str, connection_id: &str) {
        let mut inner = self.inner.write();
        if let Some(connections) = inner.get_mut(user_id) {
            connections.retain(|id| id != connection_id);
            if connections.is_empty() {
                inner.remove(user_id);
            }
        }
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.inner.read().get(user_id).map(|c| c.len()).unwrap_or(0)
    }

    pub fn active_users(&self) -> usize {
        self.inner.read().len()
    }

    /// Drop everything. Integration suites call this between scenarios.
    pub fn reset(&self) {
        self.inner.write().clear();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_shrinks() {
        let registry = ConnectionRegistry::new();
        registry.register("u1", "c1");
        registry.register("u1", "c2");
        registry.register("u2", "c3");
        assert_eq!(registry.connection_count("u1"), 2);
        assert_eq!(registry.active_users(), 2);

        registry.unregister("u1", "c1");
        assert_eq!(registry.connection_count("u1"), 1);
        registry.unregister("u1", "c2");
        assert_eq!(registry.connection_count("u1"), 0);
        assert_eq!(registry.active_users(), 1);
    }

    #[test]
    fn reset_empties_the_table() {
        let registry = ConnectionRegistry::new();
        registry.register("u1", "c1");
        registry.reset();
        assert_eq!(registry.active_users(), 0);
    }
}
