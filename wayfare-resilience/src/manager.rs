use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::breaker::{BreakerSettings, BreakerStats, CircuitBreaker};

/// Name-keyed registry of breakers. Lookups take the read lock; only the
/// first registration of a name takes the write lock.
#[derive(Default)]
pub struct BreakerManager {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

static GLOBAL: OnceLock<BreakerManager> = OnceLock::new();

impl BreakerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static BreakerManager {
        GLOBAL.get_or_init(BreakerManager::new)
    }

    /// Existing breaker for `name`, or a new one built from `settings`.
    pub fn get_or_create(&self, name: &str, settings: BreakerSettings) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        let mut breakers = self.breakers.write().unwrap_or_else(|p| p.into_inner());
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, settings)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    pub fn stats(&self, name: &str) -> Option<BreakerStats> {
        self.get(name).map(|b| b.stats())
    }

    /// Stats for every registered breaker, sorted by name.
    pub fn all_stats(&self) -> Vec<BreakerStats> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        let mut stats: Vec<BreakerStats> = breakers.iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(b) => {
                b.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        for b in breakers {
            b.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;

    #[test]
    fn test_same_name_same_breaker() {
        let manager = BreakerManager::new();
        let a = manager.get_or_create("vendor", BreakerSettings::default());
        let b = manager.get_or_create("vendor", BreakerSettings::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(manager.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_reset_all() {
        let manager = BreakerManager::new();
        let db = manager.get_or_create("db", BreakerSettings::default());
        manager.get_or_create("cache", BreakerSettings::default());
        for _ in 0..5 {
            let _ = db
                .call(async { Err::<(), _>(wayfare_shared::AppError::timeout("slow")) })
                .await;
        }
        assert_eq!(db.state(), CircuitState::Open);

        manager.reset_all();
        let stats = manager.all_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "cache");
        assert!(stats.iter().all(|s| s.state == CircuitState::Closed));
        assert!(!manager.reset("missing"));
    }
}
