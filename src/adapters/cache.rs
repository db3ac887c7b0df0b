//! Read-model cache for computed views (analytics, portfolio, credit score).

use moka::sync::Cache;
use serde_json::Value;
use std::time::Duration;

const PING_KEY: &str = "__health_ping__";

pub struct ResponseCache {
    cache: Option<Cache<String, Value>>,
}

impl ResponseCache {
    pub fn new(enabled: bool, max_entries: u64, ttl: Duration) -> Self {
        let cache = enabled.then(|| {
            Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build()
        });
        Self { cache }
    }

    pub fn disabled() -> Self {
        Self { cache: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.cache.as_ref()?.get(key)
    }

    pub fn insert(&self, key: String, value: Value) {
        if let Some(cache) = &self.cache {
            cache.insert(key, value);
        }
    }

    /// Any write to the database can change every derived view.
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    /// Insert-then-read round trip used by the health endpoint.
    pub fn ping(&self) -> bool {
        match &self.cache {
            Some(cache) => {
                cache.insert(PING_KEY.to_string(), Value::Bool(true));
                let ok = cache.get(PING_KEY) == Some(Value::Bool(true));
                cache.invalidate(PING_KEY);
                ok
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_and_invalidate() {
        let cache = ResponseCache::new(true, 10, Duration::from_secs(60));
        cache.insert("analytics:g1".to_string(), serde_json::json!({"members": 3}));
        assert_eq!(
            cache.get("analytics:g1"),
            Some(serde_json::json!({"members": 3}))
        );

        cache.invalidate_all();
        assert!(cache.get("analytics:g1").is_none());
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache = ResponseCache::disabled();
        cache.insert("k".to_string(), Value::Null);
        assert!(cache.get("k").is_none());
        assert!(!cache.ping());
    }

    #[test]
    fn test_ping_succeeds_when_enabled() {
        let cache = ResponseCache::new(true, 10, Duration::from_secs(60));
        assert!(cache.ping());
    }
}
