//! Read-through response cache.
//!
//! Read responses are kept per request key until a mutation clears the whole
//! cache or, when a TTL is configured, until they grow older than it.

use crate::model::{FieldCell, SheetInfo};
use crate::store::RawRow;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    SheetInfo(SheetInfo),
    Rows(Vec<RawRow>),
    Fields(Vec<FieldCell>),
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, (Instant, CacheEntry)>>,
    enabled: bool,
    /// Maximum entry age; `None` keeps entries until the next mutation.
    max_age: Option<Duration>,
}

impl ResponseCache {
    pub fn new(enabled: bool, max_age: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            enabled,
            max_age,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, None)
    }

    pub fn sheet_info_key(sheet_id: &str) -> String {
        format!("sheet_info_{}", sheet_id)
    }

    pub fn rows_key(worksheet_id: &str, query: &str, options: &str) -> String {
        format!("{}_{}_{}", worksheet_id, query, options)
    }

    pub fn fields_key(worksheet_id: &str) -> String {
        format!("query_fields_{}", worksheet_id)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, (Instant, CacheEntry)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.entries();
        let expired = match (entries.get(key), self.max_age) {
            (None, _) => return None,
            (Some((stored, _)), Some(max_age)) => stored.elapsed() > max_age,
            (Some(_), None) => false,
        };
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|(_, entry)| entry.clone())
    }

    pub fn put(&self, key: String, entry: CacheEntry) {
        if self.enabled {
            self.entries().insert(key, (Instant::now(), entry));
        }
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(true, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> CacheEntry {
        CacheEntry::Fields(vec![FieldCell {
            id: "R1C1".into(),
            updated: None,
            cell: "a".into(),
            col: 1,
        }])
    }

    #[test]
    fn keys_follow_request_shape() {
        assert_eq!(ResponseCache::sheet_info_key("s"), "sheet_info_s");
        assert_eq!(ResponseCache::rows_key("w", "a = 1", "&reverse=true"), "w_a = 1_&reverse=true");
        assert_eq!(ResponseCache::fields_key("w"), "query_fields_w");
    }

    #[test]
    fn stores_until_cleared() {
        let cache = ResponseCache::default();
        cache.put(ResponseCache::fields_key("w"), fields());
        assert_eq!(cache.get("query_fields_w"), Some(fields()));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("query_fields_w"), None);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = ResponseCache::new(true, Some(Duration::ZERO));
        cache.put("k".into(), fields());
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn disabled_cache_keeps_nothing() {
        let cache = ResponseCache::disabled();
        cache.put("k".into(), fields());
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }
}
