/// Time-bounded deduplication cache for failed documents
///
/// Documents that fail with a recoverable error are remembered here for
/// a configured number of minutes so the next polling cycles skip them
/// instead of hammering the portal with the same doomed request.
///
/// The cache is owned by the orchestration loop and only touched from its
/// task: workers hand back lists of failed ids and the loop applies them
/// after every worker has joined. There is no internal locking.
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Document id -> expiry instant
#[derive(Debug, Clone)]
pub struct TtlCache {
    entries: HashMap<String, DateTime<Utc>>,
    ttl: Duration,
}

impl TtlCache {
    /// Create a cache whose entries live for `ttl_minutes`
    pub fn new(ttl_minutes: u64) -> Self {
        let minutes = ttl_minutes.min(u64::from(u32::MAX)) as i64;
        Self {
            entries: HashMap::new(),
            ttl: Duration::minutes(minutes),
        }
    }

    /// Configured entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mark every id as cached until now + ttl
    pub fn insert_range<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_range_at(ids, Utc::now());
    }

    /// Mark every id as cached until `now` + ttl. Re-inserting an id
    /// replaces its expiry.
    pub fn insert_range_at<I, S>(&mut self, ids: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expires_at = now + self.ttl;
        for id in ids {
            self.entries.insert(id.into(), expires_at);
        }
    }

    /// Check membership, evicting the entry if it has expired
    pub fn contains(&mut self, id: &str) -> bool {
        self.contains_at(id, Utc::now())
    }

    /// Check membership as of `now`, evicting the entry if it has expired
    pub fn contains_at(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        match self.entries.get(id) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                debug!("Cache entry expired: {}", id);
                self.entries.remove(id);
                false
            }
            None => false,
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn remove_expired(&mut self) -> usize {
        self.remove_expired_at(Utc::now())
    }

    /// Drop every entry expired as of `now`
    pub fn remove_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before - self.entries.len()
    }

    /// Number of stored entries (expired ones included until swept)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_until_ttl_elapses() {
        let mut cache = TtlCache::new(10);
        let t0 = Utc::now();

        cache.insert_range_at(["doc-1", "doc-2"], t0);

        assert!(cache.contains_at("doc-1", t0));
        assert!(cache.contains_at("doc-2", t0 + Duration::minutes(9)));
        assert!(!cache.contains_at("doc-1", t0 + Duration::minutes(10)));
        assert!(!cache.contains_at("doc-3", t0));
    }

    #[test]
    fn test_expired_lookup_evicts_entry() {
        let mut cache = TtlCache::new(1);
        let t0 = Utc::now();

        cache.insert_range_at(["doc-1"], t0);
        assert_eq!(cache.len(), 1);

        assert!(!cache.contains_at("doc-1", t0 + Duration::minutes(2)));
        assert_eq!(cache.len(), 0);

        // Not resurrected by a later lookup with an earlier clock
        assert!(!cache.contains_at("doc-1", t0));
    }

    #[test]
    fn test_reinsert_keeps_latest_expiry() {
        let mut cache = TtlCache::new(5);
        let t0 = Utc::now();

        cache.insert_range_at(["doc-1"], t0);
        cache.insert_range_at(["doc-1"], t0 + Duration::minutes(4));

        assert_eq!(cache.len(), 1);
        assert!(cache.contains_at("doc-1", t0 + Duration::minutes(8)));
        assert!(!cache.contains_at("doc-1", t0 + Duration::minutes(9)));
    }

    #[test]
    fn test_remove_expired_counts_only_live_entries() {
        let mut cache = TtlCache::new(30);
        let t0 = Utc::now();

        cache.insert_range_at(["old-1", "old-2"], t0);
        cache.insert_range_at(["new-1"], t0 + Duration::minutes(20));

        let removed = cache.remove_expired_at(t0 + Duration::minutes(31));

        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_at("new-1", t0 + Duration::minutes(31)));
    }

    #[test]
    fn test_empty_insert_is_noop() {
        let mut cache = TtlCache::new(5);
        cache.insert_range(Vec::<String>::new());
        assert!(cache.is_empty());
        assert_eq!(cache.ttl(), Duration::minutes(5));
    }
}
