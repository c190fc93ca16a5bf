//! Bounded in-memory log of outbound HTTP requests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct HttpLogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub attempt: u32,
    pub cached: bool,
    pub error: Option<String>,
}

impl HttpLogEntry {
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status.is_some_and(|s| s >= 400)
    }
}

/// Fields supplied by the caller; id and timestamp are assigned on record
#[derive(Debug, Clone, Default)]
pub struct NewHttpLogEntry {
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub attempt: u32,
    pub cached: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct HttpLogStats {
    pub total: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub rate_limited: u64,
    pub average_duration_ms: f64,
}

#[derive(Clone)]
pub struct HttpLogStore {
    entries: Arc<Mutex<VecDeque<HttpLogEntry>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl HttpLogStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity,
        }
    }

    pub fn record(&self, entry: NewHttpLogEntry) -> HttpLogEntry {
        let entry = HttpLogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            method: entry.method,
            url: redact_url(&entry.url),
            status: entry.status,
            duration_ms: entry.duration_ms,
            attempt: entry.attempt,
            cached: entry.cached,
            error: entry.error,
        };

        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        entry
    }

    /// Newest first
    pub fn list(&self, limit: usize, errors_only: bool) -> Vec<HttpLogEntry> {
        self.lock()
            .iter()
            .rev()
            .filter(|e| !errors_only || e.is_error())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn stats(&self) -> HttpLogStats {
        let entries = self.lock();
        let total = entries.len() as u64;
        let total_duration: u64 = entries.iter().map(|e| e.duration_ms).sum();
        HttpLogStats {
            total,
            errors: entries.iter().filter(|e| e.is_error()).count() as u64,
            cache_hits: entries.iter().filter(|e| e.cached).count() as u64,
            rate_limited: entries.iter().filter(|e| e.status == Some(429)).count() as u64,
            average_duration_ms: if total == 0 {
                0.0
            } else {
                total_duration as f64 / total as f64
            },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<HttpLogEntry>> {
        // A poisoned log is still a usable log.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

const SECRET_PARAMS: &[&str] = &["token", "token_auth", "api_key", "apikey", "access_token"];

/// Replace secret query parameter values so they never reach the log
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    if url.query().is_none() {
        return raw.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str()) {
                "REDACTED".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: Option<u16>, duration_ms: u64, cached: bool) -> NewHttpLogEntry {
        NewHttpLogEntry {
            method: "GET".to_string(),
            url: "https://analytics.example.com/events/counts".to_string(),
            status,
            duration_ms,
            attempt: 1,
            cached,
            error: None,
        }
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let store = HttpLogStore::new(3);
        for i in 0..5 {
            store.record(entry(Some(200), i, false));
        }
        let listed = store.list(10, false);
        assert_eq!(listed.len(), 3);
        assert_eq!(listed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![5, 4, 3]);
    }

    #[test]
    fn test_list_errors_only_and_limit() {
        let store = HttpLogStore::new(10);
        store.record(entry(Some(200), 10, false));
        store.record(entry(Some(503), 10, false));
        store.record(NewHttpLogEntry {
            error: Some("timeout".to_string()),
            ..entry(None, 30_000, false)
        });
        store.record(entry(Some(429), 5, false));

        assert_eq!(store.list(10, true).len(), 3);
        assert_eq!(store.list(1, false)[0].status, Some(429));
    }

    #[test]
    fn test_stats() {
        let store = HttpLogStore::new(10);
        store.record(entry(Some(200), 100, false));
        store.record(entry(Some(200), 0, true));
        store.record(entry(Some(429), 50, false));

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.rate_limited, 1);
        assert!((stats.average_duration_ms - 50.0).abs() < f64::EPSILON);

        assert_eq!(store.clear(), 3);
        assert_eq!(store.stats(), HttpLogStats::default());
    }

    #[test]
    fn test_redact_url_hides_tokens() {
        let redacted = redact_url("https://a.example.com/api?module=API&token_auth=abc123&site_id=1");
        assert!(!redacted.contains("abc123"));
        assert!(redacted.contains("token_auth=REDACTED"));
        assert!(redacted.contains("site_id=1"));
        assert_eq!(redact_url("not a url"), "not a url");
    }
}
