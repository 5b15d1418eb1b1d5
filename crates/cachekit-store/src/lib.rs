//! # CacheKit Store
//!
//! Named, versioned response stores for the CacheKit offline proxy.
//!
//! ## Features
//!
//! - **ResponseStore**: request identity → captured response
//! - **StoreRegistry**: named stores, one current per version tag
//! - **Generation eviction**: `purge_except()` sweeps stale versions
//! - **Query-insensitive lookup**: fallback matching that ignores `?...`
//!
//! ## Architecture
//!
//! ```text
//! StoreRegistry
//!     ├── "offline-cache-v1"  (stale, removed at activation)
//!     └── "offline-cache-v2"  (current)
//!             └── "GET https://host/path" → StoredResponse
//! ```
//!
//! Only GET responses are ever stored or matched; writes past the capacity
//! quota fail with a typed error that callers treat as a cache miss.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

/// Default per-store entry quota.
pub const DEFAULT_CAPACITY: usize = 512;

// ==================== Errors ====================

/// Errors that can occur on store writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Only idempotent GET responses are cacheable.
    #[error("Cannot store {0} response, only GET is cacheable")]
    UnsupportedMethod(String),

    /// The store reached its entry quota.
    #[error("Store '{store}' is full ({capacity} entries)")]
    QuotaExceeded { store: String, capacity: usize },
}

// ==================== Stored Response ====================

/// A captured response, keyed by the request that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Request URL (fragment stripped).
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Stored-at timestamp (ms since epoch).
    pub stored_at: u64,
}

impl StoredResponse {
    /// Capture a GET response for the given URL.
    pub fn get(url: &str, status: u16, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self {
            url: strip_fragment(url).to_string(),
            method: "GET".to_string(),
            status,
            headers,
            body,
            stored_at: now_millis(),
        }
    }

    /// Check if the captured status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Request identity used as the store key.
fn request_key(method: &str, url: &str) -> String {
    format!("{} {}", method, strip_fragment(url))
}

/// Drop the fragment portion of a URL string.
fn strip_fragment(url: &str) -> &str {
    url.split('#').next().unwrap_or(url)
}

/// Drop the query and fragment portions of a URL string.
fn strip_query(url: &str) -> &str {
    let url = strip_fragment(url);
    url.split('?').next().unwrap_or(url)
}

// ==================== Response Store ====================

/// A single named store of captured responses.
#[derive(Debug, Clone)]
pub struct ResponseStore {
    /// Store name (version-tagged).
    name: String,

    /// Entry quota.
    capacity: usize,

    /// Captured entries by request identity.
    entries: HashMap<String, StoredResponse>,
}

impl ResponseStore {
    /// Create a new store with the default quota.
    pub fn new(name: &str) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    /// Create a new store with an explicit quota.
    pub fn with_capacity(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a captured response under its request identity.
    ///
    /// Overwriting an existing entry is always allowed (last writer wins);
    /// inserting a new entry past the quota fails.
    pub fn put(&mut self, entry: StoredResponse) -> Result<(), StoreError> {
        if entry.method != "GET" {
            return Err(StoreError::UnsupportedMethod(entry.method.clone()));
        }

        let key = request_key(&entry.method, &entry.url);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            return Err(StoreError::QuotaExceeded {
                store: self.name.clone(),
                capacity: self.capacity,
            });
        }

        trace!(store = %self.name, key = %key, "Storing response");
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Exact (query-sensitive) GET lookup.
    pub fn get(&self, url: &str) -> Option<&StoredResponse> {
        self.entries.get(&request_key("GET", url))
    }

    /// Query-insensitive GET lookup.
    ///
    /// An exact hit wins; otherwise the first entry whose query-stripped URL
    /// equals the query-stripped probe is returned.
    pub fn match_ignore_query(&self, url: &str) -> Option<&StoredResponse> {
        if let Some(entry) = self.get(url) {
            return Some(entry);
        }

        let probe = strip_query(url);
        self.entries
            .values()
            .find(|entry| strip_query(&entry.url) == probe)
    }

    /// Delete an entry by URL.
    pub fn delete(&mut self, url: &str) -> bool {
        self.entries.remove(&request_key("GET", url)).is_some()
    }

    /// All stored request URLs.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.values().map(|e| e.url.as_str()).collect()
    }
}

// ==================== Store Registry ====================

/// All named stores; exactly one is current per version tag.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: HashMap<String, ResponseStore>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store (creating it if absent).
    pub fn open(&mut self, name: &str) -> &mut ResponseStore {
        self.stores
            .entry(name.to_string())
            .or_insert_with(|| ResponseStore::new(name))
    }

    /// Check if a store exists.
    pub fn has(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Borrow a store without creating it.
    pub fn store(&self, name: &str) -> Option<&ResponseStore> {
        self.stores.get(name)
    }

    /// Delete a store.
    pub fn delete(&mut self, name: &str) -> bool {
        self.stores.remove(name).is_some()
    }

    /// All store names.
    pub fn names(&self) -> Vec<&str> {
        self.stores.keys().map(|s| s.as_str()).collect()
    }

    /// Generation eviction: delete every store except `current`.
    ///
    /// Returns the names of the deleted stores.
    pub fn purge_except(&mut self, current: &str) -> Vec<String> {
        let stale: Vec<String> = self
            .stores
            .keys()
            .filter(|name| name.as_str() != current)
            .cloned()
            .collect();

        for name in &stale {
            self.stores.remove(name);
            debug!(store = %name, "Purged stale store");
        }

        stale
    }
}
