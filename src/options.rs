//! Choices for filter controls.
//!
//! Option lists come from unfiltered endpoints so a menu never shrinks to
//! the current selection. They are fetched once per dataset and key, then
//! revalidated after a coarse TTL; a failed revalidation keeps serving the
//! last good list.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

use crate::fetch::{FetchError, Transport};
use crate::filter::ALL;
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::query::QueryParams;
use crate::registry::{lookup, DatasetDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl OptionEntry {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), count: None }
    }
}

/// Last good list, plus revalidation backoff after failures.
#[derive(Debug, Clone)]
struct CachedOptions {
    entries: Vec<OptionEntry>,
    fetched_at: Instant,
    failures: u32,
    last_failure: Option<Instant>,
}

impl CachedOptions {
    fn new(entries: Vec<OptionEntry>) -> Self {
        Self { entries, fetched_at: Instant::now(), failures: 0, last_failure: None }
    }

    fn is_fresh(&self, ttl_secs: u64) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(ttl_secs)
    }

    /// 2^failures seconds, capped at 300s
    fn backoff_secs(&self) -> u64 {
        2u64.saturating_pow(self.failures.min(8)).min(300)
    }

    fn can_revalidate(&self) -> bool {
        match self.last_failure {
            None => true,
            Some(last) => last.elapsed() >= Duration::from_secs(self.backoff_secs()),
        }
    }

    fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.last_failure = Some(Instant::now());
    }
}

type CacheKey = (&'static str, &'static str);

pub struct OptionCache {
    transport: Arc<dyn Transport>,
    base: Url,
    cache: Arc<Mutex<HashMap<CacheKey, CachedOptions>>>,
    ttl_secs: u64,
}

impl OptionCache {
    pub fn new(transport: Arc<dyn Transport>, base: Url, ttl_secs: u64) -> Self {
        Self {
            transport,
            base,
            cache: Arc::new(Mutex::new(HashMap::new())),
            ttl_secs,
        }
    }

    /// Options for one filter control. A key without an option endpoint
    /// has no choices.
    pub async fn fetch_options(&self, dataset_id: &str, filter_key: &str) -> Result<Vec<OptionEntry>, FetchError> {
        let dataset = lookup(dataset_id)
            .ok_or_else(|| FetchError::request(&format!("unknown dataset {}", dataset_id)))?;
        self.fetch_for(dataset, filter_key).await
    }

    /// Every option list a dataset declares, fetched concurrently.
    pub async fn fetch_all(&self, dataset_id: &str) -> BTreeMap<&'static str, Result<Vec<OptionEntry>, FetchError>> {
        let Some(dataset) = lookup(dataset_id) else {
            return BTreeMap::new();
        };
        let keys: Vec<&'static str> = dataset.option_endpoints.iter().map(|o| o.filter_key).collect();
        let results = join_all(keys.iter().map(|k| self.fetch_for(dataset, k))).await;
        keys.into_iter().zip(results).collect()
    }

    pub fn cached(&self, dataset_id: &str, filter_key: &str) -> Option<Vec<OptionEntry>> {
        let cache = self.cache.lock().ok()?;
        let found = cache
            .iter()
            .find(|((d, k), _)| *d == dataset_id && *k == filter_key)
            .map(|(_, c)| c.entries.clone());
        found
    }

    async fn fetch_for(&self, dataset: &'static DatasetDescriptor, filter_key: &str) -> Result<Vec<OptionEntry>, FetchError> {
        let Some(source) = dataset.option_endpoint(filter_key) else {
            return Ok(Vec::new());
        };
        let cache_key: CacheKey = (dataset.id, source.filter_key);

        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&cache_key) {
                if cached.is_fresh(self.ttl_secs) {
                    return Ok(cached.entries.clone());
                }
                if !cached.can_revalidate() {
                    log(
                        Level::Trace,
                        Domain::Options,
                        "backoff",
                        obj(&[
                            ("dataset", v_str(dataset.id)),
                            ("filter", v_str(source.filter_key)),
                            ("failures", json!(cached.failures)),
                        ]),
                    );
                    return Ok(cached.entries.clone());
                }
            }
        }

        // no filter parameters, ever
        let url = QueryParams::new().to_url(&self.base, source.path);
        let _scope = ProfileScope::with_context("options_fetch", &[("dataset", v_str(dataset.id))]);
        let fetched = self
            .transport
            .get_json(&url)
            .await
            .and_then(decode_options);

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| FetchError::request("option cache lock poisoned"))?;
        match fetched {
            Ok(entries) => {
                log(
                    Level::Debug,
                    Domain::Options,
                    "loaded",
                    obj(&[
                        ("dataset", v_str(dataset.id)),
                        ("filter", v_str(source.filter_key)),
                        ("entries", json!(entries.len())),
                    ]),
                );
                cache.insert(cache_key, CachedOptions::new(entries.clone()));
                Ok(entries)
            }
            Err(e) => {
                log(
                    Level::Warn,
                    Domain::Options,
                    "failed",
                    obj(&[
                        ("dataset", v_str(dataset.id)),
                        ("filter", v_str(source.filter_key)),
                        ("msg", v_str(&e.msg)),
                    ]),
                );
                match cache.get_mut(&cache_key) {
                    Some(stale) => {
                        stale.record_failure();
                        Ok(stale.entries.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }
}

/// Accepts `["a", "b"]`, `[{"name": "a", "count": 3}]`, or an object
/// wrapping either (`{"types": [...]}`). Blank names, the `"all"` sentinel
/// and duplicates are dropped; backend order is kept.
pub fn decode_options(body: Value) -> Result<Vec<OptionEntry>, FetchError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let preferred = ["types", "options", "locations", "data"]
                .iter()
                .find_map(|k| match map.get(*k) {
                    Some(Value::Array(_)) => Some(k.to_string()),
                    _ => None,
                })
                .or_else(|| map.iter().find(|(_, v)| v.is_array()).map(|(k, _)| k.clone()));
            match preferred.and_then(|k| map.remove(&k)) {
                Some(Value::Array(items)) => items,
                _ => return Err(FetchError::decode("option payload has no list")),
            }
        }
        _ => return Err(FetchError::decode("option payload is not a list")),
    };

    let mut seen = HashSet::new();
    let entries = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(OptionEntry::new(s.trim())),
            Value::Number(n) => Some(OptionEntry::new(&n.to_string())),
            Value::Object(m) => {
                let name = m.get("name").or_else(|| m.get("value")).and_then(Value::as_str)?;
                let count = m.get("count").and_then(Value::as_u64);
                Some(OptionEntry { name: name.trim().to_string(), count })
            }
            _ => None,
        })
        .filter(|e| !e.name.is_empty() && e.name != ALL)
        .filter(|e| seen.insert(e.name.clone()))
        .collect();
    Ok(entries)
}
