use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use url::Url;

use super::{FetchError, FetchState, Transport};
use crate::logging::{log_cache, log_fetch_issued, log_fetch_resolved, log_stale_discarded};
use crate::query::{QueryKey, SlotId};

/// Proof that the holder issued the live request for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: QueryKey,
    generation: u64,
}

impl Ticket {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Begin {
    /// A result for this key is already cached.
    Cached(Value),
    /// An equal request is in flight; its result will land in the cache.
    Coalesced,
    /// The caller must perform the request and hand the result to `complete`.
    Issued(Ticket),
}

#[derive(Debug, Clone)]
struct Entry {
    state: FetchState<Value>,
    generation: u64,
}

#[derive(Default)]
struct Table {
    entries: HashMap<QueryKey, Entry>,
    /// Key each slot currently displays.
    slots: HashMap<SlotId, QueryKey>,
    next_generation: u64,
}

/// Owns request state for every key a view has asked for.
///
/// Cloning shares the table, so in-flight futures can outlive the borrow of
/// the view that issued them.
#[derive(Clone)]
pub struct FetchCoordinator {
    transport: Arc<dyn Transport>,
    table: Arc<Mutex<Table>>,
}

impl FetchCoordinator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport, table: Arc::new(Mutex::new(Table::default())) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Table>> {
        self.table.lock().map_err(|_| anyhow!("fetch table lock poisoned"))
    }

    /// Point the key's slot at it and decide whether a request is needed.
    pub fn begin(&self, key: &QueryKey) -> Result<Begin> {
        let mut table = self.lock()?;
        table.slots.insert(key.slot(), key.clone());

        match table.entries.get(key).map(|e| &e.state) {
            Some(FetchState::Success(v)) => {
                let v = v.clone();
                log_cache("hit", &key.dataset, &key.fingerprint());
                return Ok(Begin::Cached(v));
            }
            Some(FetchState::Loading) => {
                log_cache("coalesced", &key.dataset, &key.fingerprint());
                return Ok(Begin::Coalesced);
            }
            _ => {}
        }

        table.next_generation += 1;
        let generation = table.next_generation;
        table
            .entries
            .insert(key.clone(), Entry { state: FetchState::Loading, generation });
        Ok(Begin::Issued(Ticket { key: key.clone(), generation }))
    }

    /// Record the outcome of an issued request. Returns whether the key is
    /// still the one its slot displays.
    ///
    /// A superseded key keeps a successful result in the cache so going back
    /// to it is instant; a superseded failure is dropped so going back
    /// retries.
    pub fn complete(&self, ticket: Ticket, result: Result<Value, FetchError>) -> Result<bool> {
        let mut table = self.lock()?;
        let key = ticket.key;
        let current = table.slots.get(&key.slot()).cloned();
        let is_current = current.as_ref() == Some(&key);

        let owns_entry = table
            .entries
            .get(&key)
            .map(|e| e.generation == ticket.generation)
            .unwrap_or(false);
        if !owns_entry {
            // invalidated and reissued meanwhile
            return Ok(is_current);
        }

        log_fetch_resolved(
            &key.dataset,
            key.role.as_str(),
            &key.fingerprint(),
            result.is_ok(),
            &result.as_ref().err().map(|e| e.msg.clone()).unwrap_or_default(),
        );

        match (result, is_current) {
            (Ok(v), _) => {
                table.entries.insert(key.clone(), Entry { state: FetchState::Success(v), generation: ticket.generation });
            }
            (Err(e), true) => {
                table.entries.insert(key.clone(), Entry { state: FetchState::Failed(e), generation: ticket.generation });
            }
            (Err(_), false) => {
                table.entries.remove(&key);
            }
        }
        if !is_current {
            let current = current.map(|k| k.fingerprint()).unwrap_or_default();
            log_stale_discarded(&key.dataset, key.role.as_str(), &key.fingerprint(), &current);
        }
        Ok(is_current)
    }

    /// State of one key.
    pub fn state(&self, key: &QueryKey) -> FetchState<Value> {
        match self.lock() {
            Ok(table) => table
                .entries
                .get(key)
                .map(|e| e.state.clone())
                .unwrap_or(FetchState::Idle),
            Err(e) => FetchState::Failed(FetchError::request(&e.to_string())),
        }
    }

    /// State of whatever key the slot currently points at.
    pub fn current(&self, slot: &SlotId) -> FetchState<Value> {
        let key = match self.lock() {
            Ok(table) => table.slots.get(slot).cloned(),
            Err(e) => return FetchState::Failed(FetchError::request(&e.to_string())),
        };
        key.map(|k| self.state(&k)).unwrap_or(FetchState::Idle)
    }

    pub fn current_key(&self, slot: &SlotId) -> Option<QueryKey> {
        self.lock().ok().and_then(|t| t.slots.get(slot).cloned())
    }

    /// Forget a key so the next fetch goes to the network again. An
    /// in-flight request for it will no longer be able to store its result.
    pub fn invalidate(&self, key: &QueryKey) -> Result<()> {
        let mut table = self.lock()?;
        if table.entries.remove(key).is_some() {
            log_cache("invalidated", &key.dataset, &key.fingerprint());
        }
        Ok(())
    }

    /// Begin immediately, then resolve in the returned future.
    ///
    /// The slot is repointed before this returns, so call order decides
    /// supersession regardless of when the futures are polled.
    pub fn fetch(&self, key: QueryKey, url: Url) -> impl Future<Output = Result<FetchState<Value>>> + Send + 'static {
        let begun = self.begin(&key);
        let this = self.clone();
        async move {
            match begun? {
                Begin::Cached(v) => Ok(FetchState::Success(v)),
                Begin::Coalesced => Ok(FetchState::Loading),
                Begin::Issued(ticket) => {
                    log_fetch_issued(&key.dataset, key.role.as_str(), &key.fingerprint(), url.as_str());
                    let result = this.transport.get_json(&url).await;
                    this.complete(ticket, result)?;
                    Ok(this.state(&key))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryTransport;
    use crate::filter::FilterState;
    use crate::pagination::Pagination;
    use crate::registry::lookup;
    use serde_json::json;

    fn key_for_page(page: i64) -> QueryKey {
        let d = lookup("general_events").unwrap();
        QueryKey::records(d, &Pagination::new(20).go_to(page), &FilterState::new())
    }

    fn coordinator() -> FetchCoordinator {
        FetchCoordinator::new(Arc::new(MemoryTransport::new()))
    }

    #[test]
    fn test_stale_result_not_displayed() {
        let c = coordinator();
        let k1 = key_for_page(1);
        let k2 = key_for_page(2);
        let Begin::Issued(t1) = c.begin(&k1).unwrap() else { panic!("expected issue") };
        let Begin::Issued(t2) = c.begin(&k2).unwrap() else { panic!("expected issue") };

        assert!(c.complete(t2, Ok(json!(["page2"]))).unwrap());
        assert!(!c.complete(t1, Ok(json!(["page1"]))).unwrap());

        assert_eq!(c.current(&k2.slot()), FetchState::Success(json!(["page2"])));
        // cached for later, but not what the slot shows
        assert_eq!(c.state(&k1), FetchState::Success(json!(["page1"])));
    }

    #[test]
    fn test_stale_before_newer_resolves_keeps_loading() {
        let c = coordinator();
        let k1 = key_for_page(1);
        let k2 = key_for_page(2);
        let Begin::Issued(t1) = c.begin(&k1).unwrap() else { panic!() };
        let Begin::Issued(_t2) = c.begin(&k2).unwrap() else { panic!() };
        c.complete(t1, Ok(json!(["page1"]))).unwrap();
        assert_eq!(c.current(&k2.slot()), FetchState::Loading);
    }

    #[test]
    fn test_superseded_failure_dropped() {
        let c = coordinator();
        let k1 = key_for_page(1);
        let k2 = key_for_page(2);
        let Begin::Issued(t1) = c.begin(&k1).unwrap() else { panic!() };
        c.begin(&k2).unwrap();
        c.complete(t1, Err(FetchError::http(500))).unwrap();
        assert_eq!(c.state(&k1), FetchState::Idle);
    }

    #[test]
    fn test_duplicate_begin_coalesces_then_hits() {
        let c = coordinator();
        let k = key_for_page(1);
        let Begin::Issued(t) = c.begin(&k).unwrap() else { panic!() };
        assert_eq!(c.begin(&k).unwrap(), Begin::Coalesced);
        c.complete(t, Ok(json!([]))).unwrap();
        assert_eq!(c.begin(&k).unwrap(), Begin::Cached(json!([])));
    }

    #[test]
    fn test_failure_stays_failed_until_invalidated() {
        let c = coordinator();
        let k = key_for_page(1);
        let Begin::Issued(t) = c.begin(&k).unwrap() else { panic!() };
        c.complete(t, Err(FetchError::http(502))).unwrap();
        assert!(c.current(&k.slot()).error().is_some());
        c.invalidate(&k).unwrap();
        assert!(matches!(c.begin(&k).unwrap(), Begin::Issued(_)));
    }

    #[test]
    fn test_invalidated_inflight_cannot_store() {
        let c = coordinator();
        let k = key_for_page(1);
        let Begin::Issued(old) = c.begin(&k).unwrap() else { panic!() };
        c.invalidate(&k).unwrap();
        let Begin::Issued(fresh) = c.begin(&k).unwrap() else { panic!() };
        c.complete(old, Ok(json!(["old"]))).unwrap();
        assert_eq!(c.state(&k), FetchState::Loading);
        c.complete(fresh, Ok(json!(["new"]))).unwrap();
        assert_eq!(c.state(&k), FetchState::Success(json!(["new"])));
    }

    #[tokio::test]
    async fn test_fetch_hits_transport_once() {
        let transport = Arc::new(MemoryTransport::new().with_json("/api/events", json!([{"id": 1}])));
        let c = FetchCoordinator::new(transport.clone());
        let k = key_for_page(1);
        let url = Url::parse("http://localhost/api/events?limit=20").unwrap();
        let first = c.fetch(k.clone(), url.clone()).await.unwrap();
        let second = c.fetch(k, url).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.request_count("/api/events"), 1);
    }
}
