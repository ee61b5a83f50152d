use async_trait::async_trait;
use facetscope::config::ExplorerConfig;
use facetscope::fetch::{FetchError, Transport};
use facetscope::registry::ExplorerKind;
use facetscope::view::Panel;
use facetscope::Explorer;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use url::Url;

/// Each URL blocks until the test releases it.
#[derive(Default)]
struct GatedTransport {
    gates: Mutex<HashMap<String, oneshot::Receiver<Value>>>,
}

impl GatedTransport {
    fn gate(&self, url: &Url) -> oneshot::Sender<Value> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(url.to_string(), rx);
        tx
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
        let gate = self.gates.lock().unwrap().remove(url.as_str());
        match gate {
            Some(rx) => rx.await.map_err(|_| FetchError::network("gate dropped")),
            None => Err(FetchError::http(404)),
        }
    }
}

fn events_explorer() -> (Explorer, Arc<GatedTransport>) {
    let transport = Arc::new(GatedTransport::default());
    let config = ExplorerConfig { api_base: "http://localhost/api".to_string(), ..Default::default() };
    let explorer = Explorer::new(ExplorerKind::Events, &config, transport.clone()).unwrap();
    (explorer, transport)
}

fn titles(panel: &Panel<Vec<facetscope::records::Record>>) -> Vec<String> {
    panel
        .ready()
        .map(|rs| rs.iter().filter_map(|r| r.title().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn late_page_one_never_replaces_page_two() {
    let (mut explorer, transport) = events_explorer();

    let page1 = transport.gate(&explorer.record_url());
    let first = tokio::spawn(explorer.fetch_records());

    explorer.next_page();
    assert_eq!(explorer.pagination().page(), 2);
    let page2 = transport.gate(&explorer.record_url());
    let second = tokio::spawn(explorer.fetch_records());

    page2.send(json!([{"id": "2", "title": "Page Two"}])).unwrap();
    second.await.unwrap().unwrap();
    page1.send(json!([{"id": "1", "title": "Page One"}])).unwrap();
    first.await.unwrap().unwrap();

    assert_eq!(titles(&explorer.records_view()), vec!["Page Two"]);

    // the superseded page was still cached for a later visit
    explorer.prev_page();
    assert_eq!(titles(&explorer.records_view()), vec!["Page One"]);
}

#[tokio::test]
async fn late_page_one_while_page_two_in_flight_keeps_loading() {
    let (mut explorer, transport) = events_explorer();

    let page1 = transport.gate(&explorer.record_url());
    let first = tokio::spawn(explorer.fetch_records());

    explorer.next_page();
    let page2 = transport.gate(&explorer.record_url());
    let second = tokio::spawn(explorer.fetch_records());

    page1.send(json!([{"id": "1", "title": "Page One"}])).unwrap();
    first.await.unwrap().unwrap();
    assert_eq!(explorer.records_view(), Panel::Loading);

    page2.send(json!([{"id": "2", "title": "Page Two"}])).unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(titles(&explorer.records_view()), vec!["Page Two"]);
}

#[tokio::test]
async fn superseded_failure_is_retried_on_return() {
    let (mut explorer, transport) = events_explorer();

    let page1 = transport.gate(&explorer.record_url());
    let first = tokio::spawn(explorer.fetch_records());
    explorer.next_page();
    let page2 = transport.gate(&explorer.record_url());
    let second = tokio::spawn(explorer.fetch_records());

    drop(page1);
    first.await.unwrap().unwrap();
    page2.send(json!([])).unwrap();
    second.await.unwrap().unwrap();
    assert!(matches!(explorer.records_view(), Panel::Empty { .. }));

    explorer.prev_page();
    assert_eq!(explorer.records_view(), Panel::Loading);
    let retry = transport.gate(&explorer.record_url());
    let pending = tokio::spawn(explorer.fetch_records());
    retry.send(json!([{"id": "1", "title": "Page One"}])).unwrap();
    pending.await.unwrap().unwrap();
    assert_eq!(titles(&explorer.records_view()), vec!["Page One"]);
}
