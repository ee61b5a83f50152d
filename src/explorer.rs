//! One explorer view: a tab list, its filters and paging, and the
//! independent record / count / analytics fetches they drive.
//!
//! State changes are synchronous and cheap. Fetches go through the shared
//! coordinator and return `'static` futures, so a caller may hold several in
//! flight while it keeps mutating the explorer; whichever key the explorer
//! points at when a panel is read is the one that renders.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use url::Url;

use crate::aggregate::{resolve_series, AnalyticsPayload, ChartSeries, SeriesSelector, SeriesSource};
use crate::config::ExplorerConfig;
use crate::fetch::{FetchCoordinator, FetchError, FetchState, Transport};
use crate::filter::FilterState;
use crate::logging::{
    log, log_fallback_aggregation, log_query_encoded, log_state_transition, obj, v_str, Domain, Level,
};
use crate::options::{OptionCache, OptionEntry};
use crate::pagination::Pagination;
use crate::query::{encode, encode_filters, QueryKey, QueryParams};
use crate::records::{decode_count, decode_page, Record};
use crate::registry::{datasets_for, lookup, DatasetDescriptor, ExplorerKind};
use crate::view::Panel;

pub struct Explorer {
    kind: ExplorerKind,
    dataset: &'static DatasetDescriptor,
    filters: FilterState,
    pagination: Pagination,
    coordinator: FetchCoordinator,
    options: OptionCache,
    base: Url,
    top_n: usize,
    demo: bool,
}

impl Explorer {
    pub fn new(kind: ExplorerKind, config: &ExplorerConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let base = config.base_url()?;
        let dataset = kind.default_dataset();
        log(
            Level::Info,
            Domain::State,
            "explorer_ready",
            obj(&[
                ("explorer", v_str(kind.as_str())),
                ("dataset", v_str(dataset.id)),
                ("api_base", v_str(base.as_str())),
            ]),
        );
        Ok(Self {
            kind,
            dataset,
            filters: FilterState::new(),
            pagination: Pagination::new(config.page_limit),
            coordinator: FetchCoordinator::new(transport.clone()),
            options: OptionCache::new(transport, base.clone(), config.options_ttl_secs),
            base,
            top_n: config.top_n,
            demo: config.demo_series,
        })
    }

    pub fn kind(&self) -> ExplorerKind {
        self.kind
    }

    pub fn dataset(&self) -> &'static DatasetDescriptor {
        self.dataset
    }

    pub fn tabs(&self) -> Vec<&'static DatasetDescriptor> {
        datasets_for(self.kind).collect()
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    /// Switch tabs. The page goes back to 1 and filters the new tab does not
    /// consume are reset, so they cannot resurface on a later switch.
    pub fn select_dataset(&mut self, id: &str) -> Result<()> {
        let dataset = lookup(id).ok_or_else(|| anyhow!("unknown dataset {:?}", id))?;
        if dataset.explorer != self.kind {
            return Err(anyhow!(
                "dataset {:?} belongs to the {} explorer, not {}",
                id,
                dataset.explorer.as_str(),
                self.kind.as_str()
            ));
        }
        if dataset.id == self.dataset.id {
            return Ok(());
        }
        self.dataset = dataset;
        self.filters = self.filters.retain_keys(dataset.relevant_filter_keys);
        self.pagination = self.pagination.reset();
        log_state_transition(dataset.id, "select_dataset", self.pagination.page());
        Ok(())
    }

    /// Returns whether anything changed. A changed value sends the view
    /// back to page 1; re-selecting the current value, or clearing a key
    /// that was never set, keeps the page.
    pub fn set_filter(&mut self, key: &str, value: &str) -> bool {
        let next = self.filters.set(key, value);
        if next == self.filters {
            return false;
        }
        self.filters = next;
        self.pagination = self.pagination.reset();
        log_state_transition(self.dataset.id, &format!("filter:{}", key), self.pagination.page());
        true
    }

    pub fn clear_filters(&mut self) {
        if self.filters.active_keys().is_empty() {
            return;
        }
        self.filters = FilterState::new();
        self.pagination = self.pagination.reset();
        log_state_transition(self.dataset.id, "clear_filters", self.pagination.page());
    }

    /// Pages below 1 clamp to 1.
    pub fn go_to_page(&mut self, page: i64) {
        self.pagination = self.pagination.go_to(page);
        log_state_transition(self.dataset.id, "go_to_page", self.pagination.page());
    }

    /// Stays put once the known total says there is nothing further.
    pub fn next_page(&mut self) {
        if let Some(count) = self.count() {
            if !self.pagination.has_next(count) {
                return;
            }
        }
        self.pagination = self.pagination.next();
        log_state_transition(self.dataset.id, "next_page", self.pagination.page());
    }

    pub fn prev_page(&mut self) {
        self.pagination = self.pagination.prev();
        log_state_transition(self.dataset.id, "prev_page", self.pagination.page());
    }

    pub fn set_limit(&mut self, limit: u32) {
        self.pagination = self.pagination.with_limit(limit);
        log_state_transition(self.dataset.id, "set_limit", self.pagination.page());
    }

    // =========================================================================
    // Keys and parameters
    // =========================================================================

    pub fn record_key(&self) -> QueryKey {
        QueryKey::records(self.dataset, &self.pagination, &self.filters)
    }

    pub fn count_key(&self) -> QueryKey {
        QueryKey::count(self.dataset, &self.filters)
    }

    pub fn analytics_key(&self) -> Option<QueryKey> {
        QueryKey::analytics(self.dataset, &self.filters)
    }

    pub fn record_params(&self) -> QueryParams {
        encode(&self.filters, &self.pagination, self.dataset)
    }

    pub fn filter_params(&self) -> QueryParams {
        encode_filters(&self.filters, self.dataset)
    }

    pub fn record_url(&self) -> Url {
        self.record_params().to_url(&self.base, self.dataset.record_endpoint)
    }

    // =========================================================================
    // Fetching
    // =========================================================================

    fn encoded(&self, key: &QueryKey, params: &QueryParams) {
        log_query_encoded(self.dataset.id, key.role.as_str(), &key.fingerprint(), &params.to_query_string());
    }

    pub fn fetch_records(&self) -> impl Future<Output = Result<FetchState<Value>>> + Send + 'static {
        let (key, params) = (self.record_key(), self.record_params());
        self.encoded(&key, &params);
        let url = params.to_url(&self.base, self.dataset.record_endpoint);
        self.coordinator.fetch(key, url)
    }

    pub fn fetch_count(&self) -> impl Future<Output = Result<FetchState<Value>>> + Send + 'static {
        let (key, params) = (self.count_key(), self.filter_params());
        self.encoded(&key, &params);
        let url = params.to_url(&self.base, self.dataset.count_endpoint);
        self.coordinator.fetch(key, url)
    }

    /// Resolves to `None` for datasets without an analytics endpoint.
    pub fn fetch_analytics(&self) -> impl Future<Output = Result<Option<FetchState<Value>>>> + Send + 'static {
        let pending = self.analytics_key().map(|key| {
            let params = self.filter_params();
            self.encoded(&key, &params);
            let url = params.to_url(&self.base, &key.endpoint);
            self.coordinator.fetch(key, url)
        });
        async move {
            match pending {
                Some(fut) => fut.await.map(Some),
                None => Ok(None),
            }
        }
    }

    /// Records, count and analytics for the current state, concurrently.
    pub async fn refresh(&self) -> Result<()> {
        let (records, count, analytics) =
            tokio::join!(self.fetch_records(), self.fetch_count(), self.fetch_analytics());
        records?;
        count?;
        analytics?;
        Ok(())
    }

    /// Drop cached results for the current keys so the next refresh goes
    /// back to the network.
    pub fn invalidate(&self) -> Result<()> {
        self.coordinator.invalidate(&self.record_key())?;
        self.coordinator.invalidate(&self.count_key())?;
        if let Some(key) = self.analytics_key() {
            self.coordinator.invalidate(&key)?;
        }
        Ok(())
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn records_state(&self) -> FetchState<Vec<Record>> {
        let kind = self.dataset.record_kind;
        self.coordinator
            .state(&self.record_key())
            .and_then_decode(|body| decode_page(kind, body))
    }

    pub fn records_view(&self) -> Panel<Vec<Record>> {
        Panel::from_state(self.records_state(), &format!("No {} found", self.dataset.label.to_lowercase()))
    }

    pub fn count_view(&self) -> Panel<u64> {
        let state = self
            .coordinator
            .state(&self.count_key())
            .and_then_decode(|body| decode_count(&body));
        Panel::from_state(state, "")
    }

    /// Known total for the current filters, if the count has arrived.
    pub fn count(&self) -> Option<u64> {
        self.count_view().ready().copied()
    }

    pub fn total_pages(&self) -> Option<u64> {
        self.count().map(|c| self.pagination.total_pages(c))
    }

    pub fn analytics(&self) -> Option<AnalyticsPayload> {
        let key = self.analytics_key()?;
        self.coordinator
            .state(&key)
            .and_then_decode(AnalyticsPayload::from_json)
            .data()
            .cloned()
    }

    /// Series for an explicitly chosen chart: the server's when the
    /// analytics payload carries it, otherwise grouped from the current
    /// record page. `None` for a chart the current tab does not offer.
    pub fn chart_series(&self, selector: SeriesSelector) -> Option<ChartSeries> {
        if !self.dataset.offers(selector) {
            return None;
        }
        let analytics = self.analytics();
        let records = self.records_state().data().cloned().unwrap_or_default();
        let series = resolve_series(selector, analytics.as_ref(), &records, self.top_n, self.demo);
        if series.source == SeriesSource::ClientFallback {
            log_fallback_aggregation(self.dataset.id, selector.analytics_field(), records.len(), series.points.len());
        }
        Some(series)
    }

    /// Chart panel. Without server data the chart waits on, and fails with,
    /// the record page it is grouped from.
    pub fn chart_view(&self, selector: SeriesSelector) -> Panel<ChartSeries> {
        if !self.dataset.offers(selector) {
            return Panel::Empty {
                message: format!("{} has no {} chart", self.dataset.label, selector.analytics_field()),
            };
        }
        let has_server_series = self
            .analytics()
            .map(|a| a.get(selector).is_some())
            .unwrap_or(false);
        let state = if has_server_series {
            FetchState::Success(())
        } else {
            match self.records_state() {
                FetchState::Idle => FetchState::Idle,
                FetchState::Loading => FetchState::Loading,
                FetchState::Failed(e) => FetchState::Failed(e),
                FetchState::Success(_) => FetchState::Success(()),
            }
        };
        Panel::from_state(
            state.and_then_decode(|_| {
                self.chart_series(selector)
                    .ok_or_else(|| FetchError::request("chart not offered"))
            }),
            "No data to chart",
        )
    }

    // =========================================================================
    // Filter options
    // =========================================================================

    pub async fn options(&self, key: &str) -> Result<Vec<OptionEntry>, FetchError> {
        self.options.fetch_options(self.dataset.id, key).await
    }

    pub async fn all_options(&self) -> BTreeMap<&'static str, Result<Vec<OptionEntry>, FetchError>> {
        self.options.fetch_all(self.dataset.id).await
    }

    /// Snapshot for logs and the CLI.
    pub fn describe(&self) -> Value {
        json!({
            "explorer": self.kind.as_str(),
            "dataset": self.dataset.id,
            "page": self.pagination.page(),
            "limit": self.pagination.limit(),
            "filters": self.filters,
            "records": self.records_view().label(),
            "count": self.count(),
        })
    }
}
