use serde::Serialize;
use url::Url;

use crate::filter::{is_constraint, FilterState};
use crate::pagination::Pagination;
use crate::registry::{DatasetDescriptor, Translation};

pub const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const MONTH_NUMBERS: [&str; 12] = ["01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12"];

/// Two-digit number for a canonical English month name (case-insensitive).
pub fn month_number(name: &str) -> Option<&'static str> {
    let name = name.trim();
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| MONTH_NUMBERS[i])
}

/// Unrecognized values pass through unchanged.
pub fn translate(translation: Translation, value: &str) -> String {
    match translation {
        Translation::MonthNumber => month_number(value)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
    }
}

/// Ordered request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.0.push((key.to_string(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Percent-encoded `k=v&...`
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }

    /// `base` + `endpoint` path segments + these parameters.
    pub fn to_url(&self, base: &Url, endpoint: &str) -> Url {
        let mut url = base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(endpoint.split('/').filter(|s| !s.is_empty()));
        }
        url.set_query(None);
        if !self.is_empty() {
            url.query_pairs_mut().extend_pairs(self.iter());
        }
        url
    }
}

/// Record-page parameters: `limit`, then `page`/`offset` per the dataset's
/// convention, then every active relevant filter in declared order.
pub fn encode(filters: &FilterState, pagination: &Pagination, dataset: &DatasetDescriptor) -> QueryParams {
    let mut params = QueryParams::new();
    params.push("limit", pagination.limit().to_string());
    if dataset.page_style.sends_page() {
        params.push("page", pagination.page().to_string());
    }
    if dataset.page_style.sends_offset() {
        params.push("offset", pagination.offset().to_string());
    }
    push_filters(&mut params, filters, dataset);
    params
}

/// Filter parameters only, for count and analytics endpoints.
pub fn encode_filters(filters: &FilterState, dataset: &DatasetDescriptor) -> QueryParams {
    let mut params = QueryParams::new();
    push_filters(&mut params, filters, dataset);
    params
}

fn push_filters(params: &mut QueryParams, filters: &FilterState, dataset: &DatasetDescriptor) {
    for key in dataset.relevant_filter_keys {
        let raw = filters.get(key);
        if !is_constraint(raw) {
            continue;
        }
        let value = match dataset.translation_for(key) {
            Some(t) => translate(t, raw),
            None => raw.to_string(),
        };
        params.push(key, value);
    }
}
