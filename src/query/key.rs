use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::filter::FilterState;
use crate::pagination::Pagination;
use crate::registry::{DatasetDescriptor, OptionEndpoint};

/// Which of a dataset's independent fetches a key belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRole {
    Records,
    Count,
    Analytics,
    Options(String),
}

impl QueryRole {
    pub fn as_str(&self) -> &str {
        match self {
            QueryRole::Records => "records",
            QueryRole::Count => "count",
            QueryRole::Analytics => "analytics",
            QueryRole::Options(key) => key.as_str(),
        }
    }
}

/// Supersession scope: a newer key in the same slot outranks an older one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SlotId {
    pub dataset: String,
    pub role: QueryRole,
}

/// Canonical identity of one logical request. Equal by value.
///
/// Only the dataset's relevant filters take part, in declared order, so a
/// change to a filter the dataset ignores never produces a new key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueryKey {
    pub endpoint: String,
    pub dataset: String,
    pub role: QueryRole,
    pub page: Option<u32>,
    pub filters: Vec<(String, String)>,
}

/// `(endpoint, dataset, page, relevant filter values in declared order)`
pub fn build_key(
    endpoint: &str,
    dataset_id: &str,
    page: u32,
    filters: &FilterState,
    relevant_keys: &[&str],
) -> QueryKey {
    QueryKey {
        endpoint: endpoint.to_string(),
        dataset: dataset_id.to_string(),
        role: QueryRole::Records,
        page: Some(page),
        filters: project(filters, relevant_keys),
    }
}

fn project(filters: &FilterState, keys: &[&str]) -> Vec<(String, String)> {
    keys.iter()
        .zip(filters.project(keys))
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

impl QueryKey {
    pub fn records(dataset: &DatasetDescriptor, pagination: &Pagination, filters: &FilterState) -> Self {
        build_key(
            dataset.record_endpoint,
            dataset.id,
            pagination.page(),
            filters,
            dataset.relevant_filter_keys,
        )
    }

    pub fn count(dataset: &DatasetDescriptor, filters: &FilterState) -> Self {
        Self {
            endpoint: dataset.count_endpoint.to_string(),
            dataset: dataset.id.to_string(),
            role: QueryRole::Count,
            page: None,
            filters: project(filters, dataset.relevant_filter_keys),
        }
    }

    pub fn analytics(dataset: &DatasetDescriptor, filters: &FilterState) -> Option<Self> {
        let endpoint = dataset.analytics_endpoint?;
        Some(Self {
            endpoint: endpoint.to_string(),
            dataset: dataset.id.to_string(),
            role: QueryRole::Analytics,
            page: None,
            filters: project(filters, dataset.relevant_filter_keys),
        })
    }

    /// Option keys never carry filters.
    pub fn options(dataset: &DatasetDescriptor, source: &OptionEndpoint) -> Self {
        Self {
            endpoint: source.path.to_string(),
            dataset: dataset.id.to_string(),
            role: QueryRole::Options(source.filter_key.to_string()),
            page: None,
            filters: Vec::new(),
        }
    }

    pub fn slot(&self) -> SlotId {
        SlotId { dataset: self.dataset.clone(), role: self.role.clone() }
    }

    /// Stable short digest for logs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.endpoint, self.dataset, self.role.as_str())?;
        match self.page {
            Some(p) => write!(f, "|p{}", p)?,
            None => write!(f, "|-")?,
        }
        for (k, v) in &self.filters {
            write!(f, "|{}={}", k, v)?;
        }
        Ok(())
    }
}
