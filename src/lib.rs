//! Faceted, paginated browsing of remote tabular datasets: filter and page
//! state, canonical request keys, stale-response suppression, and client-side
//! grouping for charts.

pub mod aggregate;
pub mod config;
pub mod explorer;
pub mod fetch;
pub mod filter;
pub mod logging;
pub mod options;
pub mod pagination;
pub mod query;
pub mod records;
pub mod registry;
pub mod view;

pub use explorer::Explorer;
