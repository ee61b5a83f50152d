//! Grouped chart series.
//!
//! Server-computed analytics are authoritative. The client-side grouping
//! here only runs when a dataset has no analytics endpoint or the payload
//! lacks the requested series; it only sees the current page, so it
//! under-counts on large result sets.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::fetch::FetchError;
use crate::query::MONTHS;
use crate::records::{split_list, EventDate, Record};

/// Catch-all bucket for missing keys and the long tail past top-N.
pub const OTHER: &str = "Other";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub name: String,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(name: &str, value: f64) -> Self {
        Self { name: name.to_string(), value }
    }
}

/// How a record maps to its group name.
#[derive(Clone, Copy)]
pub enum KeyRule {
    Field(&'static str),
    /// First entry of a comma-separated field ("Fintech, AI" → "Fintech").
    FirstListItem(&'static str),
    /// Calendar year of a date field.
    Year(&'static str),
    /// English month name of a date field.
    MonthName(&'static str),
    /// Size band of a numeric field.
    AmountBand(&'static str),
    Derived(fn(&Record) -> Option<String>),
}

impl KeyRule {
    pub fn extract(&self, record: &Record) -> Option<String> {
        match self {
            KeyRule::Field(f) => record.field_text(f),
            KeyRule::FirstListItem(f) => record
                .field_text(f)
                .and_then(|raw| split_list(&raw).into_iter().next()),
            KeyRule::Year(f) => match record.field_date(f) {
                EventDate::Scheduled(d) => Some(d.year().to_string()),
                EventDate::Unscheduled => None,
            },
            KeyRule::MonthName(f) => match record.field_date(f) {
                EventDate::Scheduled(d) => Some(MONTHS[d.month0() as usize].to_string()),
                EventDate::Unscheduled => None,
            },
            KeyRule::AmountBand(f) => record.field_number(f).map(amount_band),
            KeyRule::Derived(func) => func(record),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRule {
    /// One per record.
    Count,
    /// Sum of a numeric field; records without it add nothing.
    Sum(&'static str),
}

impl ValueRule {
    fn extract(&self, record: &Record) -> f64 {
        match self {
            ValueRule::Count => 1.0,
            ValueRule::Sum(f) => record.field_number(f).unwrap_or(0.0),
        }
    }
}

#[derive(Clone, Copy)]
pub struct GroupSpec {
    pub key: KeyRule,
    pub value: ValueRule,
    pub top_n: usize,
}

pub fn amount_band(amount: f64) -> String {
    let band = if amount < 1e6 {
        "< $1M"
    } else if amount < 1e7 {
        "$1M - $10M"
    } else if amount < 5e7 {
        "$10M - $50M"
    } else if amount < 1e8 {
        "$50M - $100M"
    } else {
        "$100M+"
    };
    band.to_string()
}

/// Missing, blank and placeholder keys all land in "Other".
pub fn normalize_key(raw: Option<String>) -> String {
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("null") | Some("undefined") => OTHER.to_string(),
        Some(k) => k.to_string(),
    }
}

/// Group, accumulate, sort descending (name ascending on ties) and cap at
/// `top_n` entries. When capping, the first `top_n - 1` named groups are
/// kept and everything else folds into "Other", so totals are conserved.
pub fn aggregate(records: &[Record], spec: &GroupSpec) -> Vec<SeriesPoint> {
    if spec.top_n == 0 {
        return Vec::new();
    }
    let mut groups: HashMap<String, f64> = HashMap::new();
    for record in records {
        let name = normalize_key(spec.key.extract(record));
        *groups.entry(name).or_insert(0.0) += spec.value.extract(record);
    }

    let mut points: Vec<SeriesPoint> = groups
        .into_iter()
        .map(|(name, value)| SeriesPoint { name, value })
        .collect();
    sort_desc(&mut points);

    if points.len() <= spec.top_n {
        return points;
    }

    let mut kept = Vec::with_capacity(spec.top_n);
    let mut overflow = 0.0;
    for p in points {
        if p.name != OTHER && kept.len() < spec.top_n - 1 {
            kept.push(p);
        } else {
            overflow += p.value;
        }
    }
    kept.push(SeriesPoint::new(OTHER, overflow));
    sort_desc(&mut kept);
    kept
}

fn sort_desc(points: &mut [SeriesPoint]) {
    points.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
}

// =============================================================================
// Series selection
// =============================================================================

/// A chart a view can ask for. Always passed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSelector {
    Industries,
    Countries,
    RoundTypes,
    FundingByYear,
    AmountBands,
    InvestorTypes,
    EventTypes,
    EventLocations,
    EventMonths,
}

pub const ALL_SERIES: [SeriesSelector; 9] = [
    SeriesSelector::Industries,
    SeriesSelector::Countries,
    SeriesSelector::RoundTypes,
    SeriesSelector::FundingByYear,
    SeriesSelector::AmountBands,
    SeriesSelector::InvestorTypes,
    SeriesSelector::EventTypes,
    SeriesSelector::EventLocations,
    SeriesSelector::EventMonths,
];

impl SeriesSelector {
    /// Field name in the analytics payload.
    pub fn analytics_field(&self) -> &'static str {
        match self {
            SeriesSelector::Industries => "industries",
            SeriesSelector::Countries => "countries",
            SeriesSelector::RoundTypes => "roundTypes",
            SeriesSelector::FundingByYear => "fundingByYear",
            SeriesSelector::AmountBands => "amountBands",
            SeriesSelector::InvestorTypes => "investorTypes",
            SeriesSelector::EventTypes => "eventTypes",
            SeriesSelector::EventLocations => "locations",
            SeriesSelector::EventMonths => "months",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        ALL_SERIES
            .iter()
            .copied()
            .find(|s| s.analytics_field() == raw || format!("{:?}", s).eq_ignore_ascii_case(raw))
    }

    /// Client-side grouping used when the server has no such series.
    pub fn fallback_rule(&self, top_n: usize) -> GroupSpec {
        let (key, value) = match self {
            SeriesSelector::Industries => (KeyRule::FirstListItem("industry"), ValueRule::Count),
            SeriesSelector::Countries => (KeyRule::Field("country"), ValueRule::Count),
            SeriesSelector::RoundTypes => (KeyRule::Field("roundType"), ValueRule::Count),
            SeriesSelector::FundingByYear => (KeyRule::Year("announcedDate"), ValueRule::Sum("amount")),
            SeriesSelector::AmountBands => (KeyRule::AmountBand("amount"), ValueRule::Count),
            SeriesSelector::InvestorTypes => (KeyRule::Field("investorType"), ValueRule::Count),
            SeriesSelector::EventTypes => (KeyRule::Field("eventType"), ValueRule::Count),
            SeriesSelector::EventLocations => (KeyRule::Field("location"), ValueRule::Count),
            SeriesSelector::EventMonths => (KeyRule::MonthName("startDate"), ValueRule::Count),
        };
        GroupSpec { key, value, top_n }
    }
}

/// Named series from an analytics endpoint. Fields that are not arrays of
/// `{ name, value }` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsPayload {
    series: BTreeMap<String, Vec<SeriesPoint>>,
}

impl AnalyticsPayload {
    pub fn from_json(body: Value) -> Result<Self, FetchError> {
        let Value::Object(map) = body else {
            return Err(FetchError::decode("analytics payload is not an object"));
        };
        let mut series = BTreeMap::new();
        for (name, value) in map {
            if let Ok(points) = serde_json::from_value::<Vec<SeriesPoint>>(value) {
                series.insert(name, points);
            }
        }
        Ok(Self { series })
    }

    pub fn get(&self, selector: SeriesSelector) -> Option<&[SeriesPoint]> {
        self.series.get(selector.analytics_field()).map(Vec::as_slice)
    }

    pub fn names(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSource {
    Server,
    ClientFallback,
    /// Placeholder, never real data.
    Demo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub selector: SeriesSelector,
    pub source: SeriesSource,
    pub points: Vec<SeriesPoint>,
}

impl ChartSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Server series verbatim when present, otherwise client grouping of
/// `records`. An empty result stays empty unless `demo` is set.
pub fn resolve_series(
    selector: SeriesSelector,
    analytics: Option<&AnalyticsPayload>,
    records: &[Record],
    top_n: usize,
    demo: bool,
) -> ChartSeries {
    let (source, points) = match analytics.and_then(|a| a.get(selector)) {
        Some(points) => (SeriesSource::Server, points.to_vec()),
        None => (
            SeriesSource::ClientFallback,
            aggregate(records, &selector.fallback_rule(top_n)),
        ),
    };
    if points.is_empty() && demo {
        return ChartSeries { selector, source: SeriesSource::Demo, points: demo_series(selector) };
    }
    ChartSeries { selector, source, points }
}

/// Fixed placeholder points, labeled so they cannot pass for data.
pub fn demo_series(selector: SeriesSelector) -> Vec<SeriesPoint> {
    let names: &[&str] = match selector {
        SeriesSelector::Industries => &["Fintech", "Healthtech", "AI"],
        SeriesSelector::Countries | SeriesSelector::EventLocations => &["United States", "Germany", "India"],
        SeriesSelector::RoundTypes => &["Seed", "Series A", "Series B"],
        SeriesSelector::FundingByYear => &["2022", "2023", "2024"],
        SeriesSelector::AmountBands => &["< $1M", "$1M - $10M", "$10M - $50M"],
        SeriesSelector::InvestorTypes => &["Venture Capital", "Angel", "Corporate"],
        SeriesSelector::EventTypes => &["Conference", "Meetup", "Hackathon"],
        SeriesSelector::EventMonths => &["January", "February", "March"],
    };
    names
        .iter()
        .zip([30.0, 20.0, 10.0])
        .map(|(n, v)| SeriesPoint::new(&format!("{} (demo)", n), v))
        .collect()
}
