//! Record shapes, one variant per dataset kind.
//!
//! Backends are loose about types (ids as numbers or strings, amounts as
//! `"$2.5M"`), so every typed field deserializes leniently and anything the
//! variant does not name is kept in `extra`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::fetch::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    FundingRound,
    Investor,
    Event,
    Ranking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRound {
    #[serde(default, deserialize_with = "de_text")]
    pub id: Option<String>,
    #[serde(default, alias = "company", deserialize_with = "de_text")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub round_type: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub amount: Option<f64>,
    #[serde(default, alias = "date", deserialize_with = "de_text")]
    pub announced_date: Option<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub investors: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investor {
    #[serde(default, deserialize_with = "de_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub name: Option<String>,
    #[serde(default, alias = "type", deserialize_with = "de_text")]
    pub investor_type: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub portfolio_size: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, deserialize_with = "de_text")]
    pub id: Option<String>,
    #[serde(default, alias = "name", deserialize_with = "de_text")]
    pub title: Option<String>,
    #[serde(default, alias = "type", deserialize_with = "de_text")]
    pub event_type: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub location: Option<String>,
    #[serde(default, alias = "date", deserialize_with = "de_text")]
    pub start_date: Option<String>,
    #[serde(default, alias = "link", deserialize_with = "de_text")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    #[serde(default, deserialize_with = "de_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub rank: Option<f64>,
    #[serde(default, deserialize_with = "de_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    FundingRound(FundingRound),
    Investor(Investor),
    Event(Event),
    Ranking(Ranking),
}

impl Record {
    /// Mongo-style `_id` stands in for `id` when `id` is absent; when both
    /// are present `id` wins and `_id` stays in `extra`.
    pub fn decode(kind: RecordKind, mut value: Value) -> Result<Self, serde_json::Error> {
        if let Value::Object(map) = &mut value {
            if !map.contains_key("id") {
                if let Some(mongo_id) = map.remove("_id") {
                    map.insert("id".to_string(), mongo_id);
                }
            }
        }
        Ok(match kind {
            RecordKind::FundingRound => Record::FundingRound(serde_json::from_value(value)?),
            RecordKind::Investor => Record::Investor(serde_json::from_value(value)?),
            RecordKind::Event => Record::Event(serde_json::from_value(value)?),
            RecordKind::Ranking => Record::Ranking(serde_json::from_value(value)?),
        })
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::FundingRound(_) => RecordKind::FundingRound,
            Record::Investor(_) => RecordKind::Investor,
            Record::Event(_) => RecordKind::Event,
            Record::Ranking(_) => RecordKind::Ranking,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Record::FundingRound(r) => r.id.as_deref(),
            Record::Investor(r) => r.id.as_deref(),
            Record::Event(r) => r.id.as_deref(),
            Record::Ranking(r) => r.id.as_deref(),
        }
    }

    /// Display name used by tables and charts.
    pub fn title(&self) -> Option<&str> {
        match self {
            Record::FundingRound(r) => r.company_name.as_deref(),
            Record::Investor(r) => r.name.as_deref(),
            Record::Event(r) => r.title.as_deref(),
            Record::Ranking(r) => r.name.as_deref(),
        }
    }

    /// Field by wire name. Typed fields first, then whatever the backend
    /// sent that the variant does not model.
    pub fn field(&self, name: &str) -> Option<Value> {
        let typed = match (self, name) {
            (_, "id") => self.id().map(text),
            (Record::FundingRound(r), "companyName") => r.company_name.as_deref().map(text),
            (Record::FundingRound(r), "industry") => r.industry.as_deref().map(text),
            (Record::FundingRound(r), "country") => r.country.as_deref().map(text),
            (Record::FundingRound(r), "roundType") => r.round_type.as_deref().map(text),
            (Record::FundingRound(r), "amount") => r.amount.map(number),
            (Record::FundingRound(r), "announcedDate") => r.announced_date.as_deref().map(text),
            (Record::FundingRound(r), "investors") if !r.investors.is_empty() => {
                Some(text(&r.investors.join(", ")))
            }
            (Record::Investor(r), "name") => r.name.as_deref().map(text),
            (Record::Investor(r), "investorType") => r.investor_type.as_deref().map(text),
            (Record::Investor(r), "country") => r.country.as_deref().map(text),
            (Record::Investor(r), "portfolioSize") => r.portfolio_size.map(number),
            (Record::Event(r), "title") => r.title.as_deref().map(text),
            (Record::Event(r), "eventType") => r.event_type.as_deref().map(text),
            (Record::Event(r), "location") => r.location.as_deref().map(text),
            (Record::Event(r), "startDate") => r.start_date.as_deref().map(text),
            (Record::Event(r), "url") => r.url.as_deref().map(text),
            (Record::Ranking(r), "rank") => r.rank.map(number),
            (Record::Ranking(r), "name") => r.name.as_deref().map(text),
            (Record::Ranking(r), "country") => r.country.as_deref().map(text),
            (Record::Ranking(r), "industry") => r.industry.as_deref().map(text),
            (Record::Ranking(r), "score") => r.score.map(number),
            _ => None,
        };
        typed.or_else(|| self.extra().get(name).filter(|v| !v.is_null()).cloned())
    }

    /// Field rendered as text, `None` for missing or null.
    pub fn field_text(&self, name: &str) -> Option<String> {
        match self.field(name)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Field as a number; numeric strings are parsed leniently.
    pub fn field_number(&self, name: &str) -> Option<f64> {
        match self.field(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_amount(&s),
            _ => None,
        }
    }

    /// Parsed date for a date-valued field.
    pub fn field_date(&self, name: &str) -> EventDate {
        EventDate::parse(self.field_text(name).as_deref())
    }

    fn extra(&self) -> &Map<String, Value> {
        match self {
            Record::FundingRound(r) => &r.extra,
            Record::Investor(r) => &r.extra,
            Record::Event(r) => &r.extra,
            Record::Ranking(r) => &r.extra,
        }
    }
}

impl Event {
    pub fn date(&self) -> EventDate {
        EventDate::parse(self.start_date.as_deref())
    }
}

fn text(s: &str) -> Value {
    Value::String(s.to_string())
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

// =============================================================================
// Event dates
// =============================================================================

/// A start date, or the explicit marker for one that could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventDate {
    Scheduled(NaiveDate),
    Unscheduled,
}

impl EventDate {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return EventDate::Unscheduled;
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return EventDate::Scheduled(dt.date_naive());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return EventDate::Scheduled(dt.date());
        }
        for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%B %d, %Y", "%d %B %Y"] {
            if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
                return EventDate::Scheduled(d);
            }
        }
        EventDate::Unscheduled
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            EventDate::Scheduled(d) => Some(*d),
            EventDate::Unscheduled => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            EventDate::Scheduled(d) => d.format("%Y-%m-%d").to_string(),
            EventDate::Unscheduled => "Unscheduled".to_string(),
        }
    }
}

// =============================================================================
// Page and count payloads
// =============================================================================

/// A record page: a JSON array, or an object wrapping one under `data`.
pub fn decode_page(kind: RecordKind, body: Value) -> Result<Vec<Record>, FetchError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => return Err(FetchError::decode("expected an array of records")),
        },
        _ => return Err(FetchError::decode("expected an array of records")),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            Record::decode(kind, item)
                .map_err(|e| FetchError::decode(&format!("record {}: {}", i, e)))
        })
        .collect()
}

/// 2^64 as f64; every integral float below it fits in a u64.
const U64_CEILING: f64 = 18_446_744_073_709_551_616.0;

/// `{ "count": n }`; a bare number is accepted too.
pub fn decode_count(body: &Value) -> Result<u64, FetchError> {
    let raw = match body {
        Value::Object(map) => map.get("count").unwrap_or(&Value::Null),
        other => other,
    };
    match raw {
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(c), _) => Ok(c),
            // `12.0` is fine; `3.7`, negatives and anything past u64 are not
            (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 && f < U64_CEILING => Ok(f as u64),
            _ => Err(FetchError::decode(&format!("count {} is not a non-negative integer", n))),
        },
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| FetchError::decode("count is not an integer")),
        _ => Err(FetchError::decode("missing count")),
    }
}

// =============================================================================
// Sorting
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Stable sort by a field. Numbers compare numerically, text
/// case-insensitively; records missing the field always sort last.
pub fn sort_records(records: &mut [Record], field: &str, direction: SortDirection) {
    records.sort_by(|a, b| {
        match (sort_value(a, field), sort_value(b, field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = x.cmp_with(&y);
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        }
    });
}

enum SortValue {
    Num(f64),
    Text(String),
}

impl SortValue {
    fn cmp_with(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Num(a), SortValue::Num(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (SortValue::Num(_), SortValue::Text(_)) => Ordering::Less,
            (SortValue::Text(_), SortValue::Num(_)) => Ordering::Greater,
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
        }
    }
}

fn sort_value(record: &Record, field: &str) -> Option<SortValue> {
    match record.field(field)? {
        Value::Number(n) => n.as_f64().map(SortValue::Num),
        Value::String(s) if !s.trim().is_empty() => Some(SortValue::Text(s.to_lowercase())),
        _ => None,
    }
}

// =============================================================================
// Lenient field decoding
// =============================================================================

fn de_text<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn de_amount<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_amount(&s),
        _ => None,
    })
}

fn de_list<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(m) => m.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => split_list(&s),
        _ => Vec::new(),
    })
}

/// Comma-separated list, trimmed, blanks dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `"1200"`, `"$1,200"`, `"2.5M"`, `"$3B"`, `"750k"`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let (digits, mult) = match cleaned.chars().last()? {
        'k' | 'K' => (&cleaned[..cleaned.len() - 1], 1e3),
        'm' | 'M' => (&cleaned[..cleaned.len() - 1], 1e6),
        'b' | 'B' => (&cleaned[..cleaned.len() - 1], 1e9),
        _ => (cleaned.as_str(), 1.0),
    };
    digits.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v * mult)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_funding_round_lenient() {
        let r = Record::decode(
            RecordKind::FundingRound,
            json!({"_id": 42, "companyName": "Acme", "amount": "$2.5M", "investors": "A, B ,", "stage": "late"}),
        )
        .unwrap();
        assert_eq!(r.id(), Some("42"));
        assert_eq!(r.field_number("amount"), Some(2_500_000.0));
        assert_eq!(r.field_text("investors").as_deref(), Some("A, B"));
        assert_eq!(r.field_text("stage").as_deref(), Some("late"));
        assert_eq!(r.field("country"), None);
    }

    #[test]
    fn test_id_and_mongo_id_together() {
        let page = decode_page(
            RecordKind::Event,
            json!([{"_id": "a1", "id": "a1", "title": "X"}, {"_id": "b2", "title": "Y"}, {"_id": "m9", "id": 7}]),
        )
        .unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].id(), Some("a1"));
        assert_eq!(page[0].field_text("_id").as_deref(), Some("a1"));
        assert_eq!(page[1].id(), Some("b2"));
        assert_eq!(page[2].id(), Some("7"));
    }

    #[test]
    fn test_event_aliases() {
        let r = Record::decode(
            RecordKind::Event,
            json!({"id": "e1", "name": "RustConf", "type": "Conference", "date": "2025-09-02"}),
        )
        .unwrap();
        assert_eq!(r.title(), Some("RustConf"));
        assert_eq!(r.field_text("eventType").as_deref(), Some("Conference"));
        assert_eq!(
            r.field_date("startDate"),
            EventDate::Scheduled(NaiveDate::from_ymd_opt(2025, 9, 2).unwrap())
        );
    }

    #[test]
    fn test_unparseable_date_is_unscheduled() {
        assert_eq!(EventDate::parse(Some("TBA")), EventDate::Unscheduled);
        assert_eq!(EventDate::parse(Some("")), EventDate::Unscheduled);
        assert_eq!(EventDate::parse(None), EventDate::Unscheduled);
        // Same input, same answer.
        assert_eq!(EventDate::parse(Some("soon")), EventDate::parse(Some("soon")));
        assert_eq!(EventDate::Unscheduled.label(), "Unscheduled");
    }

    #[test]
    fn test_date_formats() {
        let d = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        for raw in ["2024-07-04", "2024-07-04T10:00:00Z", "2024-07-04T10:00:00", "04/07/2024", "July 4, 2024"] {
            assert_eq!(EventDate::parse(Some(raw)), EventDate::Scheduled(d), "{}", raw);
        }
    }

    #[test]
    fn test_decode_page_shapes() {
        assert_eq!(decode_page(RecordKind::Ranking, json!([])).unwrap().len(), 0);
        let wrapped = decode_page(RecordKind::Ranking, json!({"data": [{"name": "X", "rank": 1}]})).unwrap();
        assert_eq!(wrapped[0].field_number("rank"), Some(1.0));
        assert!(decode_page(RecordKind::Ranking, json!({"count": 3})).is_err());
        assert!(decode_page(RecordKind::Ranking, json!("nope")).is_err());
    }

    #[test]
    fn test_decode_count() {
        assert_eq!(decode_count(&json!({"count": 17})).unwrap(), 17);
        assert_eq!(decode_count(&json!({"count": "9"})).unwrap(), 9);
        assert_eq!(decode_count(&json!(4)).unwrap(), 4);
        assert!(decode_count(&json!({"total": 4})).is_err());
        assert!(decode_count(&json!({"count": -1})).is_err());
    }

    #[test]
    fn test_decode_count_rejects_fractional_and_oversized() {
        assert_eq!(decode_count(&json!({"count": 12.0})).unwrap(), 12);
        assert!(decode_count(&json!({"count": 3.7})).is_err());
        assert!(decode_count(&json!({"count": 1e20})).is_err());
        assert!(decode_count(&json!({"count": -2.0})).is_err());
        assert_eq!(decode_count(&json!({"count": u64::MAX})).unwrap(), u64::MAX);
    }

    #[test]
    fn test_sort_records_missing_last() {
        let mut rs: Vec<Record> = [json!({"name": "b", "score": 2}), json!({"name": "a"}), json!({"name": "c", "score": 9})]
            .into_iter()
            .map(|v| Record::decode(RecordKind::Ranking, v).unwrap())
            .collect();
        sort_records(&mut rs, "score", SortDirection::Desc);
        let names: Vec<_> = rs.iter().map(|r| r.title().unwrap()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
        sort_records(&mut rs, "score", SortDirection::Asc);
        let names: Vec<_> = rs.iter().map(|r| r.title().unwrap()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,200"), Some(1200.0));
        assert_eq!(parse_amount("750k"), Some(750_000.0));
        assert_eq!(parse_amount("3B"), Some(3e9));
        assert_eq!(parse_amount("undisclosed"), None);
        assert_eq!(parse_amount(""), None);
    }
}
