//! Static table of every selectable dataset ("tab").
//!
//! A descriptor says where a tab's data lives, how its backend paginates,
//! which filter keys it consumes and in what order, which values need
//! translating before they go on the wire, and which charts it offers.

use serde::Serialize;

use crate::aggregate::SeriesSelector;
use crate::records::RecordKind;

/// The three dashboard views that embed an explorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorerKind {
    Funding,
    Events,
    Rankings,
}

impl ExplorerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplorerKind::Funding => "funding",
            ExplorerKind::Events => "events",
            ExplorerKind::Rankings => "rankings",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "funding" => Some(ExplorerKind::Funding),
            "events" => Some(ExplorerKind::Events),
            "rankings" => Some(ExplorerKind::Rankings),
            _ => None,
        }
    }

    /// Tab shown on first mount.
    pub fn default_dataset(&self) -> &'static DatasetDescriptor {
        datasets_for(*self)
            .next()
            .unwrap_or(&DATASETS[0])
    }
}

/// Which pagination parameters the backend reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStyle {
    Page,
    Offset,
    Both,
}

impl PageStyle {
    pub fn sends_page(&self) -> bool {
        matches!(self, PageStyle::Page | PageStyle::Both)
    }

    pub fn sends_offset(&self) -> bool {
        matches!(self, PageStyle::Offset | PageStyle::Both)
    }
}

/// Value rewrite applied to a filter before it is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Translation {
    /// "January".."December" → "01".."12"
    MonthNumber,
}

/// Unfiltered endpoint listing the choices for one filter control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptionEndpoint {
    pub filter_key: &'static str,
    pub path: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DatasetDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    pub explorer: ExplorerKind,
    pub record_endpoint: &'static str,
    pub count_endpoint: &'static str,
    pub analytics_endpoint: Option<&'static str>,
    /// Declared order is the order used in keys and parameters.
    pub relevant_filter_keys: &'static [&'static str],
    pub page_style: PageStyle,
    pub translations: &'static [(&'static str, Translation)],
    pub option_endpoints: &'static [OptionEndpoint],
    pub record_kind: RecordKind,
    pub series: &'static [SeriesSelector],
}

impl DatasetDescriptor {
    pub fn is_relevant(&self, key: &str) -> bool {
        self.relevant_filter_keys.contains(&key)
    }

    pub fn translation_for(&self, key: &str) -> Option<Translation> {
        self.translations
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, t)| *t)
    }

    /// Charts this tab shows; anything else is refused rather than grouped
    /// into a single "Other" bucket.
    pub fn offers(&self, selector: SeriesSelector) -> bool {
        self.series.contains(&selector)
    }

    pub fn option_endpoint(&self, filter_key: &str) -> Option<&'static OptionEndpoint> {
        self.option_endpoints.iter().find(|o| o.filter_key == filter_key)
    }
}

pub static DATASETS: &[DatasetDescriptor] = &[
    DatasetDescriptor {
        id: "funding_rounds",
        label: "Funding Rounds",
        explorer: ExplorerKind::Funding,
        record_endpoint: "/funding-rounds",
        count_endpoint: "/funding-rounds/count",
        analytics_endpoint: Some("/funding-rounds/analytics"),
        relevant_filter_keys: &["search", "industry", "country", "roundType", "year"],
        page_style: PageStyle::Offset,
        translations: &[],
        option_endpoints: &[
            OptionEndpoint { filter_key: "industry", path: "/funding-rounds/industries" },
            OptionEndpoint { filter_key: "country", path: "/funding-rounds/countries" },
            OptionEndpoint { filter_key: "roundType", path: "/funding-rounds/unique-types" },
        ],
        record_kind: RecordKind::FundingRound,
        series: &[
            SeriesSelector::Industries,
            SeriesSelector::Countries,
            SeriesSelector::RoundTypes,
            SeriesSelector::FundingByYear,
            SeriesSelector::AmountBands,
        ],
    },
    DatasetDescriptor {
        id: "investors",
        label: "Investors",
        explorer: ExplorerKind::Funding,
        record_endpoint: "/investors",
        count_endpoint: "/investors/count",
        analytics_endpoint: None,
        relevant_filter_keys: &["search", "investorType", "country"],
        page_style: PageStyle::Offset,
        translations: &[],
        option_endpoints: &[
            OptionEndpoint { filter_key: "investorType", path: "/investors/unique-types" },
            OptionEndpoint { filter_key: "country", path: "/investors/countries" },
        ],
        record_kind: RecordKind::Investor,
        series: &[SeriesSelector::InvestorTypes, SeriesSelector::Countries],
    },
    DatasetDescriptor {
        id: "general_events",
        label: "General Events",
        explorer: ExplorerKind::Events,
        record_endpoint: "/events",
        count_endpoint: "/events/count",
        analytics_endpoint: None,
        relevant_filter_keys: &["search", "eventType", "location", "month"],
        page_style: PageStyle::Both,
        translations: &[("month", Translation::MonthNumber)],
        option_endpoints: &[
            OptionEndpoint { filter_key: "eventType", path: "/events/unique-types" },
            OptionEndpoint { filter_key: "location", path: "/events/locations" },
        ],
        record_kind: RecordKind::Event,
        series: &[
            SeriesSelector::EventTypes,
            SeriesSelector::EventLocations,
            SeriesSelector::EventMonths,
        ],
    },
    DatasetDescriptor {
        id: "european_events",
        label: "European Events",
        explorer: ExplorerKind::Events,
        record_endpoint: "/european-events",
        count_endpoint: "/european-events/count",
        analytics_endpoint: None,
        relevant_filter_keys: &["search", "location", "month"],
        page_style: PageStyle::Both,
        translations: &[("month", Translation::MonthNumber)],
        option_endpoints: &[OptionEndpoint { filter_key: "location", path: "/european-events/locations" }],
        record_kind: RecordKind::Event,
        series: &[SeriesSelector::EventLocations, SeriesSelector::EventMonths],
    },
    DatasetDescriptor {
        id: "startup_rankings",
        label: "Startup Rankings",
        explorer: ExplorerKind::Rankings,
        record_endpoint: "/rankings/startups",
        count_endpoint: "/rankings/startups/count",
        analytics_endpoint: Some("/rankings/startups/analytics"),
        relevant_filter_keys: &["search", "country", "industry"],
        page_style: PageStyle::Page,
        translations: &[],
        option_endpoints: &[
            OptionEndpoint { filter_key: "country", path: "/rankings/startups/countries" },
            OptionEndpoint { filter_key: "industry", path: "/rankings/startups/industries" },
        ],
        record_kind: RecordKind::Ranking,
        series: &[SeriesSelector::Countries, SeriesSelector::Industries],
    },
    DatasetDescriptor {
        id: "investor_rankings",
        label: "Investor Rankings",
        explorer: ExplorerKind::Rankings,
        record_endpoint: "/rankings/investors",
        count_endpoint: "/rankings/investors/count",
        analytics_endpoint: None,
        relevant_filter_keys: &["search", "country"],
        page_style: PageStyle::Page,
        translations: &[],
        option_endpoints: &[OptionEndpoint { filter_key: "country", path: "/rankings/investors/countries" }],
        record_kind: RecordKind::Ranking,
        series: &[SeriesSelector::Countries],
    },
];

pub fn lookup(id: &str) -> Option<&'static DatasetDescriptor> {
    DATASETS.iter().find(|d| d.id == id)
}

pub fn datasets_for(kind: ExplorerKind) -> impl Iterator<Item = &'static DatasetDescriptor> {
    DATASETS.iter().filter(move |d| d.explorer == kind)
}
