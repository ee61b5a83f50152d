use facetscope::aggregate::{aggregate, resolve_series, GroupSpec, KeyRule, SeriesSelector, SeriesSource, ValueRule, ALL_SERIES, OTHER};
use facetscope::config::ExplorerConfig;
use facetscope::fetch::MemoryTransport;
use facetscope::filter::FilterState;
use facetscope::pagination::Pagination;
use facetscope::query::{encode, translate, QueryKey, MONTHS};
use facetscope::records::{Record, RecordKind};
use facetscope::registry::{lookup, ExplorerKind, Translation, DATASETS};
use facetscope::Explorer;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::Arc;

const KEYS: &[&str] = &["search", "eventType", "location", "month", "industry", "country", "roundType", "year", "investorType"];
const VALUES: &[&str] = &["all", "", "  ", "July", "Berlin", "Fintech", "2024", "ai", "Hackathon"];

fn random_filters(rng: &mut StdRng) -> FilterState {
    let mut f = FilterState::new();
    for key in KEYS {
        if rng.gen_bool(0.6) {
            f = f.set(key, VALUES.choose(rng).unwrap());
        }
    }
    f
}

fn explorer(kind: ExplorerKind) -> Explorer {
    let config = ExplorerConfig { api_base: "http://localhost/api".to_string(), ..Default::default() };
    Explorer::new(kind, &config, Arc::new(MemoryTransport::new())).unwrap()
}

#[test]
fn encoded_params_never_carry_unconstrained_filters() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..500 {
        let filters = random_filters(&mut rng);
        let dataset = DATASETS.choose(&mut rng).unwrap();
        let pagination = Pagination::new(rng.gen_range(1..50)).go_to(rng.gen_range(-3..40));
        for (k, v) in encode(&filters, &pagination, dataset).iter() {
            assert!(!v.trim().is_empty(), "{} encoded blank", k);
            assert_ne!(v, "all", "{} encoded the sentinel", k);
        }
    }
}

#[test]
fn any_filter_or_dataset_change_resets_page() {
    let mut rng = StdRng::seed_from_u64(11);
    for kind in [ExplorerKind::Funding, ExplorerKind::Events, ExplorerKind::Rankings] {
        let mut e = explorer(kind);
        for _ in 0..200 {
            e.go_to_page(rng.gen_range(2..30));
            let key = *e.dataset().relevant_filter_keys.choose(&mut rng).unwrap();
            let value = *VALUES.choose(&mut rng).unwrap();
            if e.set_filter(key, value) {
                assert_eq!(e.pagination().page(), 1);
            }

            e.go_to_page(rng.gen_range(2..30));
            let tabs = e.tabs();
            let target = tabs.choose(&mut rng).unwrap();
            let changed = target.id != e.dataset().id;
            let before = e.pagination().page();
            e.select_dataset(target.id).unwrap();
            assert_eq!(e.pagination().page(), if changed { 1 } else { before });
        }
    }
}

#[test]
fn offset_is_derived_from_page_and_limit() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..1000 {
        let p = Pagination::new(rng.gen_range(1..500)).go_to(rng.gen_range(-10..10_000));
        assert_eq!(p.offset(), (p.page() as u64 - 1) * p.limit() as u64);
    }
    assert_eq!(Pagination::new(20).go_to(3).offset(), 40);
}

#[test]
fn keys_equal_iff_dataset_page_and_projection_equal() {
    let mut rng = StdRng::seed_from_u64(19);
    for _ in 0..1000 {
        let (da, db) = (DATASETS.choose(&mut rng).unwrap(), DATASETS.choose(&mut rng).unwrap());
        let (pa, pb) = (Pagination::new(20).go_to(rng.gen_range(1..3)), Pagination::new(20).go_to(rng.gen_range(1..3)));
        let (fa, fb) = (random_filters(&mut rng), random_filters(&mut rng));
        let same_inputs = da.id == db.id
            && pa.page() == pb.page()
            && fa.project(da.relevant_filter_keys) == fb.project(db.relevant_filter_keys);
        assert_eq!(QueryKey::records(da, &pa, &fa) == QueryKey::records(db, &pb, &fb), same_inputs);
    }
}

#[test]
fn irrelevant_filter_change_keeps_key() {
    let d = lookup("european_events").unwrap();
    let p = Pagination::default();
    let base = FilterState::from_pairs(&[("month", "March")]);
    for value in VALUES {
        assert_eq!(QueryKey::records(d, &p, &base), QueryKey::records(d, &p, &base.set("eventType", value)));
    }
}

#[test]
fn month_translation_is_total() {
    for (i, m) in MONTHS.iter().enumerate() {
        assert_eq!(translate(Translation::MonthNumber, m), format!("{:02}", i + 1));
    }
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..500 {
        let len = rng.gen_range(0..10);
        let s: String = (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
        if MONTHS.iter().any(|m| m.eq_ignore_ascii_case(&s)) {
            continue;
        }
        assert_eq!(translate(Translation::MonthNumber, &s), s);
    }
}

#[test]
fn aggregation_conserves_counts_and_caps() {
    let types = [Some("Conference"), Some("Meetup"), Some("Hackathon"), Some("Workshop"), Some("Summit"), Some(""), Some("null"), None];
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..200 {
        let n = rng.gen_range(0..60);
        let records: Vec<Record> = (0..n)
            .map(|i| {
                let body = match types.choose(&mut rng).unwrap() {
                    Some(t) => json!({"id": i.to_string(), "eventType": t}),
                    None => json!({"id": i.to_string()}),
                };
                Record::decode(RecordKind::Event, body).unwrap()
            })
            .collect();
        let top_n = rng.gen_range(1..8);
        let spec = GroupSpec { key: KeyRule::Field("eventType"), value: ValueRule::Count, top_n };
        let series = aggregate(&records, &spec);

        let total: f64 = series.iter().map(|p| p.value).sum();
        assert_eq!(total as usize, records.len());
        assert!(series.len() <= top_n);
        let named: Vec<_> = series.iter().filter(|p| p.name != OTHER).collect();
        assert!(named.windows(2).all(|w| w[0].value >= w[1].value));
        assert!(series.iter().filter(|p| p.name == OTHER).count() <= 1);
    }
}

#[test]
fn empty_input_yields_empty_series() {
    for selector in ALL_SERIES {
        assert!(aggregate(&[], &selector.fallback_rule(10)).is_empty());
        let resolved = resolve_series(selector, None, &[], 10, false);
        assert!(resolved.points.is_empty());
        assert_eq!(resolved.source, SeriesSource::ClientFallback);
    }
}

#[test]
fn placeholder_series_only_in_demo_mode() {
    let demo = resolve_series(SeriesSelector::Industries, None, &[], 10, true);
    assert_eq!(demo.source, SeriesSource::Demo);
    assert!(!demo.points.is_empty());
    assert!(demo.points.iter().all(|p| p.name.ends_with("(demo)")));
}
