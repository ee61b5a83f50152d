use anyhow::{anyhow, Result};
use facetscope::aggregate::SeriesSelector;
use facetscope::config::ExplorerConfig;
use facetscope::fetch::HttpTransport;
use facetscope::logging::{log, obj, tick_aggregator, v_str, Domain, Level};
use facetscope::records::{sort_records, SortDirection};
use facetscope::registry::{lookup, DATASETS};
use facetscope::view::Panel;
use facetscope::Explorer;
use serde_json::json;
use std::env;
use std::sync::Arc;

const USAGE: &str = "usage: facetscope <dataset> [--page N] [--limit N] [--sort FIELD[:desc]] \
[--series NAME] [--options KEY] [key=value ...]\n       facetscope --list";

#[derive(Debug, Default)]
struct Args {
    dataset: String,
    page: Option<i64>,
    limit: Option<u32>,
    sort: Option<(String, SortDirection)>,
    series: Vec<SeriesSelector>,
    options: Vec<String>,
    filters: Vec<(String, String)>,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args::default();
    let mut it = raw.iter();
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| {
            it.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} needs a value", flag))
        };
        match arg.as_str() {
            "--page" => args.page = Some(value("--page")?.parse()?),
            "--limit" => args.limit = Some(value("--limit")?.parse()?),
            "--sort" => {
                let sort = value("--sort")?;
                let (field, dir) = match sort.split_once(':') {
                    Some((f, "desc")) => (f.to_string(), SortDirection::Desc),
                    Some((f, _)) => (f.to_string(), SortDirection::Asc),
                    None => (sort.clone(), SortDirection::Asc),
                };
                args.sort = Some((field, dir));
            }
            "--series" => {
                let name = value("--series")?;
                let selector = SeriesSelector::parse(&name)
                    .ok_or_else(|| anyhow!("unknown series {:?}", name))?;
                args.series.push(selector);
            }
            "--options" => args.options.push(value("--options")?),
            other => match other.split_once('=') {
                Some((k, v)) => args.filters.push((k.to_string(), v.to_string())),
                None if args.dataset.is_empty() => args.dataset = other.to_string(),
                None => return Err(anyhow!("unexpected argument {:?}\n{}", other, USAGE)),
            },
        }
    }
    if args.dataset.is_empty() {
        return Err(anyhow!(USAGE));
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw: Vec<String> = env::args().skip(1).collect();
    if raw.iter().any(|a| a == "--list") {
        for d in DATASETS {
            println!("{}", serde_json::to_string(d)?);
        }
        return Ok(());
    }

    let args = parse_args(&raw)?;
    let cfg = ExplorerConfig::from_env();
    let dataset = lookup(&args.dataset).ok_or_else(|| anyhow!("unknown dataset {:?}", args.dataset))?;
    let transport = Arc::new(HttpTransport::new(&cfg)?);
    let mut explorer = Explorer::new(dataset.explorer, &cfg, transport)?;
    explorer.select_dataset(dataset.id)?;
    if let Some(limit) = args.limit {
        explorer.set_limit(limit);
    }
    for (k, v) in &args.filters {
        if !dataset.is_relevant(k) {
            log(
                Level::Warn,
                Domain::State,
                "ignored_filter",
                obj(&[("dataset", v_str(dataset.id)), ("filter", v_str(k))]),
            );
        }
        explorer.set_filter(k, v);
    }
    if let Some(page) = args.page {
        explorer.go_to_page(page);
    }

    explorer.refresh().await?;

    match explorer.records_view() {
        Panel::Ready(mut records) => {
            if let Some((field, dir)) = &args.sort {
                sort_records(&mut records, field, *dir);
            }
            for r in &records {
                println!("{}", serde_json::to_string(r)?);
            }
        }
        other => println!("{}", json!({ "records": other.label(), "detail": serde_json::to_value(&other)? })),
    }
    println!(
        "{}",
        json!({
            "count": serde_json::to_value(explorer.count_view())?,
            "page": explorer.pagination().page(),
            "total_pages": explorer.total_pages(),
        })
    );

    for selector in &args.series {
        println!("{}", serde_json::to_string(&explorer.chart_view(*selector))?);
    }
    for key in &args.options {
        match explorer.options(key).await {
            Ok(entries) => println!("{}", json!({ "options": key, "entries": entries })),
            Err(e) => println!("{}", json!({ "options": key, "error": e.msg })),
        }
    }

    tick_aggregator();
    Ok(())
}
