//! Structured logging for the explorer core.
//!
//! Every record is one JSON line with a run id, a sequence number, a level,
//! the emitting domain and an event name. Lines go to stderr so the CLI can
//! keep stdout for results; when `LOG_DIR` is set they are also appended to
//! per-run jsonl files.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    State,     // Filter, pagination and tab transitions
    Query,     // Key building, parameter encoding
    Fetch,     // Request lifecycle, supersession
    Cache,     // Hits, coalescing, invalidation
    Aggregate, // Client-side series fallback
    Options,   // Dropdown option fetches
    System,    // Startup, config
    Profile,   // Timing
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::State => "state",
            Domain::Query => "query",
            Domain::Fetch => "fetch",
            Domain::Cache => "cache",
            Domain::Aggregate => "aggregate",
            Domain::Options => "options",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let Ok(base) = std::env::var("LOG_DIR") else {
            return RunContext { run_id, events: None, trace: None };
        };
        let (events, trace) = open_sinks(&PathBuf::from(base), &run_id);
        RunContext { run_id, events, trace }
    })
}

type Sink = Option<Mutex<BufWriter<File>>>;

fn open_sinks(base: &std::path::Path, run_id: &str) -> (Sink, Sink) {
    let run_dir = base.join(run_id);
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] failed to create run dir: {}", err);
        return (None, None);
    }
    let _ = std::fs::write(
        run_dir.join("manifest.json"),
        json!({
            "run_id": run_id,
            "ts": ts_now(),
            "pid": process::id(),
            "log_dir": run_dir.to_string_lossy(),
        })
        .to_string(),
    );
    let open = |name: &str| match File::create(run_dir.join(name)) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", name, err);
            None
        }
    };
    (open("events.jsonl"), open("trace.jsonl"))
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["authorization", "Authorization", "token", "access_token", "api_key", "cookie"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["dataset", "key", "role", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    let line = render_record(level, domain.as_str(), event, fields);
    let ctx = ensure_run_context();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    eprintln!("{}", line);
}

fn render_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) -> String {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(sanitize_fields(fields));

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry).to_string()
}

// =============================================================================
// Explorer events
// =============================================================================

pub fn log_state_transition(dataset: &str, change: &str, page: u32) {
    log(
        Level::Debug,
        Domain::State,
        "transition",
        obj(&[
            ("dataset", v_str(dataset)),
            ("change", v_str(change)),
            ("page", json!(page)),
        ]),
    );
}

pub fn query_fields(dataset: &str, role: &str, key: &str, params: &str) -> Map<String, Value> {
    obj(&[
        ("dataset", v_str(dataset)),
        ("role", v_str(role)),
        ("key", v_str(key)),
        ("params", v_str(params)),
    ])
}

/// Key fingerprint and wire parameters for one request about to be issued.
pub fn log_query_encoded(dataset: &str, role: &str, key: &str, params: &str) {
    log(Level::Debug, Domain::Query, "encoded", query_fields(dataset, role, key, params));
}

pub fn log_fetch_issued(dataset: &str, role: &str, key: &str, url: &str) {
    agg_increment("issued");
    log(
        Level::Debug,
        Domain::Fetch,
        "issued",
        obj(&[
            ("dataset", v_str(dataset)),
            ("role", v_str(role)),
            ("key", v_str(key)),
            ("url", v_str(url)),
        ]),
    );
}

pub fn log_fetch_resolved(dataset: &str, role: &str, key: &str, ok: bool, detail: &str) {
    if !ok {
        agg_increment("failed");
    }
    log(
        if ok { Level::Debug } else { Level::Warn },
        Domain::Fetch,
        "resolved",
        obj(&[
            ("dataset", v_str(dataset)),
            ("role", v_str(role)),
            ("key", v_str(key)),
            ("ok", Value::Bool(ok)),
            ("detail", v_str(detail)),
        ]),
    );
}

/// A response arrived for a key its slot no longer points at.
pub fn log_stale_discarded(dataset: &str, role: &str, stale_key: &str, current_key: &str) {
    agg_increment("stale");
    log(
        Level::Info,
        Domain::Fetch,
        "stale_discarded",
        obj(&[
            ("dataset", v_str(dataset)),
            ("role", v_str(role)),
            ("key", v_str(stale_key)),
            ("current_key", v_str(current_key)),
        ]),
    );
}

pub fn log_cache(event: &str, dataset: &str, key: &str) {
    agg_increment(event);
    log(
        Level::Trace,
        Domain::Cache,
        event,
        obj(&[("dataset", v_str(dataset)), ("key", v_str(key))]),
    );
}

pub fn log_fallback_aggregation(dataset: &str, series: &str, records: usize, groups: usize) {
    log(
        Level::Info,
        Domain::Aggregate,
        "client_fallback",
        obj(&[
            ("dataset", v_str(dataset)),
            ("series", v_str(series)),
            ("records", json!(records)),
            ("groups", json!(groups)),
            ("msg", v_str("no server analytics for current filters; grouping current page")),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    fn should_sample() -> bool {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|p| {
                if p >= 1.0 {
                    true
                } else if p <= 0.0 {
                    false
                } else {
                    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
                    let bucket = (seq % 10_000) as f64 / 10_000.0;
                    bucket < p
                }
            })
            .unwrap_or(true)
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Fetch counters for periodic summaries
// =============================================================================

static AGGREGATOR: OnceLock<Mutex<FetchCounters>> = OnceLock::new();

fn get_aggregator() -> &'static Mutex<FetchCounters> {
    AGGREGATOR.get_or_init(|| Mutex::new(FetchCounters::new()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub issued: u64,
    pub hits: u64,
    pub coalesced: u64,
    pub stale: u64,
    pub failed: u64,
}

struct FetchCounters {
    counts: CounterSnapshot,
    last_flush: Instant,
    flush_interval_secs: u64,
}

impl FetchCounters {
    fn new() -> Self {
        Self {
            counts: CounterSnapshot::default(),
            last_flush: Instant::now(),
            flush_interval_secs: std::env::var("LOG_FLUSH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }

    fn increment(&mut self, event: &str) {
        match event {
            "issued" => self.counts.issued += 1,
            "hit" => self.counts.hits += 1,
            "coalesced" => self.counts.coalesced += 1,
            "stale" => self.counts.stale += 1,
            "failed" => self.counts.failed += 1,
            _ => {}
        }
    }

    fn maybe_flush(&mut self) -> Option<CounterSnapshot> {
        if self.last_flush.elapsed().as_secs() >= self.flush_interval_secs {
            let result = self.counts;
            self.counts = CounterSnapshot::default();
            self.last_flush = Instant::now();
            Some(result)
        } else {
            None
        }
    }
}

/// Call periodically to emit aggregated fetch stats
pub fn tick_aggregator() {
    if let Ok(mut agg) = get_aggregator().lock() {
        if let Some(counts) = agg.maybe_flush() {
            log(
                Level::Info,
                Domain::System,
                "fetch_stats",
                obj(&[
                    ("issued", json!(counts.issued)),
                    ("hits", json!(counts.hits)),
                    ("coalesced", json!(counts.coalesced)),
                    ("stale", json!(counts.stale)),
                    ("failed", json!(counts.failed)),
                ]),
            );
        }
    }
}

fn agg_increment(event: &str) {
    if let Ok(mut agg) = get_aggregator().lock() {
        agg.increment(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
