//! Custom `tracing_subscriber::Layer` that routes events carrying a
//! `bib_id` span field into the per-BIB/UUT file hierarchy from spec.md §6,
//! alongside whatever other layers (console, central service log) are
//! composed with it. No pack example implements per-entity log routing
//! like this; built directly against `tracing_subscriber::Layer`, the
//! standard mechanism for this job.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Routing fields this layer keys off, gathered from the current event's
/// span scope (outer to inner, so the innermost span's values win).
#[derive(Debug, Clone, Default)]
struct RouteFields {
    bib_id: Option<String>,
    uut_id: Option<String>,
    port: Option<String>,
    session: Option<String>,
}

impl RouteFields {
    fn merge(&mut self, other: &RouteFields) {
        if other.bib_id.is_some() {
            self.bib_id.clone_from(&other.bib_id);
        }
        if other.uut_id.is_some() {
            self.uut_id.clone_from(&other.uut_id);
        }
        if other.port.is_some() {
            self.port.clone_from(&other.port);
        }
        if other.session.is_some() {
            self.session.clone_from(&other.session);
        }
    }
}

struct RouteVisitor(RouteFields);

impl Visit for RouteVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.assign(field.name(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.assign(field.name(), value.to_string());
    }
}

impl RouteVisitor {
    fn assign(&mut self, name: &str, value: String) {
        match name {
            "bib_id" => self.0.bib_id = Some(value),
            "uut_id" => self.0.uut_id = Some(value),
            "port" => self.0.port = Some(value),
            "session" => self.0.session = Some(value),
            _ => {}
        }
    }
}

/// Collects an event's `message` field plus every other field into one
/// formatted log line.
struct LineVisitor {
    message: String,
    extra: Vec<(String, String)>,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = text;
        } else {
            self.extra.push((field.name().to_string(), text));
        }
    }
}

fn format_event(event: &Event<'_>) -> String {
    let mut visitor = LineVisitor { message: String::new(), extra: Vec::new() };
    event.record(&mut visitor);

    let mut line =
        format!("{} {:>5} {}: {}", today_timestamp(), event.metadata().level(), event.metadata().target(), visitor.message);
    for (key, value) in visitor.extra {
        line.push_str(&format!(" {key}={value}"));
    }
    line.push('\n');
    line
}

/// Current date as `YYYY-MM-DD`, used both for directory names and the
/// per-line timestamp prefix (no wall-clock dependency injection needed:
/// this layer only ever runs against real time).
pub(crate) fn today() -> String {
    humantime::format_rfc3339_seconds(std::time::SystemTime::now()).to_string()[..10].to_string()
}

fn today_timestamp() -> String {
    humantime::format_rfc3339_seconds(std::time::SystemTime::now()).to_string()
}

fn session_short(session: &str) -> String {
    session.chars().take(8).collect()
}

/// Routes events into `logs/BIB_<id>/<date>/<uut>_port<n>_<sessionShort>.log`
/// and `logs/BIB_<id>/latest/<uut>_current.log`. Events with no `bib_id`
/// span field (discovery's global scan, service startup) are not routed
/// here at all — they reach only the layers composed alongside this one.
pub struct BibRouterLayer {
    log_dir: PathBuf,
    files: DashMap<PathBuf, Mutex<File>>,
    latest_sessions: DashMap<(String, String), Mutex<Option<String>>>,
}

impl BibRouterLayer {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, files: DashMap::new(), latest_sessions: DashMap::new() }
    }

    fn append(&self, path: PathBuf, line: &str) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let entry = self.files.entry(path.clone()).or_insert_with(|| match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Mutex::new(file),
            Err(_) => Mutex::new(File::create("/dev/null").expect("/dev/null always opens")),
        });
        if let Ok(mut file) = entry.lock() {
            let _ = file.write_all(line.as_bytes());
        }
    }

    fn write_dated(&self, bib_id: &str, uut_id: Option<&str>, port: Option<&str>, session: Option<&str>, line: &str) {
        let bib_dir = self.log_dir.join(format!("BIB_{bib_id}"));
        let name = match (uut_id, port) {
            (Some(uut), Some(port)) => {
                let short = session.map(session_short).unwrap_or_else(|| "nosession".to_string());
                format!("{uut}_port{port}_{short}.log")
            }
            _ => "bib.log".to_string(),
        };
        self.append(bib_dir.join(today()).join(name), line);
    }

    /// Reset (truncate) the `_current.log` file for a (bib, uut) pair the
    /// first time a new session is observed for it, then append. This
    /// keeps `latest/<uut>_current.log` scoped to the run in progress
    /// rather than accumulating across every past run forever.
    fn write_latest(&self, bib_id: &str, uut_id: &str, session: Option<&str>, line: &str) {
        let path = self.log_dir.join(format!("BIB_{bib_id}")).join("latest").join(format!("{uut_id}_current.log"));
        let key = (bib_id.to_string(), uut_id.to_string());

        let tracked = self.latest_sessions.entry(key).or_insert_with(|| Mutex::new(None));
        let mut last_session = tracked.lock().expect("latest-session lock poisoned");
        if session.is_some() && last_session.as_deref() != session {
            *last_session = session.map(str::to_string);
            self.files.remove(&path);
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = OpenOptions::new().create(true).write(true).truncate(true).open(&path);
        }
        drop(last_session);

        self.append(path, line);
    }
}

impl<S> Layer<S> for BibRouterLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let span = ctx.span(id).expect("span must exist for on_new_span");
        let mut visitor = RouteVisitor(RouteFields::default());
        attrs.record(&mut visitor);
        span.extensions_mut().insert(visitor.0);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let span = ctx.span(id).expect("span must exist for on_record");
        let mut visitor = RouteVisitor(RouteFields::default());
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<RouteFields>() {
            fields.merge(&visitor.0);
        } else {
            extensions.insert(visitor.0);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = RouteFields::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(span_fields) = span.extensions().get::<RouteFields>() {
                    fields.merge(span_fields);
                }
            }
        }

        let mut event_fields = RouteVisitor(RouteFields::default());
        event.record(&mut event_fields);
        fields.merge(&event_fields.0);

        let Some(bib_id) = fields.bib_id else { return };
        let line = format_event(event);

        self.write_dated(&bib_id, fields.uut_id.as_deref(), fields.port.as_deref(), fields.session.as_deref(), &line);
        if let Some(uut_id) = fields.uut_id.as_deref() {
            self.write_latest(&bib_id, uut_id, fields.session.as_deref(), &line);
        }
    }
}
