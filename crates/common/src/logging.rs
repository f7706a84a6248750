use std::sync::OnceLock;

use anyhow::{Context, Result};
use tracing::{field::Visit, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::Context as LayerContext, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::config::LogConfig;

static IGNORE_PATTERNS: OnceLock<Vec<regex::Regex>> = OnceLock::new();

const DEFAULT_FILTER: &str = "warn,shelf_library=info,shelf_extract_pdf=info";

/// Install the global subscriber: env-filtered console output with the
/// ignore patterns applied, plus an optional plain log file.
///
/// The returned guard flushes the file writer; keep it alive for as long as
/// logging should reach the file. Fails if a subscriber is already installed.
pub fn init(cfg: &LogConfig) -> Result<Option<WorkerGuard>> {
    set_ignore_patterns(&cfg.ignore).context("compiling [log] ignore patterns")?;

    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_FILTER.into())
    };

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(LogIgnoreFilter)
        .with_filter(env_filter());

    let (file_layer, guard) = match cfg.file.as_deref() {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(std::path::Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("log file path has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(guard)
}

/// Compile and activate the log-ignore patterns from config.
///
/// The first successful call wins; later calls are ignored. Returns an error
/// if any pattern is not a valid regular expression.
pub fn set_ignore_patterns(patterns: &[String]) -> Result<(), regex::Error> {
    let compiled = compile_patterns(patterns)?;
    let _ = IGNORE_PATTERNS.set(compiled);
    Ok(())
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<regex::Regex>, regex::Error> {
    patterns.iter().map(|p| regex::Regex::new(p)).collect()
}

fn is_ignored(patterns: &[regex::Regex], target: &str, message: &str) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let candidate = format!("{target}: {message}");
    patterns.iter().any(|p| p.is_match(&candidate))
}

// ── Per-layer filter ──────────────────────────────────────────────────────────

/// Suppresses events whose `"<target>: <message>"` matches any pattern
/// installed via [`set_ignore_patterns`]. `pdf_extract` is chatty about
/// glyphs and encodings on ordinary files; this is how those get muted.
pub struct LogIgnoreFilter;

impl<S: Subscriber> tracing_subscriber::layer::Filter<S> for LogIgnoreFilter {
    fn enabled(&self, _meta: &Metadata<'_>, _cx: &LayerContext<'_, S>) -> bool {
        true
    }

    fn event_enabled(&self, event: &tracing::Event<'_>, _cx: &LayerContext<'_, S>) -> bool {
        let Some(patterns) = IGNORE_PATTERNS.get() else {
            return true;
        };
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        // Events bridged from the `log` crate carry target "log"; the real
        // crate name is in the "log.target" field.
        let target = visitor.log_target.as_deref().unwrap_or_else(|| event.metadata().target());
        !is_ignored(patterns, target, &visitor.message)
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    log_target: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "log.target" => self.log_target = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "log.target" => self.log_target = Some(format!("{value:?}")),
            _ => {}
        }
    }
}
