//! Telemetry & Observability
//!
//! Structured logging for the synchronisation workflow and the REST client.
//! Features:
//! - Operation spans with timing and outcome
//! - Configurable log levels via RUST_LOG
//! - Compact or JSON output on stderr
//! - Log-injection and secret scrubbing for values taken from the outside

use regex::Regex;
use std::future::Future;
use std::sync::{Once, OnceLock};
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Sanitize a string for safe log output by escaping control characters.
/// Artifact names and URLs come from user configuration and may embed newlines.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x1b' => out.push_str("\\e"),
            '\x00' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            // user:password@ in URLs
            Regex::new(r"(?i)(https?://)[^/\s:@]+:[^/\s@]+@").expect("invalid userinfo regex"),
            // Bearer tokens
            Regex::new(r"(?i)Bearer\s+[A-Za-z0-9_\-\.]{8,}").expect("invalid bearer regex"),
            // token=..., access_token=..., password=..., client_secret=...
            Regex::new(r"(?i)(access_token|token|password|passwd|pwd|client_secret)=[^&\s]+")
                .expect("invalid query secret regex"),
        ]
    })
}

/// Redact credentials from a string before logging.
///
/// Covers URL userinfo, Bearer tokens and secret-looking query parameters.
pub fn redact_secrets(input: &str) -> String {
    let patterns = secret_patterns();
    let mut result = patterns[0]
        .replace_all(input, "${1}[REDACTED]@")
        .into_owned();
    result = patterns[1]
        .replace_all(&result, "Bearer [REDACTED]")
        .into_owned();
    patterns[2]
        .replace_all(&result, "${1}=[REDACTED]")
        .into_owned()
}

/// Sanitize then redact; the form every externally supplied value is logged in.
pub fn safe_for_log(input: &str) -> String {
    redact_secrets(&sanitize_for_log(input))
}

/// Initialize global tracing only if RUST_LOG is set, keeping CLI output clean otherwise.
pub fn init_tracing() {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        init_tracing_with_filter(&filter);
    }
}

/// Initialize with a custom filter string. Later calls are ignored.
pub fn init_tracing_with_filter(filter: &str) {
    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_level(true)
            .compact()
            .with_writer(std::io::stderr);

        let _ = tracing_subscriber::registry()
            .with(env_filter(filter))
            .with(fmt_layer)
            .try_init();
    });
}

/// Initialize JSON-formatted logs, one object per line on stderr.
pub fn init_tracing_json(filter: &str) {
    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr);

        let _ = tracing_subscriber::registry()
            .with(env_filter(filter))
            .with(fmt_layer)
            .try_init();
    });
}

fn env_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Run `f` inside an `operation` span recording its duration and outcome.
pub async fn track_operation<F, Fut, T, E>(operation: &str, subject: &str, f: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let safe_subject = safe_for_log(subject);
    let span = info_span!(
        "operation",
        operation = operation,
        subject = safe_subject.as_str(),
        duration_ms = tracing::field::Empty,
        success = tracing::field::Empty,
    );

    let outcome = f().instrument(span.clone()).await;
    let duration = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration);

    let _enter = span.enter();
    match &outcome {
        Ok(_) => {
            span.record("success", true);
            info!(duration_ms = duration, "Operation completed");
        }
        Err(e) => {
            span.record("success", false);
            let safe_err = safe_for_log(&e.to_string());
            error!(
                duration_ms = duration,
                error = safe_err.as_str(),
                "Operation failed"
            );
        }
    }
    outcome
}

/// Initialize tracing for tests with a simple subscriber
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
