//! Pump Ledger - petrol pump back office.
//!
//! Daily sales entry per pump/nozzle, credit-customer tracking, expense
//! logging, fuel-tank DIP readings, monthly reporting, and role-based user
//! administration over a local SQLite store. The web UI and PDF export are
//! external collaborators; they call the operation functions in these
//! modules and render the JSON they return.

use chrono::NaiveDate;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod access;
pub mod config;
pub mod credits;
pub mod db;
pub mod expenses;
pub mod reports;
pub mod sheets;
pub mod tanks;
pub mod users;

/// Initialize structured logging (console + daily rolling file).
///
/// Call once at process start. Logs go to stdout and, when `log_dir` is
/// given, to daily files `pump-ledger.<date>` in that directory.
pub fn init_logging(log_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pump_ledger=debug"));

    let console_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir).ok();
        let file_appender = tracing_appender::rolling::daily(dir, "pump-ledger");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);
        registry.with(file_layer).init();
        // Keep the guard alive for the lifetime of the process — dropping it
        // flushes logs. We leak it intentionally since logging runs until exit.
        std::mem::forget(guard);
    } else {
        registry.init();
    }

    info!("Pump Ledger v{} logging initialized", env!("CARGO_PKG_VERSION"));
}

/// Collapse an operation result into the uniform response contract:
/// `Ok` passes through, `Err` becomes `{"success": false, "error": ...}`.
///
/// The HTTP collaborator serializes this directly; no failure propagates
/// as an uncaught fault.
pub fn to_response(result: Result<serde_json::Value, String>) -> serde_json::Value {
    match result {
        Ok(v) => v,
        Err(e) => serde_json::json!({ "success": false, "error": e }),
    }
}

pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_f64(v: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_f64()) {
            return Some(n);
        }
        // Form inputs arrive as strings
        if let Some(n) = v
            .get(*key)
            .and_then(|x| x.as_str())
            .and_then(|s| s.trim().parse::<f64>().ok())
        {
            return Some(n);
        }
    }
    None
}

pub(crate) fn value_i64(v: &serde_json::Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_i64()) {
            return Some(n);
        }
    }
    None
}

/// Validate a `YYYY-MM-DD` calendar date and return it normalized.
pub(crate) fn normalize_date(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| format!("Invalid date: {trimmed} (expected YYYY-MM-DD)"))
}
