//! Process-wide failure hook.
//!
//! Failures that happen while delivering a record (a rule that cannot be
//! evaluated, a store write that fails, a queue that is gone) never reach the
//! producer. They are handed to the hook instead. The default hook emits a
//! `tracing` error event and writes a fixed-format line to stderr.

use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::{format::host_name, record::Record, types::Level};

type Hook = Arc<dyn Fn(&FailureReport) + Send + Sync>;

static HOOK: RwLock<Option<Hook>> = RwLock::new(None);

/// The record a failure happened on. Apart from `host`, every field is
/// copied from the record as it stood when delivery failed.
#[derive(Debug, Clone)]
pub struct RecordSummary {
    /// See [`host_name`].
    pub host: String,
    #[allow(missing_docs)]
    pub domain: String,
    #[allow(missing_docs)]
    pub date: DateTime<Utc>,
    #[allow(missing_docs)]
    pub level: Level,
    /// Comma-separated.
    pub tags: String,
    #[allow(missing_docs)]
    pub message: String,
}

/// One delivery failure.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// Rendered error.
    pub error: String,
    /// The record being delivered, when there was one.
    pub record: Option<RecordSummary>,
}

impl FailureReport {
    /// Report for `error` raised while delivering `record`.
    pub fn for_record<R: Record>(error: &dyn fmt::Display, record: &R) -> Self {
        Self {
            error: error.to_string(),
            record: Some(RecordSummary {
                host: host_name(),
                domain: record.domain().to_string(),
                date: record.date(),
                level: record.level(),
                tags: record.tags().to_string(),
                message: record.message().to_string(),
            }),
        }
    }

    /// Report for `error` with no record attached.
    pub fn bare(error: &dyn fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            record: None,
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LOG IS IN PANIC: {}", self.error)?;
        if let Some(r) = &self.record {
            write!(
                f,
                "\n{} - {} - {} - {} - {} - {}",
                r.host,
                r.domain,
                r.date.to_rfc3339(),
                r.level,
                r.tags,
                r.message
            )?;
        }
        Ok(())
    }
}

/// Installs `hook`, replacing the current one.
pub fn set_failure_hook(hook: impl Fn(&FailureReport) + Send + Sync + 'static) {
    *HOOK.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
}

/// Restores the default hook.
pub fn reset_failure_hook() {
    *HOOK.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Reports `error` raised while delivering `record`.
pub fn report<R: Record>(error: &dyn fmt::Display, record: &R) {
    dispatch(&FailureReport::for_record(error, record));
}

/// Reports `error` with no record attached.
pub fn report_bare(error: &dyn fmt::Display) {
    dispatch(&FailureReport::bare(error));
}

fn dispatch(report: &FailureReport) {
    let hook = HOOK.read().unwrap_or_else(PoisonError::into_inner).clone();
    run_hook(hook.as_ref(), report);
}

fn run_hook(hook: Option<&Hook>, report: &FailureReport) {
    match hook {
        Some(hook) => {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(report))).is_err() {
                default_hook(report);
            }
        }
        None => default_hook(report),
    }
}

fn default_hook(report: &FailureReport) {
    tracing::error!(
        target: "fieldlog::failure",
        error = %report.error,
        has_record = report.record.is_some(),
        "record delivery failed"
    );
    let _ = writeln!(io::stderr().lock(), "{report}");
}
