use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::SecondsFormat;

use crate::{failure, format::Formatter, record::Record, rule::Rule, types::FieldValue};

use super::{Backend, BackendError, SinkSettings};

/// Writes each admitted record as one logfmt line of `tag=value` pairs, one
/// pair per field in the record's field table.
///
/// Output does not go through a formatter; `set_formatter` is ignored and
/// `formatter` is always `None`.
pub struct Logfmt<W, R: Record> {
    out: Mutex<W>,
    settings: SinkSettings<R>,
}

impl<W: Write + Send + 'static, R: Record> Logfmt<W, R> {
    /// Sink over `out`.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            settings: SinkSettings::default(),
        }
    }

    /// Swaps the output, returning the previous one.
    pub fn replace_output(&self, out: W) -> W {
        let mut guard = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, out)
    }
}

/// One logfmt line for `record`, without the trailing newline.
///
/// ```
/// use fieldlog::{backend::logfmt::encode, record::Entry, types::Level};
///
/// let mut e = Entry::new(Level::Warn, "disk full");
/// e.domain = "storage".to_string();
/// let line = encode(&e);
/// assert!(line.contains(r#"level=warning tags= msg="disk full" domain=storage"#));
/// ```
pub fn encode<R: Record>(record: &R) -> String {
    let table = R::field_table();
    let mut line = String::new();
    for tag in table.tags() {
        let Some(value) = table.get(record, tag) else {
            continue;
        };
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(tag);
        line.push('=');
        push_value(&mut line, &value_text(value));
    }
    line
}

fn value_text(value: FieldValue<'_>) -> String {
    match value {
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::Int(v) => v.to_string(),
        FieldValue::Uint(v) => v.to_string(),
        FieldValue::Float(v) => v.to_string(),
        FieldValue::Str(v) => v.to_string(),
        FieldValue::Time(v) => v.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        FieldValue::Level(v) => v.as_str().to_string(),
        FieldValue::Tags(v) => v.to_string(),
        FieldValue::Composite(v) => v.to_string(),
    }
}

fn needs_quotes(value: &str) -> bool {
    value == "null" || value.chars().any(|c| c <= ' ' || c == '=' || c == '"' || c == '\u{7f}')
}

fn push_value(line: &mut String, value: &str) {
    if !needs_quotes(value) {
        line.push_str(value);
        return;
    }
    line.push('"');
    for c in value.chars() {
        match c {
            '"' => line.push_str("\\\""),
            '\\' => line.push_str("\\\\"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            '\t' => line.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(line, "\\u{:04x}", c as u32);
            }
            c => line.push(c),
        }
    }
    line.push('"');
}

#[async_trait]
impl<W: Write + Send + 'static, R: Record> Backend<R> for Logfmt<W, R> {
    async fn commit(&self, record: Arc<R>) {
        if !self.settings.admits(record.as_ref()) {
            return;
        }
        let mut line = encode(record.as_ref());
        line.push('\n');
        let written = self
            .out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(line.as_bytes());
        if let Err(err) = written {
            failure::report(&BackendError::Io(err), record.as_ref());
        }
    }

    fn formatter(&self) -> Option<Arc<dyn Formatter<R>>> {
        None
    }

    fn set_formatter(&self, _formatter: Arc<dyn Formatter<R>>) {}

    fn set_filter(&self, rule: Rule) {
        self.settings.set_filter(rule);
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner).flush()?;
        Ok(())
    }
}
