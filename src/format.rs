//! Record formatters.
//!
//! ```
//! use fieldlog::{format::{Formatter, TemplateFormatter}, record::Entry, types::Level};
//!
//! let fmt = TemplateFormatter::new("::", "::level - ::msg").unwrap();
//! let line = Formatter::<Entry>::format(&fmt, &Entry::new(Level::Warn, "disk full")).unwrap();
//! assert_eq!(line, b"warning - disk full");
//! ```

use std::io::{self, Write};

use chrono::format::{Item, StrftimeItems};
use hashbrown::HashMap;

use crate::{
    record::Record,
    types::{FieldValue, Level, Tags},
};

/// Template used by [`TemplateFormatter::standard`].
pub const STANDARD_TEMPLATE: &str = "::host - ::domain - ::date - ::level - ::tags - ::file - ::msg";

/// Default placeholder mark.
pub const DEFAULT_MARK: &str = "::";

/// Default chrono format for timestamps, RFC 822 style.
pub const DEFAULT_TIME_FORMAT: &str = "%d %b %y %H:%M %Z";

/// Formatter failures.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Empty placeholder mark.
    #[error("invalid mark")]
    InvalidMark,
    /// Empty template.
    #[error("invalid template")]
    InvalidTemplate,
    /// The chrono format string has an unknown specifier.
    #[error("invalid time format {0:?}")]
    InvalidTimeFormat(String),
    /// Writing the output failed.
    #[error("format io: {0}")]
    Io(#[from] io::Error),
}

/// Turns records of type `R` into bytes.
///
/// Backends hold formatters as `Arc<dyn Formatter<R>>`, so the `set_*`
/// methods only apply while configuring a formatter that is not installed
/// yet. To change an installed formatter, install a new one with
/// [`Backend::set_formatter`](crate::backend::Backend::set_formatter) or
/// [`Logger::set_template`](crate::logger::Logger::set_template).
pub trait Formatter<R: Record>: Send + Sync {
    /// Renders `record`.
    fn format(&self, record: &R) -> Result<Vec<u8>, FormatError>;

    /// Replaces the placeholder mark.
    fn set_mark(&mut self, mark: &str) -> Result<(), FormatError>;

    /// Replaces the template.
    fn set_template(&mut self, template: &str) -> Result<(), FormatError>;

    /// Replaces the timestamp format.
    fn set_time_format(&mut self, format: &str) -> Result<(), FormatError>;

    /// Builds a fresh record of the formatter's record type.
    fn new_entry(&self, level: Level, tags: Tags, message: String) -> R {
        R::from_line(level, tags, message)
    }
}

/// Renders `record`, degrading a formatting failure to a fixed diagnostic line.
pub fn render<R: Record>(formatter: &dyn Formatter<R>, record: &R) -> Vec<u8> {
    formatter
        .format(record)
        .unwrap_or_else(|err| format!("Can't format the log entry: {err}").into_bytes())
}

/// Host name reported by log lines: `$HOSTNAME`, else `no name`.
pub fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "no name".to_string())
}

/// Placeholder template formatter.
///
/// `<mark><name>` is replaced with the record field `name`, else the extra
/// value `name`, else the field's registered default, else nothing. A name
/// ends at a space, a newline, or the end of the template. Substituted text
/// is never scanned for marks. Double spaces collapse to one afterwards.
#[derive(Debug, Clone)]
pub struct TemplateFormatter {
    mark: String,
    template: String,
    time_format: String,
    values: HashMap<String, String>,
}

impl TemplateFormatter {
    /// Formatter over `template` with no extra values.
    pub fn new(mark: &str, template: &str) -> Result<Self, FormatError> {
        Self::with_values(mark, template, HashMap::new())
    }

    /// Formatter over `template`; `values` fill placeholders that are not record fields.
    pub fn with_values(
        mark: &str,
        template: &str,
        values: HashMap<String, String>,
    ) -> Result<Self, FormatError> {
        if mark.is_empty() {
            return Err(FormatError::InvalidMark);
        }
        if template.is_empty() {
            return Err(FormatError::InvalidTemplate);
        }
        Ok(Self {
            mark: mark.to_string(),
            template: template.to_string(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            values,
        })
    }

    /// `host - domain - date - level - tags - file - msg`, with `host` taken
    /// from [`host_name`].
    pub fn standard() -> Self {
        let mut values = HashMap::new();
        values.insert("host".to_string(), host_name());
        Self {
            mark: DEFAULT_MARK.to_string(),
            template: STANDARD_TEMPLATE.to_string(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            values,
        }
    }

    /// Placeholder mark.
    pub fn mark(&self) -> &str {
        &self.mark
    }

    /// Template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Sets an extra value.
    pub fn insert_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    fn replace_mark(&mut self, mark: &str) -> Result<(), FormatError> {
        if mark.is_empty() {
            return Err(FormatError::InvalidMark);
        }
        self.mark = mark.to_string();
        Ok(())
    }

    fn replace_template(&mut self, template: &str) -> Result<(), FormatError> {
        if template.is_empty() {
            return Err(FormatError::InvalidTemplate);
        }
        self.template = template.to_string();
        Ok(())
    }

    fn replace_time_format(&mut self, format: &str) -> Result<(), FormatError> {
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(FormatError::InvalidTimeFormat(format.to_string()));
        }
        self.time_format = format.to_string();
        Ok(())
    }

    fn write_value(&self, out: &mut Vec<u8>, value: FieldValue<'_>) -> io::Result<()> {
        match value {
            FieldValue::Bool(v) => write!(out, "{v}"),
            FieldValue::Int(v) => write!(out, "{v}"),
            FieldValue::Uint(v) => write!(out, "{v}"),
            FieldValue::Float(v) => write!(out, "{v:.2}"),
            FieldValue::Str(v) => out.write_all(v.as_bytes()),
            FieldValue::Time(v) => write!(out, "{}", v.format(&self.time_format)),
            FieldValue::Level(v) => out.write_all(v.as_str().as_bytes()),
            FieldValue::Tags(v) => write!(out, "{v}"),
            FieldValue::Composite(v) => write!(out, "{v}"),
        }
    }

    fn substitute<R: Record>(&self, out: &mut Vec<u8>, record: &R, name: &str) -> io::Result<()> {
        let table = R::field_table();
        let before = out.len();
        if let Some(value) = table.get(record, name) {
            self.write_value(out, value)?;
        } else if let Some(value) = self.values.get(name) {
            out.write_all(value.as_bytes())?;
        }
        if out.len() == before {
            if let Some(default) = table.default_text(name) {
                out.write_all(default.as_bytes())?;
            }
        }
        Ok(())
    }
}

impl<R: Record> Formatter<R> for TemplateFormatter {
    fn format(&self, record: &R) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::with_capacity(self.template.len() * 2);
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find(self.mark.as_str()) {
            out.write_all(rest[..start].as_bytes())?;
            let after = &rest[start + self.mark.len()..];
            let end = after.find([' ', '\n']).unwrap_or(after.len());
            self.substitute(&mut out, record, &after[..end])?;
            rest = &after[end..];
        }
        out.write_all(rest.as_bytes())?;
        Ok(collapse_double_spaces(out))
    }

    fn set_mark(&mut self, mark: &str) -> Result<(), FormatError> {
        self.replace_mark(mark)
    }

    fn set_template(&mut self, template: &str) -> Result<(), FormatError> {
        self.replace_template(template)
    }

    fn set_time_format(&mut self, format: &str) -> Result<(), FormatError> {
        self.replace_time_format(format)
    }
}

fn collapse_double_spaces(bytes: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.into_iter().peekable();
    while let Some(b) = iter.next() {
        out.push(b);
        if b == b' ' && iter.peek() == Some(&b' ') {
            iter.next();
        }
    }
    out
}
