//! Record contract and the reference [`Entry`] record.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::types::{FieldValue, Level, Tags};

/// Typed accessor for one field of `R`.
pub type Getter<R> = for<'a> fn(&'a R) -> FieldValue<'a>;

struct FieldDef<R> {
    tag: &'static str,
    getter: Getter<R>,
    default: Option<&'static str>,
}

/// Per-type table mapping field tags to typed getters.
///
/// Built once per record type and shared by every rule evaluation and
/// formatter pass over that type.
pub struct FieldTable<R> {
    fields: Vec<FieldDef<R>>,
    by_tag: HashMap<&'static str, usize>,
}

impl<R> Default for FieldTable<R> {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            by_tag: HashMap::new(),
        }
    }
}

impl<R> FieldTable<R> {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tag`. A repeated tag replaces the earlier getter.
    pub fn field(self, tag: &'static str, getter: Getter<R>) -> Self {
        self.insert(tag, getter, None)
    }

    /// Registers `tag` with text used by formatters when the value renders empty.
    pub fn field_with_default(self, tag: &'static str, getter: Getter<R>, default: &'static str) -> Self {
        self.insert(tag, getter, Some(default))
    }

    fn insert(mut self, tag: &'static str, getter: Getter<R>, default: Option<&'static str>) -> Self {
        let def = FieldDef { tag, getter, default };
        match self.by_tag.get(tag) {
            Some(&idx) => self.fields[idx] = def,
            None => {
                self.by_tag.insert(tag, self.fields.len());
                self.fields.push(def);
            }
        }
        self
    }

    /// Reads field `tag` from `record`.
    pub fn get<'a>(&self, record: &'a R, tag: &str) -> Option<FieldValue<'a>> {
        let idx = *self.by_tag.get(tag)?;
        Some((self.fields[idx].getter)(record))
    }

    /// Default text for `tag`, if one was registered.
    pub fn default_text(&self, tag: &str) -> Option<&'static str> {
        let idx = *self.by_tag.get(tag)?;
        self.fields[idx].default
    }

    /// True when `tag` is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    /// Registered tags in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.tag)
    }
}

/// Structural contract every filterable, storable, formattable record meets.
pub trait Record: Send + Sync + 'static {
    /// Field table for this type.
    fn field_table() -> &'static FieldTable<Self>
    where
        Self: Sized;

    /// Builds a record from a raw line; used by the outer-log bridge.
    fn from_line(level: Level, tags: Tags, message: String) -> Self
    where
        Self: Sized;

    /// Time the record was produced.
    fn date(&self) -> DateTime<Utc>;

    /// Severity.
    fn level(&self) -> Level;

    /// Rendered message text.
    fn message(&self) -> &str;

    /// Attached tags.
    fn tags(&self) -> &Tags;

    /// Logical domain, empty when unset.
    fn domain(&self) -> &str;

    /// Looks up one field by tag.
    fn field(&self, tag: &str) -> Option<FieldValue<'_>>
    where
        Self: Sized,
    {
        Self::field_table().get(self, tag)
    }
}

/// Reference log record.
///
/// `file`, `pkg` and `func` describe the call site and are filled by
/// [`entry!`](crate::entry); [`Entry::new`] leaves them empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Entry {
    pub date: DateTime<Utc>,
    pub level: Level,
    pub tags: Tags,
    pub msg: String,
    /// Logical domain, e.g. the subsystem that produced the record.
    pub domain: String,
    /// `dir/file.rs:line`.
    pub file: String,
    /// Module path.
    pub pkg: String,
    pub func: String,
}

impl Entry {
    /// Entry stamped now with `level` and `msg`.
    pub fn new(level: Level, msg: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            level,
            tags: Tags::new(),
            msg: msg.into(),
            domain: String::new(),
            file: String::new(),
            pkg: String::new(),
            func: String::new(),
        }
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new(Level::NoPriority, String::new())
    }
}

static ENTRY_FIELDS: OnceLock<FieldTable<Entry>> = OnceLock::new();

impl Record for Entry {
    fn field_table() -> &'static FieldTable<Self> {
        ENTRY_FIELDS.get_or_init(|| {
            FieldTable::<Entry>::new()
                .field("date", |e| FieldValue::Time(e.date.fixed_offset()))
                .field("level", |e| FieldValue::Level(e.level))
                .field_with_default("tags", |e| FieldValue::Tags(&e.tags), "no tags")
                .field("msg", |e| FieldValue::Str(&e.msg))
                .field("domain", |e| FieldValue::Str(&e.domain))
                .field("file", |e| FieldValue::Str(&e.file))
                .field("pkg", |e| FieldValue::Str(&e.pkg))
                .field("func", |e| FieldValue::Str(&e.func))
        })
    }

    fn from_line(level: Level, tags: Tags, message: String) -> Self {
        Self {
            tags,
            ..Self::new(level, message)
        }
    }

    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn level(&self) -> Level {
        self.level
    }

    fn message(&self) -> &str {
        &self.msg
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn domain(&self) -> &str {
        &self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_fields_are_discoverable_by_tag() {
        let mut entry = Entry::new(Level::Warn, "disk almost full");
        entry.tags.insert("disk");
        entry.domain = "storage".to_string();

        let table = Entry::field_table();
        assert!(matches!(entry.field("level"), Some(FieldValue::Level(Level::Warn))));
        assert!(matches!(entry.field("msg"), Some(FieldValue::Str("disk almost full"))));
        assert!(matches!(entry.field("domain"), Some(FieldValue::Str("storage"))));
        assert!(entry.field("nope").is_none());
        assert_eq!(table.default_text("tags"), Some("no tags"));
        assert_eq!(table.default_text("msg"), None);
        assert_eq!(
            table.tags().collect::<Vec<_>>(),
            vec!["date", "level", "tags", "msg", "domain", "file", "pkg", "func"]
        );
    }

    #[test]
    fn re_registering_a_tag_replaces_it() {
        let table = FieldTable::<Entry>::new()
            .field("x", |e| FieldValue::Str(&e.msg))
            .field("x", |e| FieldValue::Level(e.level));
        let entry = Entry::new(Level::Info, "m");
        assert!(matches!(table.get(&entry, "x"), Some(FieldValue::Level(Level::Info))));
        assert_eq!(table.tags().count(), 1);
    }
}
