//! Shared primitive types: severity levels, tag sets, and field values.

use std::{fmt, str::FromStr};

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    /// Wire-level protocol chatter.
    Protocol,
    /// Debugging detail.
    Debug,
    /// Informational.
    Info,
    /// Something looks wrong.
    Warn,
    /// An operation failed.
    Error,
    /// The process cannot continue.
    Fatal,
    /// Unrecoverable programming error.
    Panic,
    /// Level was never set.
    NoPriority,
}

impl Level {
    /// All levels in ascending order.
    pub const ALL: [Level; 8] = [
        Level::Protocol,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
        Level::Panic,
        Level::NoPriority,
    ];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Protocol => "protocol",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
            Level::NoPriority => "no priority",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a [`Level`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid priority: {0:?}")]
pub struct LevelParseError(pub String);

impl FromStr for Level {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| LevelParseError(s.to_string()))
    }
}

/// Sorted, de-duplicated set of tag labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(Vec<String>);

impl Tags {
    /// Empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `tag`; returns false if it was already present.
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        match self.0.binary_search(&tag) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, tag);
                true
            }
        }
    }

    /// Membership test.
    pub fn contains(&self, tag: &str) -> bool {
        self.0.binary_search_by(|t| t.as_str().cmp(tag)).is_ok()
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no tags are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for Tags {
    fn from(mut value: Vec<String>) -> Self {
        value.sort();
        value.dedup();
        Self(value)
    }
}

impl From<Tags> for Vec<String> {
    fn from(value: Tags) -> Self {
        value.0
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        iter.into_iter().map(Into::into).collect::<Vec<String>>().into()
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Kind of a field or literal; two values are comparable only when their
/// kinds are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `bool`.
    Bool,
    /// Signed integer.
    Int,
    /// Unsigned integer.
    Uint,
    /// Floating point.
    Float,
    /// UTF-8 string.
    Str,
    /// Point in time.
    Time,
    /// Severity level.
    Level,
    /// Tag set.
    Tags,
    /// Opaque structured value, compared by deep equality only.
    Composite,
    /// Pre-compiled regular expression (literals only).
    Regex,
}

impl FieldKind {
    /// Kinds that support `<`, `>`, `<=`, `>=`.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            FieldKind::Int
                | FieldKind::Uint
                | FieldKind::Float
                | FieldKind::Level
                | FieldKind::Str
                | FieldKind::Time
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Uint => "uint",
            FieldKind::Float => "float",
            FieldKind::Str => "string",
            FieldKind::Time => "time",
            FieldKind::Level => "level",
            FieldKind::Tags => "tags",
            FieldKind::Composite => "composite",
            FieldKind::Regex => "regex",
        };
        f.write_str(name)
    }
}

/// Borrowed view of one record field.
#[derive(Debug, Clone, Copy)]
pub enum FieldValue<'a> {
    /// Boolean field.
    Bool(bool),
    /// Signed integer field.
    Int(i64),
    /// Unsigned integer field.
    Uint(u64),
    /// Float field.
    Float(f64),
    /// String field.
    Str(&'a str),
    /// Timestamp field; equality and ordering are by instant.
    Time(DateTime<FixedOffset>),
    /// Level field.
    Level(Level),
    /// Tag set field.
    Tags(&'a Tags),
    /// Opaque composite field.
    Composite(&'a serde_json::Value),
}

impl FieldValue<'_> {
    /// Kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Uint(_) => FieldKind::Uint,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Str(_) => FieldKind::Str,
            FieldValue::Time(_) => FieldKind::Time,
            FieldValue::Level(_) => FieldKind::Level,
            FieldValue::Tags(_) => FieldKind::Tags,
            FieldValue::Composite(_) => FieldKind::Composite,
        }
    }
}

/// Owned rule operand.
#[derive(Debug, Clone)]
pub enum Literal {
    /// Boolean operand.
    Bool(bool),
    /// Signed integer operand.
    Int(i64),
    /// Unsigned integer operand.
    Uint(u64),
    /// Float operand.
    Float(f64),
    /// String operand.
    Str(String),
    /// Timestamp operand.
    Time(DateTime<FixedOffset>),
    /// Level operand.
    Level(Level),
    /// Tag set operand.
    Tags(Tags),
    /// Composite operand.
    Composite(serde_json::Value),
    /// Pre-compiled pattern for [`crate::rule::Operator::Regex`].
    Regex(Regex),
}

impl Literal {
    /// Kind of this operand.
    pub fn kind(&self) -> FieldKind {
        match self {
            Literal::Regex(_) => FieldKind::Regex,
            other => other.as_value().map(|v| v.kind()).unwrap_or(FieldKind::Regex),
        }
    }

    /// Borrowed field view of this operand, `None` for a compiled regex.
    pub fn as_value(&self) -> Option<FieldValue<'_>> {
        Some(match self {
            Literal::Bool(v) => FieldValue::Bool(*v),
            Literal::Int(v) => FieldValue::Int(*v),
            Literal::Uint(v) => FieldValue::Uint(*v),
            Literal::Float(v) => FieldValue::Float(*v),
            Literal::Str(v) => FieldValue::Str(v),
            Literal::Time(v) => FieldValue::Time(*v),
            Literal::Level(v) => FieldValue::Level(*v),
            Literal::Tags(v) => FieldValue::Tags(v),
            Literal::Composite(v) => FieldValue::Composite(v),
            Literal::Regex(_) => return None,
        })
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int(i64::from(value))
    }
}

impl From<u64> for Literal {
    fn from(value: u64) -> Self {
        Literal::Uint(value)
    }
}

impl From<u32> for Literal {
    fn from(value: u32) -> Self {
        Literal::Uint(u64::from(value))
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value)
    }
}

impl<Tz: chrono::TimeZone> From<DateTime<Tz>> for Literal {
    fn from(value: DateTime<Tz>) -> Self {
        Literal::Time(value.fixed_offset())
    }
}

impl From<Level> for Literal {
    fn from(value: Level) -> Self {
        Literal::Level(value)
    }
}

impl From<Tags> for Literal {
    fn from(value: Tags) -> Self {
        Literal::Tags(value)
    }
}

impl From<serde_json::Value> for Literal {
    fn from(value: serde_json::Value) -> Self {
        Literal::Composite(value)
    }
}

impl From<Regex> for Literal {
    fn from(value: Regex) -> Self {
        Literal::Regex(value)
    }
}
