use std::cmp::Ordering;

use regex::Regex;

use crate::{
    record::Record,
    types::{FieldValue, Literal},
};

use super::{Comparison, Operator, RuleError};

pub(super) fn evaluate<R: Record>(cmp: &Comparison, record: &R) -> Result<bool, RuleError> {
    let left = record.field(&cmp.field).ok_or_else(|| RuleError::FieldNotFound {
        field: cmp.field.clone(),
    })?;

    if let Some(operand) = &cmp.operand {
        let exempt = matches!(cmp.op, Operator::Not | Operator::Exists | Operator::Regex);
        if !exempt && operand.kind() != left.kind() {
            return Err(RuleError::TypeMismatch {
                field: cmp.field.clone(),
                kind: left.kind(),
                operand: operand.kind(),
            });
        }
    }

    match cmp.op {
        Operator::Eq => Ok(equal(&left, value_operand(cmp)?)),
        Operator::Ne => Ok(!equal(&left, value_operand(cmp)?)),
        Operator::Lt => Ok(order(cmp, &left)? == Ordering::Less),
        Operator::Gt => Ok(order(cmp, &left)? == Ordering::Greater),
        Operator::Le => Ok(order(cmp, &left)? != Ordering::Greater),
        Operator::Ge => Ok(order(cmp, &left)? != Ordering::Less),
        Operator::Not => Ok(matches!(left, FieldValue::Bool(false))),
        Operator::Exists => {
            let FieldValue::Tags(tags) = left else {
                return Err(unsupported(cmp, &left));
            };
            Ok(tags.contains(str_operand(cmp)?))
        }
        Operator::Contains => {
            let text = str_field(cmp, &left)?;
            Ok(text.contains(str_operand(cmp)?))
        }
        Operator::Prefix => {
            let text = str_field(cmp, &left)?;
            Ok(text.starts_with(str_operand(cmp)?))
        }
        Operator::Regex => {
            let text = str_field(cmp, &left)?;
            match cmp.operand.as_ref() {
                Some(Literal::Regex(re)) => Ok(re.is_match(text)),
                Some(Literal::Str(pattern)) => {
                    let re = Regex::new(pattern).map_err(|err| RuleError::InvalidRegex {
                        pattern: pattern.clone(),
                        reason: err.to_string(),
                    })?;
                    Ok(re.is_match(text))
                }
                Some(_) => Err(RuleError::InvalidOperator {
                    op: cmp.op,
                    reason: "operand must be a string or a compiled regex".to_string(),
                }),
                None => Err(missing_operand(cmp.op)),
            }
        }
    }
}

fn equal(left: &FieldValue<'_>, right: FieldValue<'_>) -> bool {
    match (left, right) {
        (FieldValue::Bool(a), FieldValue::Bool(b)) => *a == b,
        (FieldValue::Int(a), FieldValue::Int(b)) => *a == b,
        (FieldValue::Uint(a), FieldValue::Uint(b)) => *a == b,
        (FieldValue::Float(a), FieldValue::Float(b)) => *a == b,
        (FieldValue::Str(a), FieldValue::Str(b)) => *a == b,
        // DateTime equality compares instants, not offsets.
        (FieldValue::Time(a), FieldValue::Time(b)) => *a == b,
        (FieldValue::Level(a), FieldValue::Level(b)) => *a == b,
        (FieldValue::Tags(a), FieldValue::Tags(b)) => *a == b,
        (FieldValue::Composite(a), FieldValue::Composite(b)) => *a == b,
        _ => false,
    }
}

fn order(cmp: &Comparison, left: &FieldValue<'_>) -> Result<Ordering, RuleError> {
    if !left.kind().is_ordered() {
        return Err(unsupported(cmp, left));
    }
    let right = value_operand(cmp)?;
    let ord = match (left, right) {
        (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(&b),
        (FieldValue::Uint(a), FieldValue::Uint(b)) => a.cmp(&b),
        (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(&b).ok_or_else(|| {
            RuleError::InvalidOperator {
                op: cmp.op,
                reason: "NaN is unordered".to_string(),
            }
        })?,
        (FieldValue::Str(a), FieldValue::Str(b)) => a.cmp(&b),
        (FieldValue::Time(a), FieldValue::Time(b)) => a.cmp(&b),
        (FieldValue::Level(a), FieldValue::Level(b)) => a.cmp(&b),
        _ => return Err(unsupported(cmp, left)),
    };
    Ok(ord)
}

fn value_operand(cmp: &Comparison) -> Result<FieldValue<'_>, RuleError> {
    let operand = cmp.operand.as_ref().ok_or_else(|| missing_operand(cmp.op))?;
    operand.as_value().ok_or_else(|| RuleError::InvalidOperator {
        op: cmp.op,
        reason: "a compiled regex is only valid with the regex operator".to_string(),
    })
}

fn str_operand(cmp: &Comparison) -> Result<&str, RuleError> {
    match cmp.operand.as_ref() {
        Some(Literal::Str(s)) => Ok(s),
        Some(_) => Err(RuleError::InvalidOperator {
            op: cmp.op,
            reason: "operand must be a string".to_string(),
        }),
        None => Err(missing_operand(cmp.op)),
    }
}

fn str_field<'a>(cmp: &Comparison, left: &FieldValue<'a>) -> Result<&'a str, RuleError> {
    match left {
        FieldValue::Str(s) => Ok(*s),
        other => Err(unsupported(cmp, other)),
    }
}

fn unsupported(cmp: &Comparison, left: &FieldValue<'_>) -> RuleError {
    RuleError::UnsupportedFieldType {
        field: cmp.field.clone(),
        kind: left.kind(),
        op: cmp.op,
    }
}

fn missing_operand(op: Operator) -> RuleError {
    RuleError::InvalidOperator {
        op,
        reason: "operand required".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use chrono::{DateTime, FixedOffset, TimeZone, Utc};
    use serde_json::json;

    use crate::{
        record::{Entry, FieldTable, Record},
        rule::{Operator, Rule, RuleError},
        types::{FieldKind, FieldValue, Level, Tags},
    };

    struct Sample {
        ok: bool,
        count: i64,
        size: u64,
        ratio: f64,
        at: DateTime<FixedOffset>,
        meta: serde_json::Value,
        tags: Tags,
    }

    static SAMPLE_FIELDS: OnceLock<FieldTable<Sample>> = OnceLock::new();

    impl Record for Sample {
        fn field_table() -> &'static FieldTable<Self> {
            SAMPLE_FIELDS.get_or_init(|| {
                FieldTable::<Sample>::new()
                    .field("ok", |p| FieldValue::Bool(p.ok))
                    .field("count", |p| FieldValue::Int(p.count))
                    .field("size", |p| FieldValue::Uint(p.size))
                    .field("ratio", |p| FieldValue::Float(p.ratio))
                    .field("at", |p| FieldValue::Time(p.at))
                    .field("meta", |p| FieldValue::Composite(&p.meta))
                    .field("tags", |p| FieldValue::Tags(&p.tags))
            })
        }

        fn from_line(_level: Level, tags: Tags, _message: String) -> Self {
            Sample {
                tags,
                ..sample()
            }
        }

        fn date(&self) -> DateTime<Utc> {
            self.at.with_timezone(&Utc)
        }

        fn level(&self) -> Level {
            Level::Info
        }

        fn message(&self) -> &str {
            ""
        }

        fn tags(&self) -> &Tags {
            &self.tags
        }

        fn domain(&self) -> &str {
            ""
        }
    }

    fn sample() -> Sample {
        Sample {
            ok: false,
            count: -3,
            size: 10,
            ratio: 0.5,
            at: FixedOffset::east_opt(3600)
                .and_then(|tz| tz.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).single())
                .unwrap(),
            meta: json!({"a": [1, 2], "b": null}),
            tags: ["net", "tls"].into_iter().collect(),
        }
    }

    #[test]
    fn numeric_kinds_compare_within_kind() {
        let p = sample();
        assert_eq!(Rule::compare(Operator::Lt, "count", 0i64).evaluate(&p), Ok(true));
        assert_eq!(Rule::compare(Operator::Ge, "size", 10u64).evaluate(&p), Ok(true));
        assert_eq!(Rule::compare(Operator::Gt, "ratio", 0.25).evaluate(&p), Ok(true));
        assert_eq!(Rule::compare(Operator::Ne, "size", 11u64).evaluate(&p), Ok(true));
        assert_eq!(
            Rule::compare(Operator::Eq, "size", 10i64).evaluate(&p),
            Err(RuleError::TypeMismatch {
                field: "size".to_string(),
                kind: FieldKind::Uint,
                operand: FieldKind::Int,
            })
        );
    }

    #[test]
    fn timestamps_compare_as_instants() {
        let p = sample();
        let same_instant_utc = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(Rule::compare(Operator::Eq, "at", same_instant_utc).evaluate(&p), Ok(true));
        assert_eq!(Rule::compare(Operator::Le, "at", same_instant_utc).evaluate(&p), Ok(true));
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();
        assert_eq!(Rule::compare(Operator::Lt, "at", later).evaluate(&p), Ok(true));
        assert_eq!(Rule::compare(Operator::Gt, "at", later).evaluate(&p), Ok(false));
    }

    #[test]
    fn composites_use_deep_equality_and_reject_ordering() {
        let p = sample();
        assert_eq!(
            Rule::compare(Operator::Eq, "meta", json!({"b": null, "a": [1, 2]})).evaluate(&p),
            Ok(true)
        );
        assert_eq!(Rule::compare(Operator::Ne, "meta", json!({"a": []})).evaluate(&p), Ok(true));
        assert!(matches!(
            Rule::compare(Operator::Lt, "meta", json!(1)).evaluate(&p),
            Err(RuleError::UnsupportedFieldType { kind: FieldKind::Composite, .. })
        ));
        assert!(matches!(
            Rule::compare(Operator::Gt, "ok", true).evaluate(&p),
            Err(RuleError::UnsupportedFieldType { kind: FieldKind::Bool, .. })
        ));
    }

    #[test]
    fn negation_and_membership() {
        let p = sample();
        assert_eq!(Rule::unary(Operator::Not, "ok").evaluate(&p), Ok(true));
        assert_eq!(Rule::unary(Operator::Not, "count").evaluate(&p), Ok(false));
        assert_eq!(Rule::compare(Operator::Exists, "tags", "tls").evaluate(&p), Ok(true));
        assert_eq!(Rule::compare(Operator::Exists, "tags", "udp").evaluate(&p), Ok(false));
        assert!(matches!(
            Rule::compare(Operator::Exists, "count", "tls").evaluate(&p),
            Err(RuleError::UnsupportedFieldType { .. })
        ));
        assert!(matches!(
            Rule::compare(Operator::Exists, "tags", 1i64).evaluate(&p),
            Err(RuleError::InvalidOperator { op: Operator::Exists, .. })
        ));
    }

    #[test]
    fn string_operators() {
        let mut e = Entry::new(Level::Info, "connection reset by peer");
        e.pkg = "net::tcp".to_string();
        assert_eq!(Rule::compare(Operator::Contains, "msg", "reset").evaluate(&e), Ok(true));
        assert_eq!(Rule::compare(Operator::Prefix, "pkg", "net").evaluate(&e), Ok(true));
        assert_eq!(Rule::compare(Operator::Prefix, "pkg", "db").evaluate(&e), Ok(false));
        assert_eq!(Rule::compare(Operator::Regex, "msg", r"^conn\w+ reset").evaluate(&e), Ok(true));
        let compiled = regex::Regex::new("peer$").unwrap();
        assert_eq!(Rule::compare(Operator::Regex, "msg", compiled).evaluate(&e), Ok(true));
        assert!(matches!(
            Rule::compare(Operator::Regex, "msg", "(unclosed").evaluate(&e),
            Err(RuleError::InvalidRegex { .. })
        ));
        assert!(matches!(
            Rule::compare(Operator::Contains, "level", Level::Info).evaluate(&e),
            Err(RuleError::UnsupportedFieldType { .. })
        ));
        assert_eq!(Rule::compare(Operator::Lt, "msg", "d").evaluate(&e), Ok(true));
    }

    #[test]
    fn missing_field_and_operand_fail() {
        let e = Entry::new(Level::Info, "x");
        assert_eq!(
            Rule::compare(Operator::Eq, "host", "a").evaluate(&e),
            Err(RuleError::FieldNotFound {
                field: "host".to_string()
            })
        );
        assert!(matches!(
            Rule::unary(Operator::Eq, "msg").evaluate(&e),
            Err(RuleError::InvalidOperator { op: Operator::Eq, .. })
        ));
    }
}
