//! Boolean rules over record fields.
//!
//! ```
//! use fieldlog::{record::Entry, rule::{Operator, Rule}, types::Level};
//!
//! let at_least_warn = Rule::compare(Operator::Ge, "level", Level::Warn);
//! assert!(!at_least_warn.evaluate(&Entry::new(Level::Info, "hi")).unwrap());
//! assert!(at_least_warn.evaluate(&Entry::new(Level::Error, "boom")).unwrap());
//! ```

mod compare;

use std::fmt;

use crate::{
    record::Record,
    types::{FieldKind, Literal},
};

/// Comparison operator applied to one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Greater than.
    Gt,
    /// Less or equal.
    Le,
    /// Greater or equal.
    Ge,
    /// True when the field is a boolean set to false. Takes no operand.
    Not,
    /// Tag-set membership of a string operand.
    Exists,
    /// Substring match.
    Contains,
    /// Regular expression match.
    Regex,
    /// String prefix match.
    Prefix,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Gt => "gt",
            Operator::Le => "le",
            Operator::Ge => "ge",
            Operator::Not => "not",
            Operator::Exists => "exists",
            Operator::Contains => "contains",
            Operator::Regex => "regex",
            Operator::Prefix => "prefix",
        };
        f.write_str(name)
    }
}

/// Rule evaluation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// The record has no field with this tag.
    #[error("field {field:?} not found in record")]
    FieldNotFound {
        /// Field tag.
        field: String,
    },
    /// The operand's kind differs from the field's kind.
    #[error("operand of kind {operand} does not match field {field:?} of kind {kind}")]
    TypeMismatch {
        /// Field tag.
        field: String,
        /// Field kind.
        kind: FieldKind,
        /// Operand kind.
        operand: FieldKind,
    },
    /// The operator is not defined for the field's kind.
    #[error("operator {op} is not supported for field {field:?} of kind {kind}")]
    UnsupportedFieldType {
        /// Field tag.
        field: String,
        /// Field kind.
        kind: FieldKind,
        /// Operator.
        op: Operator,
    },
    /// The operator was used without a required operand, or with one of the wrong shape.
    #[error("invalid use of operator {op}: {reason}")]
    InvalidOperator {
        /// Operator.
        op: Operator,
        /// What was wrong.
        reason: String,
    },
    /// A string regex operand did not compile.
    #[error("invalid regular expression {pattern:?}: {reason}")]
    InvalidRegex {
        /// Pattern text.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}

/// Leaf comparison of one field against an optional operand.
#[derive(Debug, Clone)]
pub struct Comparison {
    field: String,
    op: Operator,
    operand: Option<Literal>,
}

impl Comparison {
    /// Field tag this comparison reads.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Operator.
    pub fn op(&self) -> Operator {
        self.op
    }

    /// Operand, absent for [`Operator::Not`].
    pub fn operand(&self) -> Option<&Literal> {
        self.operand.as_ref()
    }
}

/// Immutable rule tree.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Compare one field.
    Compare(Comparison),
    /// True when every child is true. Every child is evaluated.
    And(Vec<Rule>),
    /// True when any child is true. Every child is evaluated.
    Or(Vec<Rule>),
    /// Negation.
    Not(Box<Rule>),
    /// `then` when `condition` holds, true otherwise.
    If {
        /// Guard.
        condition: Box<Rule>,
        /// Rule applied when the guard holds.
        then: Box<Rule>,
    },
    /// `then` when `condition` holds, `otherwise` otherwise.
    IfElse {
        /// Guard.
        condition: Box<Rule>,
        /// Rule applied when the guard holds.
        then: Box<Rule>,
        /// Rule applied when it does not.
        otherwise: Box<Rule>,
    },
    /// First branch whose condition holds decides; `default` when none does.
    Select {
        /// Condition/rule pairs, tried in order.
        branches: Vec<(Rule, Rule)>,
        /// Fallback rule.
        default: Box<Rule>,
    },
    /// Always true.
    True,
    /// Always false.
    False,
}

impl Rule {
    /// Compares field `field` with `operand`.
    pub fn compare(op: Operator, field: impl Into<String>, operand: impl Into<Literal>) -> Self {
        Rule::Compare(Comparison {
            field: field.into(),
            op,
            operand: Some(operand.into()),
        })
    }

    /// Applies an operator that takes no operand, such as [`Operator::Not`].
    pub fn unary(op: Operator, field: impl Into<String>) -> Self {
        Rule::Compare(Comparison {
            field: field.into(),
            op,
            operand: None,
        })
    }

    /// Conjunction.
    pub fn and(rules: impl IntoIterator<Item = Rule>) -> Self {
        Rule::And(rules.into_iter().collect())
    }

    /// Disjunction.
    pub fn or(rules: impl IntoIterator<Item = Rule>) -> Self {
        Rule::Or(rules.into_iter().collect())
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(rule: Rule) -> Self {
        Rule::Not(Box::new(rule))
    }

    /// Applies `then` only when `condition` holds.
    pub fn when(condition: Rule, then: Rule) -> Self {
        Rule::If {
            condition: Box::new(condition),
            then: Box::new(then),
        }
    }

    /// Two-way conditional.
    pub fn if_else(condition: Rule, then: Rule, otherwise: Rule) -> Self {
        Rule::IfElse {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// Switch over condition/rule pairs.
    pub fn select(branches: impl IntoIterator<Item = (Rule, Rule)>, default: Rule) -> Self {
        Rule::Select {
            branches: branches.into_iter().collect(),
            default: Box::new(default),
        }
    }

    /// Evaluates the rule against `record`.
    pub fn evaluate<R: Record>(&self, record: &R) -> Result<bool, RuleError> {
        match self {
            Rule::Compare(cmp) => compare::evaluate(cmp, record),
            Rule::And(rules) => {
                let mut out = true;
                let mut first_err = None;
                for rule in rules {
                    match rule.evaluate(record) {
                        Ok(v) => out = out && v,
                        Err(err) => {
                            first_err.get_or_insert(err);
                        }
                    }
                }
                first_err.map_or(Ok(out), Err)
            }
            Rule::Or(rules) => {
                let mut out = false;
                let mut first_err = None;
                for rule in rules {
                    match rule.evaluate(record) {
                        Ok(v) => out = out || v,
                        Err(err) => {
                            first_err.get_or_insert(err);
                        }
                    }
                }
                first_err.map_or(Ok(out), Err)
            }
            Rule::Not(rule) => Ok(!rule.evaluate(record)?),
            Rule::If { condition, then } => {
                if condition.evaluate(record)? {
                    then.evaluate(record)
                } else {
                    Ok(true)
                }
            }
            Rule::IfElse {
                condition,
                then,
                otherwise,
            } => {
                if condition.evaluate(record)? {
                    then.evaluate(record)
                } else {
                    otherwise.evaluate(record)
                }
            }
            Rule::Select { branches, default } => {
                for (condition, rule) in branches {
                    if condition.evaluate(record)? {
                        return rule.evaluate(record);
                    }
                }
                default.evaluate(record)
            }
            Rule::True => Ok(true),
            Rule::False => Ok(false),
        }
    }
}
