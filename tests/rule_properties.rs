use proptest::prelude::*;

use fieldlog::{
    record::Entry,
    rule::{Operator, Rule, RuleError},
    types::Level,
};

fn level_strategy() -> impl Strategy<Value = Level> {
    prop::sample::select(Level::ALL.to_vec())
}

fn entry_strategy() -> impl Strategy<Value = Entry> {
    (level_strategy(), "[a-z ]{0,12}", "[a-z:]{0,8}").prop_map(|(level, msg, pkg)| {
        let mut e = Entry::new(level, msg);
        e.pkg = pkg;
        e
    })
}

/// Rules that always evaluate on an [`Entry`].
fn valid_rule() -> impl Strategy<Value = Rule> {
    let leaf = prop_oneof![
        Just(Rule::True),
        Just(Rule::False),
        (level_strategy(), prop::sample::select(vec![Operator::Lt, Operator::Ge, Operator::Eq]))
            .prop_map(|(level, op)| Rule::compare(op, "level", level)),
        "[a-z]{1,2}".prop_map(|needle| Rule::compare(Operator::Contains, "msg", needle)),
        "[a-z:]{0,3}".prop_map(|prefix| Rule::compare(Operator::Prefix, "pkg", prefix)),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Rule::and),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Rule::or),
            inner.clone().prop_map(Rule::not),
            (inner.clone(), inner.clone()).prop_map(|(c, t)| Rule::when(c, t)),
            (inner.clone(), inner.clone(), inner).prop_map(|(c, t, o)| Rule::if_else(c, t, o)),
        ]
    })
}

proptest! {
    #[test]
    fn double_negation_preserves_result(rule in valid_rule(), e in entry_strategy()) {
        prop_assert_eq!(Rule::not(Rule::not(rule.clone())).evaluate(&e), rule.evaluate(&e));
    }

    #[test]
    fn and_or_follow_their_children(rules in prop::collection::vec(valid_rule(), 0..5), e in entry_strategy()) {
        let each: Vec<bool> = rules
            .iter()
            .map(|r| r.evaluate(&e).expect("valid rule"))
            .collect();
        prop_assert_eq!(Rule::and(rules.clone()).evaluate(&e), Ok(each.iter().all(|v| *v)));
        prop_assert_eq!(Rule::or(rules).evaluate(&e), Ok(each.iter().any(|v| *v)));
    }

    #[test]
    fn when_is_implication(c in valid_rule(), t in valid_rule(), e in entry_strategy()) {
        let cond = c.evaluate(&e).expect("valid rule");
        let then = t.evaluate(&e).expect("valid rule");
        prop_assert_eq!(Rule::when(c, t).evaluate(&e), Ok(!cond || then));
    }

    #[test]
    fn level_threshold_matches_ordering(threshold in level_strategy(), e in entry_strategy()) {
        let rule = Rule::compare(Operator::Ge, "level", threshold);
        prop_assert_eq!(rule.evaluate(&e), Ok(e.level >= threshold));
    }
}

#[test]
fn unknown_field_is_reported() {
    let rule = Rule::compare(Operator::Eq, "colour", "red");
    assert_eq!(
        rule.evaluate(&Entry::new(Level::Info, "x")),
        Err(RuleError::FieldNotFound {
            field: "colour".to_string()
        })
    );
}

#[test]
fn operand_kind_must_match_field() {
    let rule = Rule::compare(Operator::Eq, "level", "warning");
    assert!(matches!(
        rule.evaluate(&Entry::new(Level::Warn, "x")),
        Err(RuleError::TypeMismatch { .. })
    ));
}

#[test]
fn string_operators_reject_non_string_fields() {
    let rule = Rule::compare(Operator::Contains, "level", Level::Warn);
    assert!(matches!(
        rule.evaluate(&Entry::new(Level::Warn, "x")),
        Err(RuleError::UnsupportedFieldType { .. })
    ));
}

#[test]
fn tags_membership() {
    let mut e = Entry::new(Level::Info, "x");
    e.tags.insert("db");
    assert_eq!(Rule::compare(Operator::Exists, "tags", "db").evaluate(&e), Ok(true));
    assert_eq!(Rule::compare(Operator::Exists, "tags", "net").evaluate(&e), Ok(false));
}

#[test]
fn broken_regex_is_reported() {
    let rule = Rule::compare(Operator::Regex, "msg", "(unclosed");
    assert!(matches!(
        rule.evaluate(&Entry::new(Level::Info, "x")),
        Err(RuleError::InvalidRegex { .. })
    ));
}
