//! Assumption rules: condition matching over instrument attributes.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::params::BehavioralParams;
use crate::error::AlmError;
use crate::instruments::InstrumentAttributes;
use crate::AlmResult;

/// What a rule is keyed on. Informational: matching always evaluates the
/// full condition map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumptionRuleType {
    CounterpartyName,
    CounterpartyType,
    InstrumentClass,
    InstrumentSubclass,
    Currency,
    AmountThreshold,
    MaturityBucket,
    Combined,
}

/// A scalar attribute value as it appears in instrument data or in a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(Decimal),
    Text(String),
}

impl AttributeValue {
    pub fn text(s: impl Into<String>) -> Self {
        AttributeValue::Text(s.into())
    }

    fn as_number(&self) -> Option<Decimal> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse::<Decimal>().ok(),
            AttributeValue::Bool(_) => None,
        }
    }

    /// Equality that tolerates numbers written as strings on either side.
    fn loosely_eq(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a == b,
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a == b,
            (AttributeValue::Bool(_), _) | (_, AttributeValue::Bool(_)) => false,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Many(Vec<AttributeValue>),
    One(AttributeValue),
}

impl Operand {
    fn contains(&self, value: &AttributeValue) -> bool {
        match self {
            Operand::Many(list) => list.iter().any(|v| v.loosely_eq(value)),
            Operand::One(v) => v.loosely_eq(value),
        }
    }

    fn single(&self) -> Option<&AttributeValue> {
        match self {
            Operand::One(v) => Some(v),
            Operand::Many(list) if list.len() == 1 => list.first(),
            Operand::Many(_) => None,
        }
    }
}

/// One entry of a rule's condition map.
///
/// JSON shapes: `"retail"` (equality), `["RUB", "USD"]` (membership),
/// `{">=": 1000000, "<": 5000000}` (every operator must hold).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Equals(AttributeValue),
    OneOf(Vec<AttributeValue>),
    Operators(BTreeMap<ConditionOperator, Operand>),
}

impl Condition {
    pub fn matches(&self, value: Option<&AttributeValue>) -> bool {
        match self {
            Condition::Equals(expected) => value.is_some_and(|v| v.loosely_eq(expected)),
            Condition::OneOf(list) => {
                value.is_some_and(|v| list.iter().any(|candidate| candidate.loosely_eq(v)))
            }
            Condition::Operators(ops) => ops
                .iter()
                .all(|(op, operand)| check_operator(*op, operand, value)),
        }
    }
}

fn check_operator(op: ConditionOperator, operand: &Operand, value: Option<&AttributeValue>) -> bool {
    let Some(value) = value else {
        // An absent attribute is trivially outside any list and unequal to
        // any value; every other comparison fails.
        return matches!(op, ConditionOperator::NotIn | ConditionOperator::Ne);
    };
    match op {
        ConditionOperator::In => operand.contains(value),
        ConditionOperator::NotIn => !operand.contains(value),
        ConditionOperator::Eq => operand.contains(value),
        ConditionOperator::Ne => !operand.contains(value),
        ConditionOperator::Gte
        | ConditionOperator::Lte
        | ConditionOperator::Gt
        | ConditionOperator::Lt => {
            let (Some(lhs), Some(rhs)) = (
                value.as_number(),
                operand.single().and_then(|v| v.as_number()),
            ) else {
                return false;
            };
            match op {
                ConditionOperator::Gte => lhs >= rhs,
                ConditionOperator::Lte => lhs <= rhs,
                ConditionOperator::Gt => lhs > rhs,
                _ => lhs < rhs,
            }
        }
    }
}

fn default_active() -> bool {
    true
}

/// A behavioral assumption rule: when every condition holds for an
/// instrument, `assumptions` apply to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionRule {
    pub rule_id: String,
    pub rule_type: AssumptionRuleType,
    /// Higher wins.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: BTreeMap<String, Condition>,
    #[serde(default)]
    pub assumptions: BehavioralParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl AssumptionRule {
    pub fn new(rule_id: &str, rule_type: AssumptionRuleType, priority: i32) -> Self {
        AssumptionRule {
            rule_id: rule_id.to_string(),
            rule_type,
            priority,
            conditions: BTreeMap::new(),
            assumptions: BehavioralParams::default(),
            description: None,
            active: true,
        }
    }

    pub fn with_condition(mut self, field: &str, condition: Condition) -> Self {
        self.conditions.insert(field.to_string(), condition);
        self
    }

    pub fn with_assumptions(mut self, params: BehavioralParams) -> Self {
        self.assumptions = params;
        self
    }

    pub fn matches(&self, attrs: &InstrumentAttributes) -> bool {
        if !self.active {
            return false;
        }
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(attrs.get(field).as_ref()))
    }

    pub fn validate(&self) -> AlmResult<()> {
        if self.rule_id.trim().is_empty() {
            return Err(AlmError::invalid("rule_id", "Rule id must not be empty"));
        }
        for field in self.conditions.keys() {
            if !InstrumentAttributes::FIELDS.contains(&field.as_str()) {
                return Err(AlmError::Configuration(format!(
                    "Rule '{}' has a condition on unknown attribute '{}'",
                    self.rule_id, field
                )));
            }
        }
        self.assumptions
            .validate(&format!("rules[{}].assumptions", self.rule_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cond(json: &str) -> Condition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_condition_shapes_parse() {
        assert!(matches!(cond(r#""retail""#), Condition::Equals(_)));
        assert!(matches!(cond(r#"["RUB", "USD"]"#), Condition::OneOf(_)));
        assert!(matches!(cond(r#"{">=": 1000}"#), Condition::Operators(_)));
    }

    #[test]
    fn test_equality_and_membership() {
        let retail = AttributeValue::text("retail");
        assert!(cond(r#""retail""#).matches(Some(&retail)));
        assert!(!cond(r#""corporate""#).matches(Some(&retail)));
        assert!(cond(r#"["corporate", "retail"]"#).matches(Some(&retail)));
        assert!(!cond(r#""retail""#).matches(None));
    }

    #[test]
    fn test_threshold_operators() {
        let amount = AttributeValue::Number(dec!(1_500_000));
        assert!(cond(r#"{">=": 1000000}"#).matches(Some(&amount)));
        assert!(cond(r#"{">=": 1000000, "<": 2000000}"#).matches(Some(&amount)));
        assert!(!cond(r#"{">": 1500000}"#).matches(Some(&amount)));
        assert!(cond(r#"{"<=": "1500000"}"#).matches(Some(&amount)));
    }

    #[test]
    fn test_missing_attribute_semantics() {
        assert!(cond(r#"{"not_in": ["bank"]}"#).matches(None));
        assert!(!cond(r#"{"in": ["bank"]}"#).matches(None));
        assert!(!cond(r#"{">=": 0}"#).matches(None));
    }

    #[test]
    fn test_ordering_on_text_fails() {
        let text = AttributeValue::text("retail");
        assert!(!cond(r#"{">=": 10}"#).matches(Some(&text)));
    }

    #[test]
    fn test_rule_parses_with_defaults() {
        let rule: AssumptionRule = serde_json::from_str(
            r#"{
                "rule_id": "retail_rub",
                "rule_type": "combined",
                "conditions": {"counterparty_type": "retail", "currency": ["RUB"]},
                "assumptions": {"stable_portion": "0.7"}
            }"#,
        )
        .unwrap();
        assert_eq!(rule.priority, 0);
        assert!(rule.active);
        assert_eq!(rule.assumptions.stable_portion, Some(dec!(0.7)));
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_rule_rejects_unknown_attribute() {
        let rule = AssumptionRule::new("bad", AssumptionRuleType::Combined, 1)
            .with_condition("colour", Condition::Equals(AttributeValue::text("red")));
        assert!(rule.validate().is_err());
    }
}
