//! Conditions for memrel selectors
//!
//! A condition compares two elements, each a constant or a field of a joined record.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::storage::{RecordCollection, Value};

/// Comparison operators usable in a where clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Equal,
    NotEqual,
    Inferior,
    InferiorOrEqual,
    Superior,
    SuperiorOrEqual,
    /// `%` matches any run of characters, `_` exactly one
    Like,
    NotLike,
    /// Unary; the right element is ignored
    IsNull,
    IsNotNull,
}

impl ConditionOperator {
    /// Operator name
    pub fn name(&self) -> &'static str {
        match self {
            ConditionOperator::Equal => "equal",
            ConditionOperator::NotEqual => "notEqual",
            ConditionOperator::Inferior => "inferior",
            ConditionOperator::InferiorOrEqual => "inferiorOrEqual",
            ConditionOperator::Superior => "superior",
            ConditionOperator::SuperiorOrEqual => "superiorOrEqual",
            ConditionOperator::Like => "like",
            ConditionOperator::NotLike => "notLike",
            ConditionOperator::IsNull => "isNull",
            ConditionOperator::IsNotNull => "isNotNull",
        }
    }

    /// Operators taking a single operand
    pub fn is_unary(&self) -> bool {
        matches!(self, ConditionOperator::IsNull | ConditionOperator::IsNotNull)
    }
}

/// One side of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionElement {
    /// Literal value
    Const(Value),
    /// `alias.field` in the joined record collection
    Field { alias: String, field: String },
}

impl ConditionElement {
    /// Literal element
    pub fn value(value: impl Into<Value>) -> Self {
        ConditionElement::Const(value.into())
    }

    /// Field reference element
    pub fn field(alias: impl Into<String>, field: impl Into<String>) -> Self {
        ConditionElement::Field {
            alias: alias.into(),
            field: field.into(),
        }
    }

    /// Resolve to a value against a joined record collection
    pub fn resolve(&self, collection: &RecordCollection) -> Result<Value> {
        match self {
            ConditionElement::Const(value) => Ok(value.clone()),
            ConditionElement::Field { alias, field } => collection.value(alias, field),
        }
    }
}

/// A binary (or unary) comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    left: ConditionElement,
    operator: ConditionOperator,
    right: ConditionElement,
}

impl Condition {
    pub fn new(left: ConditionElement, operator: ConditionOperator, right: ConditionElement) -> Self {
        Self {
            left,
            operator,
            right,
        }
    }

    /// `element IS NULL`
    pub fn is_null(element: ConditionElement) -> Self {
        Self::new(element, ConditionOperator::IsNull, ConditionElement::Const(Value::Null))
    }

    /// `element IS NOT NULL`
    pub fn is_not_null(element: ConditionElement) -> Self {
        Self::new(element, ConditionOperator::IsNotNull, ConditionElement::Const(Value::Null))
    }

    pub fn operator(&self) -> ConditionOperator {
        self.operator
    }

    /// Evaluate against one joined tuple
    pub fn validate(&self, collection: &RecordCollection) -> Result<bool> {
        let left = self.left.resolve(collection)?;
        if self.operator.is_unary() {
            return Ok(match self.operator {
                ConditionOperator::IsNull => left.is_null(),
                _ => !left.is_null(),
            });
        }
        let right = self.right.resolve(collection)?;

        let ordered = |accept: fn(Ordering) -> bool| -> Result<bool> {
            left.compare(&right)
                .map(accept)
                .ok_or_else(|| Error::type_mismatch(left.type_name(), right.type_name()))
        };

        match self.operator {
            ConditionOperator::Equal => Ok(left.compare(&right) == Some(Ordering::Equal)),
            ConditionOperator::NotEqual => Ok(left.compare(&right) != Some(Ordering::Equal)),
            ConditionOperator::Inferior => ordered(|ord| ord == Ordering::Less),
            ConditionOperator::InferiorOrEqual => ordered(|ord| ord != Ordering::Greater),
            ConditionOperator::Superior => ordered(|ord| ord == Ordering::Greater),
            ConditionOperator::SuperiorOrEqual => ordered(|ord| ord != Ordering::Less),
            ConditionOperator::Like => like(&left, &right),
            ConditionOperator::NotLike => like(&left, &right).map(|matched| !matched),
            ConditionOperator::IsNull | ConditionOperator::IsNotNull => {
                unreachable!("unary operators are handled above")
            }
        }
    }
}

fn like(value: &Value, pattern: &Value) -> Result<bool> {
    let Some(pattern) = pattern.as_str() else {
        return Err(Error::type_mismatch(pattern.type_name(), "LIKE pattern"));
    };
    if value.is_null() {
        return Ok(false);
    }
    Ok(like_match(&value.to_string(), pattern))
}

/// Wildcard match with backtracking on the last `%`
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}
