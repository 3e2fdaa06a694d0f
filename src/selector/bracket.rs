//! Boolean expression trees for memrel selectors
//!
//! A `Bracket` holds a first entry followed by AND/OR steps. Each entry is a
//! `Condition` or a nested `Bracket`. Evaluation resolves every entry, then folds
//! the results left to right.

use crate::error::{Error, Result};
use crate::storage::RecordCollection;

use super::condition::Condition;

/// Step connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketOperator {
    And,
    Or,
}

impl BracketOperator {
    fn apply(&self, left: bool, right: bool) -> bool {
        match self {
            BracketOperator::And => left && right,
            BracketOperator::Or => left || right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BracketElement {
    Condition(Condition),
    Bracket(Box<Bracket>),
}

impl BracketElement {
    fn validate(&self, collection: &RecordCollection) -> Result<bool> {
        match self {
            BracketElement::Condition(condition) => condition.validate(collection),
            BracketElement::Bracket(bracket) => bracket.validate_bracket(collection),
        }
    }

    fn as_bracket_mut(&mut self) -> &mut Bracket {
        match self {
            BracketElement::Bracket(bracket) => bracket.as_mut(),
            BracketElement::Condition(_) => unreachable!("element was just set to a bracket"),
        }
    }
}

/// A where clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bracket {
    first: Option<BracketElement>,
    steps: Vec<(BracketOperator, BracketElement)>,
}

impl Bracket {
    /// Create an empty bracket; it validates every tuple
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    fn ensure_no_first(&self) -> Result<()> {
        if self.first.is_some() {
            return Err(Error::SyntaxError(
                "bracket already has a first element".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_first(&self) -> Result<()> {
        if self.first.is_none() {
            return Err(Error::SyntaxError(
                "bracket needs a first element before and/or".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the first entry to a condition
    pub fn first_condition(&mut self, condition: Condition) -> Result<&mut Self> {
        self.ensure_no_first()?;
        self.first = Some(BracketElement::Condition(condition));
        Ok(self)
    }

    /// Set the first entry to a new nested bracket and return it
    pub fn first_bracket(&mut self) -> Result<&mut Bracket> {
        self.ensure_no_first()?;
        Ok(self
            .first
            .insert(BracketElement::Bracket(Box::new(Bracket::new())))
            .as_bracket_mut())
    }

    fn push_condition(&mut self, operator: BracketOperator, condition: Condition) -> Result<&mut Self> {
        self.ensure_first()?;
        self.steps.push((operator, BracketElement::Condition(condition)));
        Ok(self)
    }

    fn push_bracket(&mut self, operator: BracketOperator) -> Result<&mut Bracket> {
        self.ensure_first()?;
        self.steps
            .push((operator, BracketElement::Bracket(Box::new(Bracket::new()))));
        let last = self.steps.len() - 1;
        Ok(self.steps[last].1.as_bracket_mut())
    }

    /// `AND condition`
    pub fn and_condition(&mut self, condition: Condition) -> Result<&mut Self> {
        self.push_condition(BracketOperator::And, condition)
    }

    /// `OR condition`
    pub fn or_condition(&mut self, condition: Condition) -> Result<&mut Self> {
        self.push_condition(BracketOperator::Or, condition)
    }

    /// `AND (...)`; returns the nested bracket
    pub fn and_bracket(&mut self) -> Result<&mut Bracket> {
        self.push_bracket(BracketOperator::And)
    }

    /// `OR (...)`; returns the nested bracket
    pub fn or_bracket(&mut self) -> Result<&mut Bracket> {
        self.push_bracket(BracketOperator::Or)
    }

    /// Evaluate against one joined tuple.
    ///
    /// Every entry is evaluated, so a resolution error anywhere fails the call. Results
    /// are combined strictly left to right: `a AND b OR c` is `(a AND b) OR c`.
    pub fn validate_bracket(&self, collection: &RecordCollection) -> Result<bool> {
        let Some(first) = &self.first else {
            return Ok(true);
        };

        let mut result = first.validate(collection)?;
        for (operator, element) in &self.steps {
            let value = element.validate(collection)?;
            result = operator.apply(result, value);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{ConditionElement, ConditionOperator};
    use crate::storage::{Record, Value};
    use indexmap::IndexMap;

    fn collection() -> RecordCollection {
        let mut values = IndexMap::new();
        values.insert("flag".to_string(), Value::Int(1));
        RecordCollection::single("t", Record::new("t", "k", values))
    }

    fn truth(value: bool) -> Condition {
        Condition::new(
            ConditionElement::field("t", "flag"),
            ConditionOperator::Equal,
            ConditionElement::value(if value { 1 } else { 0 }),
        )
    }

    fn failing() -> Condition {
        Condition::new(
            ConditionElement::field("nope", "flag"),
            ConditionOperator::Equal,
            ConditionElement::value(1),
        )
    }

    #[test]
    fn test_and_chain() {
        let mut bracket = Bracket::new();
        bracket
            .first_condition(truth(true))
            .unwrap()
            .and_condition(truth(true))
            .unwrap()
            .and_condition(truth(true))
            .unwrap();
        assert!(bracket.validate_bracket(&collection()).unwrap());

        bracket.and_condition(truth(false)).unwrap();
        assert!(!bracket.validate_bracket(&collection()).unwrap());
    }

    #[test]
    fn test_or_chain() {
        let mut bracket = Bracket::new();
        bracket
            .first_condition(truth(true))
            .unwrap()
            .or_condition(truth(false))
            .unwrap()
            .or_condition(truth(false))
            .unwrap();
        assert!(bracket.validate_bracket(&collection()).unwrap());

        let mut bracket = Bracket::new();
        bracket
            .first_condition(truth(false))
            .unwrap()
            .or_condition(truth(false))
            .unwrap();
        assert!(!bracket.validate_bracket(&collection()).unwrap());
    }

    #[test]
    fn test_mixed_chain_folds_left_to_right() {
        // (true AND false) OR true
        let mut bracket = Bracket::new();
        bracket
            .first_condition(truth(true))
            .unwrap()
            .and_condition(truth(false))
            .unwrap()
            .or_condition(truth(true))
            .unwrap();
        assert!(bracket.validate_bracket(&collection()).unwrap());

        // (false OR true) AND false
        let mut bracket = Bracket::new();
        bracket
            .first_condition(truth(false))
            .unwrap()
            .or_condition(truth(true))
            .unwrap()
            .and_condition(truth(false))
            .unwrap();
        assert!(!bracket.validate_bracket(&collection()).unwrap());
    }

    #[test]
    fn test_nested_brackets() {
        // false OR (true AND true)
        let mut bracket = Bracket::new();
        bracket.first_condition(truth(false)).unwrap();
        bracket
            .or_bracket()
            .unwrap()
            .first_condition(truth(true))
            .unwrap()
            .and_condition(truth(true))
            .unwrap();
        assert!(bracket.validate_bracket(&collection()).unwrap());

        // (false) AND true
        let mut bracket = Bracket::new();
        bracket.first_bracket().unwrap().first_condition(truth(false)).unwrap();
        bracket.and_condition(truth(true)).unwrap();
        assert!(!bracket.validate_bracket(&collection()).unwrap());
    }

    #[test]
    fn test_double_first_is_syntax_error() {
        let mut bracket = Bracket::new();
        bracket.first_condition(truth(true)).unwrap();
        assert!(matches!(
            bracket.first_condition(truth(false)),
            Err(Error::SyntaxError(_))
        ));
        assert!(matches!(bracket.first_bracket(), Err(Error::SyntaxError(_))));
        assert!(bracket.validate_bracket(&collection()).unwrap());
    }

    #[test]
    fn test_step_before_first_is_syntax_error() {
        let mut bracket = Bracket::new();
        assert!(matches!(
            bracket.and_condition(truth(true)),
            Err(Error::SyntaxError(_))
        ));
        assert!(matches!(bracket.or_bracket(), Err(Error::SyntaxError(_))));
    }

    #[test]
    fn test_every_element_is_evaluated() {
        // A true OR does not skip the failing lookup
        let mut bracket = Bracket::new();
        bracket
            .first_condition(truth(true))
            .unwrap()
            .or_condition(failing())
            .unwrap();
        assert!(matches!(
            bracket.validate_bracket(&collection()),
            Err(Error::AliasNotFound(_))
        ));
    }

    #[test]
    fn test_empty_bracket_is_true() {
        assert!(Bracket::new().validate_bracket(&collection()).unwrap());
    }
}
