//! Selector module
//!
//! This module contains the query layer: conditions, brackets, joins, ordering and the
//! table selector that ties them together.

pub mod bracket;
pub mod condition;
pub mod join;
pub mod order;
pub mod selector;

pub use bracket::{Bracket, BracketOperator};
pub use condition::{Condition, ConditionElement, ConditionOperator};
pub use join::Join;
pub use order::{OrderByCollection, OrderByField, OrderDirection};
pub use selector::TableSelector;
