//! Catalog module
//!
//! This module contains the table registry, column definitions and row layout.

pub mod registry;
pub mod schema;
pub mod types;

pub use registry::{DestroyToken, TableRegistry};
pub use schema::{
    default_null_value, Column, ColumnBuilder, Schema, KEY_COL_NAME, MAX_FIELD_NAME_SIZE,
};
pub use types::ColumnType;
