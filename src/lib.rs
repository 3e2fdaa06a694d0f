//! memrel - An embeddable in-memory relational table store written in Rust
//!
//! This library provides:
//! - Fixed-capacity tables of typed columns (catalog, storage)
//! - Secondary indexes for equality and range lookups
//! - Bidirectional foreign keys between tables
//! - A selector layer joining tables and filtering rows through nested brackets
//! - Table persistence through named channels

pub mod catalog;
pub mod config;
pub mod error;
pub mod persistence;
pub mod selector;
pub mod storage;

pub use catalog::{Column, ColumnType, TableRegistry};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use storage::{Table, Value};
