//! Storage engine module
//!
//! This module contains the storage engine components:
//! - Typed values and fixed-capacity row storage
//! - Ordered secondary indexes
//! - Foreign key links between tables
//! - Tables, records and result sets
//! - JSON export of table rows

pub mod export;
pub mod foreign_key;
pub mod id;
pub mod index;
pub mod record;
pub mod row_store;
pub mod table;
pub mod value;

pub use export::ExportOptions;
pub use foreign_key::{ForeignKey, ForeignKeyDirection, ForeignKeyPair};
pub use id::{IdGenerator, SequenceGenerator};
pub use index::{Index, IndexKey, Operator};
pub use record::{Record, RecordCollection, Resultset};
pub use row_store::RowStore;
pub use table::{IndexFilter, Table, TableIter};
pub use value::Value;
