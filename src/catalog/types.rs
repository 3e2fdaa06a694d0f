//! Column types for memrel
//!
//! This module defines the primitive column types supported by the row store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// Primitive column type; the discriminant is the persisted numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ColumnType {
    /// Integer stored on 1, 2, 4 or 8 bytes
    Int = 1,
    /// Double-precision floating point
    Float = 2,
    /// Fixed-capacity string
    String = 3,
}

/// Storage width of a float slot
pub const FLOAT_SLOT_SIZE: usize = 8;

/// Widths accepted for integer slots
pub const INT_SLOT_SIZES: [usize; 4] = [1, 2, 4, 8];

impl ColumnType {
    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }

    /// Numeric code used by the persistence layout
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl From<ColumnType> for u8 {
    fn from(column_type: ColumnType) -> Self {
        column_type.code()
    }
}

impl TryFrom<u8> for ColumnType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ColumnType::Int),
            2 => Ok(ColumnType::Float),
            3 => Ok(ColumnType::String),
            other => Err(Error::type_mismatch(
                format!("column type code {}", other),
                "INT, FLOAT or STRING",
            )),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Float => write!(f, "FLOAT"),
            ColumnType::String => write!(f, "STRING"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(ColumnType::Int.code(), 1);
        assert_eq!(ColumnType::Float.code(), 2);
        assert_eq!(ColumnType::String.code(), 3);
        assert_eq!(ColumnType::try_from(3).unwrap(), ColumnType::String);
        assert!(ColumnType::try_from(9).is_err());
    }

    #[test]
    fn test_type_serializes_as_code() {
        assert_eq!(serde_json::to_string(&ColumnType::String).unwrap(), "3");
        let parsed: ColumnType = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, ColumnType::Int);
    }
}
