//! Schema definitions for memrel
//!
//! This module defines column metadata and the fixed-width row layout used by the
//! row store. Every nullable column owns a `name::null` shadow slot and every signed
//! numeric column owns a `name::sign` shadow slot: value slots only ever hold
//! magnitudes, the sign is rebuilt on read.

use byteorder::{ByteOrder, LittleEndian};
use bytes::BytesMut;
use indexmap::IndexMap;

use super::types::{ColumnType, FLOAT_SLOT_SIZE, INT_SLOT_SIZES};
use crate::error::{Error, Result};
use crate::storage::Value;

/// Reserved field name addressing a row's key
pub const KEY_COL_NAME: &str = "_key";

/// Maximum column name length
pub const MAX_FIELD_NAME_SIZE: usize = 256;

/// Names no column may take
pub const FORBIDDEN_NAMES: [&str; 1] = [KEY_COL_NAME];

/// Suffix of the null-flag shadow slot
pub const NULL_SUFFIX: &str = "::null";

/// Suffix of the sign-flag shadow slot
pub const SIGN_SUFFIX: &str = "::sign";

/// Width of the length prefix in front of string slots
const STRING_LEN_SIZE: usize = 4;

/// Column definition in a table
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    size: usize,
    null_value: Value,
    nullable: bool,
    signed: bool,
}

impl Column {
    /// Create a non-nullable, unsigned column
    pub fn new(name: impl Into<String>, column_type: ColumnType, size: usize) -> Result<Self> {
        Self::builder(name, column_type, size).build()
    }

    /// Start building a column with optional flags
    pub fn builder(name: impl Into<String>, column_type: ColumnType, size: usize) -> ColumnBuilder {
        ColumnBuilder {
            name: name.into(),
            column_type,
            size,
            null_value: None,
            nullable: false,
            signed: false,
        }
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Declared size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Sentinel written to the value slot when the value is null
    pub fn null_value(&self) -> &Value {
        &self.null_value
    }

    /// Whether the column has a `::null` shadow slot
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the column was declared signed
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Whether the column has a `::sign` shadow slot
    pub fn has_sign_slot(&self) -> bool {
        self.signed && self.column_type.is_numeric()
    }

    /// Width of the value slot in the row image
    pub fn slot_size(&self) -> usize {
        match self.column_type {
            ColumnType::Int => self.size,
            ColumnType::Float => FLOAT_SLOT_SIZE,
            ColumnType::String => STRING_LEN_SIZE + self.size,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.chars().count() > MAX_FIELD_NAME_SIZE {
            return Err(Error::malformed(
                &self.name,
                format!("name exceeds {} chars", MAX_FIELD_NAME_SIZE),
            ));
        }
        if FORBIDDEN_NAMES.contains(&self.name.as_str()) {
            return Err(Error::malformed(&self.name, "name is reserved"));
        }
        if self.name.contains("::") {
            return Err(Error::malformed(&self.name, "'::' is reserved for shadow slots"));
        }
        if self.column_type != ColumnType::Float && self.size == 0 {
            return Err(Error::malformed(
                &self.name,
                format!("missing size for {} type", self.column_type),
            ));
        }
        if self.column_type == ColumnType::Int && !INT_SLOT_SIZES.contains(&self.size) {
            return Err(Error::malformed(
                &self.name,
                format!("INT size must be one of {:?}, got {}", INT_SLOT_SIZES, self.size),
            ));
        }
        if self.column_type == ColumnType::String && self.signed {
            return Err(Error::malformed(&self.name, "STRING column cannot be signed"));
        }
        // The sentinel is written through the regular slot encoder
        self.magnitude_of(&self.null_value, true)
            .map_err(|e| Error::malformed(&self.name, format!("invalid null value: {}", e)))?;
        Ok(())
    }

    /// Split a value into the slot payload and its sign flag
    fn magnitude_of(&self, value: &Value, abs: bool) -> Result<(SlotPayload, bool)> {
        match (self.column_type, value) {
            (ColumnType::Int, Value::Int(i)) => {
                let negative = *i < 0;
                self.check_sign(negative, abs, value)?;
                let magnitude = i.unsigned_abs();
                let fits = self.size >= 8 || magnitude < (1u64 << (8 * self.size));
                if !fits || (!self.has_sign_slot() && magnitude > i64::MAX as u64) {
                    return Err(Error::ValueTooLarge(self.name.clone()));
                }
                Ok((SlotPayload::Uint(magnitude), negative && self.has_sign_slot()))
            }
            (ColumnType::Float, Value::Int(_)) | (ColumnType::Float, Value::Float(_)) => {
                let f = value.as_f64().unwrap_or_default();
                if f.is_nan() {
                    return Err(Error::type_mismatch(
                        "NaN",
                        format!("FLOAT column '{}'", self.name),
                    ));
                }
                let negative = f < 0.0;
                self.check_sign(negative, abs, value)?;
                Ok((SlotPayload::Float(f.abs()), negative && self.has_sign_slot()))
            }
            (ColumnType::String, Value::String(_))
            | (ColumnType::String, Value::Int(_))
            | (ColumnType::String, Value::Float(_)) => {
                let text = value.to_string();
                if text.len() > self.size {
                    return Err(Error::ValueTooLarge(self.name.clone()));
                }
                Ok((SlotPayload::Text(text), false))
            }
            (column_type, other) => Err(Error::type_mismatch(
                other.type_name(),
                format!("{} column '{}'", column_type, self.name),
            )),
        }
    }

    fn check_sign(&self, negative: bool, abs: bool, value: &Value) -> Result<()> {
        if negative && !self.has_sign_slot() && !abs {
            return Err(Error::type_mismatch(
                format!("negative {} ({})", value.type_name(), value),
                format!("unsigned column '{}'", self.name),
            ));
        }
        Ok(())
    }
}

/// Sentinel written in the value slot of a null field when none is configured
pub fn default_null_value(column_type: ColumnType) -> Value {
    match column_type {
        ColumnType::Int => Value::Int(0),
        ColumnType::Float => Value::Float(0.0),
        ColumnType::String => Value::String(String::new()),
    }
}

/// Builder for columns with a fluent API
#[derive(Debug, Clone)]
pub struct ColumnBuilder {
    name: String,
    column_type: ColumnType,
    size: usize,
    null_value: Option<Value>,
    nullable: bool,
    signed: bool,
}

impl ColumnBuilder {
    /// Set nullable flag
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set signed flag
    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Set the null sentinel
    pub fn null_value(mut self, value: impl Into<Value>) -> Self {
        self.null_value = Some(value.into());
        self
    }

    /// Validate and build the column
    pub fn build(self) -> Result<Column> {
        let null_value = self
            .null_value
            .unwrap_or_else(|| default_null_value(self.column_type));
        let column = Column {
            name: self.name,
            column_type: self.column_type,
            size: self.size,
            null_value,
            nullable: self.nullable,
            signed: self.signed,
        };
        column.validate()?;
        Ok(column)
    }
}

#[derive(Debug)]
enum SlotPayload {
    Uint(u64),
    Float(f64),
    Text(String),
}

/// A column placed in the row image
#[derive(Debug, Clone)]
struct ColumnSlots {
    column: Column,
    offset: usize,
    null_offset: Option<usize>,
    sign_offset: Option<usize>,
}

/// Table schema: ordered columns and their fixed-width row layout
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: IndexMap<String, ColumnSlots>,
    row_size: usize,
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, placing its value slot and shadow slots after the current row end
    pub fn add_column(&mut self, column: Column, table_name: &str) -> Result<()> {
        if self.columns.contains_key(column.name()) {
            return Err(Error::ColumnAlreadyExists(
                column.name().to_string(),
                table_name.to_string(),
            ));
        }

        let offset = self.row_size;
        let mut end = offset + column.slot_size();
        let null_offset = column.is_nullable().then(|| {
            end += 1;
            end - 1
        });
        let sign_offset = column.has_sign_slot().then(|| {
            end += 1;
            end - 1
        });
        self.row_size = end;

        self.columns.insert(
            column.name().to_string(),
            ColumnSlots {
                column,
                offset,
                null_offset,
                sign_offset,
            },
        );
        Ok(())
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name).map(|slots| &slots.column)
    }

    /// Check if column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Get all columns in declaration order
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values().map(|slots| &slots.column)
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    /// Get number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Width of one row image in bytes
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Names of every slot, shadow slots included, in layout order
    pub fn slot_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for (name, slots) in &self.columns {
            names.push(name.clone());
            if slots.null_offset.is_some() {
                names.push(format!("{}{}", name, NULL_SUFFIX));
            }
            if slots.sign_offset.is_some() {
                names.push(format!("{}{}", name, SIGN_SUFFIX));
            }
        }
        names
    }

    /// Encode a complete row; `values` must hold every column
    pub fn encode(&self, values: &IndexMap<String, Value>, abs: bool) -> Result<BytesMut> {
        let mut row = BytesMut::zeroed(self.row_size);

        for (name, slots) in &self.columns {
            let column = &slots.column;
            let value = values.get(name).unwrap_or(&Value::Null);

            let (payload, negative) = if value.is_null() {
                let null_offset = slots
                    .null_offset
                    .ok_or_else(|| Error::NullNotAllowed(name.clone()))?;
                row[null_offset] = 1;
                let (payload, _) = column.magnitude_of(column.null_value(), true)?;
                (payload, false)
            } else {
                column.magnitude_of(value, abs)?
            };

            if let Some(sign_offset) = slots.sign_offset {
                row[sign_offset] = u8::from(negative);
            }

            let slot = &mut row[slots.offset..slots.offset + column.slot_size()];
            match payload {
                SlotPayload::Uint(magnitude) => {
                    LittleEndian::write_uint(slot, magnitude, column.size());
                }
                SlotPayload::Float(f) => LittleEndian::write_f64(slot, f),
                SlotPayload::Text(text) => {
                    LittleEndian::write_u32(&mut slot[..STRING_LEN_SIZE], text.len() as u32);
                    slot[STRING_LEN_SIZE..STRING_LEN_SIZE + text.len()]
                        .copy_from_slice(text.as_bytes());
                }
            }
        }

        Ok(row)
    }

    /// Decode one field, raising `FieldValueIsNull` when its null flag is set
    pub fn decode_field(&self, row: &[u8], name: &str, table_name: &str) -> Result<Value> {
        let slots = self
            .columns
            .get(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string(), table_name.to_string()))?;
        if row.len() != self.row_size {
            return Err(Error::CorruptedRow(format!(
                "{}: expected {} bytes, got {}",
                table_name,
                self.row_size,
                row.len()
            )));
        }

        if let Some(null_offset) = slots.null_offset {
            if row[null_offset] == 1 {
                return Err(Error::FieldValueIsNull(name.to_string()));
            }
        }
        let negative = slots.sign_offset.map_or(false, |offset| row[offset] == 1);

        let column = &slots.column;
        let slot = &row[slots.offset..slots.offset + column.slot_size()];
        let value = match column.column_type() {
            ColumnType::Int => {
                let magnitude = LittleEndian::read_uint(slot, column.size()) as i128;
                let signed = if negative { -magnitude } else { magnitude };
                let int = i64::try_from(signed)
                    .map_err(|_| Error::CorruptedRow(format!("{}.{}", table_name, name)))?;
                Value::Int(int)
            }
            ColumnType::Float => {
                let f = LittleEndian::read_f64(slot);
                Value::Float(if negative { -f } else { f })
            }
            ColumnType::String => {
                let len = LittleEndian::read_u32(&slot[..STRING_LEN_SIZE]) as usize;
                if len > column.size() {
                    return Err(Error::CorruptedRow(format!("{}.{}", table_name, name)));
                }
                let text = std::str::from_utf8(&slot[STRING_LEN_SIZE..STRING_LEN_SIZE + len])
                    .map_err(|_| Error::CorruptedRow(format!("{}.{}", table_name, name)))?;
                Value::String(text.to_string())
            }
        };
        Ok(value)
    }

    /// Decode every column, turning null flags into `Value::Null`
    pub fn decode_row(&self, row: &[u8], table_name: &str) -> Result<IndexMap<String, Value>> {
        let mut values = IndexMap::with_capacity(self.columns.len());
        for name in self.columns.keys() {
            let value = match self.decode_field(row, name, table_name) {
                Ok(value) => value,
                Err(Error::FieldValueIsNull(_)) => Value::Null,
                Err(e) => return Err(e),
            };
            values.insert(name.clone(), value);
        }
        Ok(values)
    }
}
