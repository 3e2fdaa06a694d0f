//! Row export for memrel tables
//!
//! Renders table rows as JSON objects, optionally restricted to some columns, with
//! chosen columns JSON-encoded to text or JSON-decoded from text.

use serde_json::{Map, Value as JsonValue};

use super::table::Table;
use super::value::Value;
use crate::error::{Error, Result};

/// Options for `Table::export`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    select: Option<Vec<String>>,
    json_encode: Vec<String>,
    json_decode: Vec<String>,
}

impl ExportOptions {
    /// Export every column as is
    pub fn new() -> Self {
        Self::default()
    }

    /// Only export these columns, in this order
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the value of these columns by its JSON text
    pub fn json_encode<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.json_encode = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Parse the text of these columns as JSON
    pub fn json_decode<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.json_decode = columns.into_iter().map(Into::into).collect();
        self
    }

    fn render(&self, field: &str, value: &Value) -> Result<JsonValue> {
        if self.json_encode.iter().any(|c| c == field) {
            return Ok(JsonValue::String(serde_json::to_string(&value.to_json())?));
        }
        if self.json_decode.iter().any(|c| c == field) {
            return match value {
                Value::Null => Ok(JsonValue::Null),
                Value::String(text) => Ok(serde_json::from_str(text)?),
                other => Ok(serde_json::from_str(&other.to_string())?),
            };
        }
        Ok(value.to_json())
    }
}

impl Table {
    /// Export rows as JSON objects; null fields come out as `null`
    pub fn export(&self, options: &ExportOptions) -> Result<Vec<Map<String, JsonValue>>> {
        let columns = match &options.select {
            Some(select) => select.clone(),
            None => self.column_names(),
        };
        for field in columns
            .iter()
            .chain(&options.json_encode)
            .chain(&options.json_decode)
        {
            if !self.has_column(field) {
                return Err(Error::ColumnNotFound(field.clone(), self.name().to_string()));
            }
        }

        let mut rows = Vec::new();
        for record in self.iter()? {
            let record = record?;
            let mut object = Map::with_capacity(columns.len());
            for field in &columns {
                let value = record.get_value(field)?;
                object.insert(field.clone(), options.render(field, &value)?);
            }
            rows.push(object);
        }
        Ok(rows)
    }

    /// Export rows as one JSON array string
    pub fn export_json(&self, options: &ExportOptions) -> Result<String> {
        Ok(serde_json::to_string(&self.export(options)?)?)
    }
}
