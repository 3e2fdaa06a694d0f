//! JSON file persistence channel
//!
//! One file per table, `<dir>/<name>.json`, holding the column declarations, the
//! capacity and every row with its key.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use super::Persistence;
use crate::catalog::{default_null_value, Column, ColumnType, KEY_COL_NAME};
use crate::config::{StoreConfig, DEFAULT_CONFLICT_PROPORTION};
use crate::error::{Error, Result};
use crate::storage::{Table, Value};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableDocument {
    name: String,
    columns: Vec<ColumnDocument>,
    row_max_size: usize,
    data: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnDocument {
    name: String,
    #[serde(rename = "type")]
    column_type: ColumnType,
    size: usize,
    #[serde(default, skip_serializing_if = "is_false")]
    nullable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    signed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    null_value: Option<Value>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl From<&Column> for ColumnDocument {
    fn from(column: &Column) -> Self {
        let null_value = (*column.null_value() != default_null_value(column.column_type()))
            .then(|| column.null_value().clone());
        Self {
            name: column.name().to_string(),
            column_type: column.column_type(),
            size: column.size(),
            nullable: column.is_nullable(),
            signed: column.is_signed(),
            null_value,
        }
    }
}

impl ColumnDocument {
    fn into_column(self) -> Result<Column> {
        let mut builder = Column::builder(self.name, self.column_type, self.size)
            .nullable(self.nullable)
            .signed(self.signed);
        if let Some(null_value) = self.null_value {
            builder = builder.null_value(null_value);
        }
        builder.build()
    }
}

/// Persistence channel writing one JSON file per table
#[derive(Debug, Clone)]
pub struct JsonFile {
    dir: PathBuf,
    /// Spare bucket proportion of the tables this channel loads
    conflict_proportion: f32,
}

impl JsonFile {
    /// Channel storing files in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            conflict_proportion: DEFAULT_CONFLICT_PROPORTION,
        }
    }

    /// Channel storing files in the configured data directory, loading tables with the
    /// configured conflict proportion
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.data_dir()).conflict_proportion(config.conflict_proportion)
    }

    /// Set the spare bucket proportion of loaded tables
    pub fn conflict_proportion(mut self, proportion: f32) -> Self {
        self.conflict_proportion = proportion;
        self
    }

    /// Directory holding the files
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// File backing table `name`
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

impl Persistence for JsonFile {
    fn persist(&self, name: &str, table: &Table) -> Result<()> {
        let columns = table.columns().iter().map(ColumnDocument::from).collect();

        let rows = if table.is_created() {
            table.rows(None)?
        } else {
            Vec::new()
        };
        let mut data = Vec::with_capacity(rows.len());
        for (key, values) in rows {
            let mut object = serde_json::Map::new();
            for (field, value) in values {
                object.insert(field, value.to_json());
            }
            object.insert(KEY_COL_NAME.to_string(), serde_json::Value::String(key));
            data.push(object);
        }

        let document = TableDocument {
            name: name.to_string(),
            columns,
            row_max_size: table.capacity(),
            data,
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.path(name);
        fs::write(&path, serde_json::to_string(&document)?)?;
        info!(
            table = name,
            path = %path.display(),
            rows = document.data.len(),
            "Table persisted"
        );
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Table> {
        let path = self.path(name);
        if !path.exists() {
            return Err(Error::FileNotFound(path.display().to_string()));
        }
        let json = fs::read_to_string(&path)?;
        let document: TableDocument = serde_json::from_str(&json)?;
        if document.name != name {
            debug!(table = name, stored_name = %document.name, "Loading table under a new name");
        }

        let table =
            Table::new(name, document.row_max_size).conflict_proportion(self.conflict_proportion);
        for column in document.columns {
            table.add_column(column.into_column()?)?;
        }
        table.create()?;

        for mut object in document.data {
            let key = match object.remove(KEY_COL_NAME) {
                Some(serde_json::Value::String(key)) => key,
                Some(serde_json::Value::Number(key)) => key.to_string(),
                _ => {
                    return Err(Error::CorruptedRow(format!(
                        "{}: row without {}",
                        name, KEY_COL_NAME
                    )))
                }
            };

            let mut values = Vec::with_capacity(object.len());
            for (field, json) in object {
                let value = Value::from_json(&json).ok_or_else(|| {
                    Error::type_mismatch(format!("JSON {}", json), format!("column '{}'", field))
                })?;
                values.push((field, value));
            }
            table.set(Some(&key), values, false)?;
        }

        info!(table = name, path = %path.display(), rows = table.count()?, "Table loaded");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn persisted_table() -> Table {
        let table = Table::new("scores", 10);
        table
            .add_column(Column::new("player", ColumnType::String, 16).unwrap())
            .unwrap();
        table
            .add_column(
                Column::builder("points", ColumnType::Int, 4)
                    .signed(true)
                    .nullable(true)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        table.create().unwrap();
        table
            .set(
                Some("s1"),
                [("player", Value::from("ada")), ("points", Value::Int(-3))],
                false,
            )
            .unwrap();
        table
            .set(Some("s2"), [("player", Value::from("bob"))], false)
            .unwrap();
        table
    }

    #[test]
    fn test_layout() {
        let dir = TempDir::new().unwrap();
        let channel = JsonFile::new(dir.path());
        channel.persist("scores", &persisted_table()).unwrap();

        let written = fs::read_to_string(channel.path("scores")).unwrap();
        assert_eq!(
            written,
            concat!(
                r#"{"name":"scores","columns":["#,
                r#"{"name":"player","type":3,"size":16},"#,
                r#"{"name":"points","type":1,"size":4,"nullable":true,"signed":true}],"#,
                r#""rowMaxSize":10,"data":["#,
                r#"{"player":"ada","points":-3,"_key":"s1"},"#,
                r#"{"player":"bob","points":null,"_key":"s2"}]}"#
            )
        );
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let channel = JsonFile::new(dir.path());
        let original = persisted_table();
        channel.persist("scores", &original).unwrap();

        let loaded = channel.load("scores").unwrap();
        assert_eq!(loaded.columns(), original.columns());
        assert_eq!(loaded.capacity(), 10);
        assert_eq!(loaded.records().unwrap(), original.records().unwrap());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let channel = JsonFile::new(dir.path());
        assert!(matches!(channel.load("nope"), Err(Error::FileNotFound(_))));
    }
}
