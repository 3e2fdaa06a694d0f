use memrel::catalog::{Column, ColumnType, TableRegistry};
use memrel::persistence::{JsonFile, Persistence};
use memrel::storage::Value;
use memrel::{Error, StoreConfig};
use std::sync::Arc;
use tempfile::TempDir;

fn registry(dir: &TempDir) -> anyhow::Result<TableRegistry> {
    Ok(TableRegistry::new(
        StoreConfig::new()
            .var_lib_dir(dir.path())
            .data_dir_name("tables"),
    )?)
}

#[test]
fn test_persist_layout() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let registry = registry(&dir)?;

    let table = registry.create_table("testPersist", 125)?;
    table.add_column(Column::new("test", ColumnType::String, 256)?)?;
    table.create()?;
    registry.persist("testPersist")?;

    let written = std::fs::read_to_string(dir.path().join("tables").join("testPersist.json"))?;
    assert_eq!(
        written,
        r#"{"name":"testPersist","columns":[{"name":"test","type":3,"size":256}],"rowMaxSize":125,"data":[]}"#
    );
    Ok(())
}

#[test]
fn test_persist_and_load_round_trip() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let registry = registry(&dir)?;

    let table = registry.create_table("measure", 8)?;
    table.add_column(Column::new("label", ColumnType::String, 12)?)?;
    table.add_column(
        Column::builder("delta", ColumnType::Float, 0)
            .signed(true)
            .build()?,
    )?;
    table.add_column(
        Column::builder("count", ColumnType::Int, 8)
            .nullable(true)
            .null_value(7)
            .build()?,
    )?;
    table.create()?;
    table.set(
        Some("m1"),
        [
            ("label", Value::from("up")),
            ("delta", Value::Float(1.5)),
            ("count", Value::Int(3)),
        ],
        false,
    )?;
    table.set(
        Some("m2"),
        [("label", Value::from("down")), ("delta", Value::Float(-0.25))],
        false,
    )?;
    let columns = table.columns();
    let records = table.records()?;

    registry.persist("measure")?;
    registry.destroy("measure")?;
    assert!(!registry.has_table("measure"));

    let loaded = registry.load("measure")?;
    assert_eq!(loaded.columns(), columns);
    assert_eq!(loaded.records()?, records);
    assert!(matches!(loaded.get("m2", "count"), Err(Error::FieldValueIsNull(_))));
    Ok(())
}

#[test]
fn test_load_missing_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let registry = registry(&dir)?;
    assert!(matches!(registry.load("ghost"), Err(Error::FileNotFound(_))));
    Ok(())
}

#[test]
fn test_named_channel() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let backup_dir = TempDir::new()?;
    let registry = registry(&dir)?;
    let backup = Arc::new(JsonFile::new(backup_dir.path()));
    registry.persistence().set_channel("backup", backup.clone());

    let table = registry.create_table("kv", 4)?;
    table.add_column(Column::new("v", ColumnType::Int, 4)?)?;
    table.create()?;
    table.set(Some("a"), [("v", Value::Int(1))], false)?;

    registry.persist_to("kv", "backup")?;
    assert!(backup.path("kv").exists());
    assert!(!dir.path().join("tables").join("kv.json").exists());

    let loaded = backup.load("kv")?;
    assert_eq!(loaded.get("a", "v")?, Value::Int(1));
    Ok(())
}
