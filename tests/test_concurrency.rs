use memrel::catalog::{Column, ColumnType, TableRegistry};
use memrel::storage::{IndexFilter, Operator, SequenceGenerator, Value};
use memrel::{Error, StoreConfig};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

#[test]
fn test_concurrent_inserts_respect_capacity() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let registry = TableRegistry::new(StoreConfig::new().var_lib_dir(dir.path()))?;
    let table = registry.create_table("events", 100)?;
    table.add_column(Column::new("worker", ColumnType::Int, 1)?)?;
    table.create()?;
    table.add_index(&["worker"])?;
    table.unique_id(Arc::new(SequenceGenerator::starting_at("e", 1)));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let table = table.clone();
            thread::spawn(move || {
                let mut rejected = 0;
                for _ in 0..30 {
                    match table.set(None, [("worker", Value::Int(worker))], false) {
                        Ok(_) => {}
                        Err(Error::CapacityExceeded(_, 100)) => rejected += 1,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                rejected
            })
        })
        .collect();

    let rejected: usize = handles
        .into_iter()
        .map(|handle| handle.join().unwrap_or(0))
        .sum();
    assert_eq!(rejected, 20);
    assert_eq!(table.count()?, 100);

    // Every stored row has exactly one index entry
    let indexed = table.index_lookup(&["worker"], Operator::SuperiorOrEqual, &[Value::Int(0)])?;
    assert_eq!(indexed.len(), 100);
    for key in &indexed {
        assert!(table.exists(key)?);
    }
    Ok(())
}

#[test]
fn test_concurrent_updates_keep_one_index_entry() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let registry = TableRegistry::new(StoreConfig::new().var_lib_dir(dir.path()))?;
    let table = registry.create_table("counters", 8)?;
    table.add_column(Column::new("n", ColumnType::Int, 4)?)?;
    table.create()?;
    table.add_index(&["n"])?;

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let table = table.clone();
            thread::spawn(move || -> Result<(), Error> {
                let key = format!("k{}", worker);
                for n in 0..50 {
                    table.set(Some(&key), [("n", Value::Int(n))], false)?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().map_err(|_| anyhow::anyhow!("worker panicked"))??;
    }

    assert_eq!(table.count()?, 4);
    let entries = table.index_lookup(&["n"], Operator::SuperiorOrEqual, &[Value::Int(0)])?;
    assert_eq!(entries.len(), 4);
    let last = table.index_lookup(&["n"], Operator::Equal, &[Value::Int(49)])?;
    assert_eq!(last.len(), 4);
    // No key is left under an earlier value
    let stale = table.index_lookup(&["n"], Operator::Inferior, &[Value::Int(49)])?;
    assert!(stale.is_empty());
    let filtered = table.filter_with_index(&[IndexFilter::new(Operator::Equal, "n", 49)])?;
    assert_eq!(filtered.len(), 4);
    Ok(())
}

#[test]
fn test_concurrent_writers_on_one_key() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let registry = TableRegistry::new(StoreConfig::new().var_lib_dir(dir.path()))?;
    let table = registry.create_table("shared", 4)?;
    table.add_column(Column::new("n", ColumnType::Int, 4)?)?;
    table.create()?;
    table.add_index(&["n"])?;

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let table = table.clone();
            thread::spawn(move || -> Result<(), Error> {
                for n in 0..500 {
                    table.set(Some("k"), [("n", Value::Int(worker * 1000 + n))], false)?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().map_err(|_| anyhow::anyhow!("worker panicked"))??;
    }

    // The index holds the key under the stored value only
    let stored = table.get("k", "n")?;
    let under_stored = table.index_lookup(&["n"], Operator::Equal, &[stored.clone()])?;
    assert!(under_stored.contains("k"));
    let above = table.index_lookup(&["n"], Operator::Superior, &[stored.clone()])?;
    let below = table.index_lookup(&["n"], Operator::Inferior, &[stored])?;
    assert!(above.is_empty());
    assert!(below.is_empty());

    assert!(table.del("k")?);
    let entries = table.index_lookup(&["n"], Operator::SuperiorOrEqual, &[Value::Int(0)])?;
    assert!(entries.is_empty());
    Ok(())
}
