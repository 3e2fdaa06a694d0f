//! Table selector for memrel
//!
//! Runs a query in four stages: base rows (scanned, or narrowed through indexes),
//! joins in declaration order, the where clause per joined tuple, then ordering.

use tracing::debug;

use super::bracket::Bracket;
use super::join::Join;
use super::order::OrderByCollection;
use crate::catalog::TableRegistry;
use crate::error::Result;
use crate::storage::{IndexFilter, RecordCollection, Resultset};

/// A query over one base table
#[derive(Debug)]
pub struct TableSelector<'a> {
    registry: &'a TableRegistry,
    table: String,
    alias: String,
    joins: Vec<Join>,
    filters: Option<Vec<IndexFilter>>,
    where_clause: Bracket,
    order_by: OrderByCollection,
}

impl<'a> TableSelector<'a> {
    /// Select from `table`, aliased by its own name
    pub fn new(registry: &'a TableRegistry, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            registry,
            alias: table.clone(),
            table,
            joins: Vec::new(),
            filters: None,
            where_clause: Bracket::new(),
            order_by: OrderByCollection::new(),
        }
    }

    /// Alias of the base table in result tuples
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Append a join; joins run in the order they are added
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Narrow the base rows through the table indexes
    pub fn filter_with_index(mut self, filters: Vec<IndexFilter>) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Sort the final result set
    pub fn order_by(mut self, order_by: OrderByCollection) -> Self {
        self.order_by = order_by;
        self
    }

    /// The where clause, to be filled in place
    pub fn where_bracket(&mut self) -> &mut Bracket {
        &mut self.where_clause
    }

    /// Run the query. Joins are inner: a tuple without related rows is dropped.
    pub fn execute(&self) -> Result<Resultset> {
        let table = self.registry.get_table(&self.table)?;
        let base = match &self.filters {
            Some(filters) => table.filter_with_index(filters)?,
            None => table.records()?,
        };

        let mut resultset: Resultset = base
            .into_iter()
            .map(|record| RecordCollection::single(self.alias.clone(), record))
            .collect();

        for join in &self.joins {
            let mut joined = Resultset::new();
            for tuple in &resultset {
                for related in join.get(self.registry, tuple)? {
                    let mut expanded = tuple.clone();
                    for (alias, record) in related.iter() {
                        expanded.insert(alias, record.clone());
                    }
                    joined.push(expanded);
                }
            }
            debug!(
                foreign_key = join.foreign_key_name(),
                before = resultset.len(),
                after = joined.len(),
                "Join applied"
            );
            resultset = joined;
        }

        resultset.try_retain(|tuple| self.where_clause.validate_bracket(tuple))?;
        resultset.order_by(&self.order_by)?;
        Ok(resultset)
    }
}
