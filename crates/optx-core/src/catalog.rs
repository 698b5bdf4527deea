//! # Catalog Interface
//!
//! The catalog hands the estimator the statistics of the table (or index) behind an access
//! path. Statistics are shared by every compilation that touches the table, so they are
//! returned as `Arc<dyn StatisticsProvider>`: cheap to clone, read-only once published.
//! Refreshing statistics means replacing the entry, never mutating a provider in place.
//!
//! ## Key Lookups
//!
//! Tables are identified by `TableRef` (schema + name). `get_statistics` returns `None` for an
//! unknown table; callers fall back to [`TableStatistics::default`], which answers every
//! question with the fixed defaults and reports every operand as lacking statistics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::stats::{StatisticsProvider, TableStatistics};

/// A fully-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Catalog provides statistics for access paths.
pub trait Catalog: Send + Sync {
    fn get_statistics(&self, table: &TableRef) -> Option<Arc<dyn StatisticsProvider>>;

    /// Row count of the table, when known.
    fn row_count(&self, table: &TableRef) -> Option<f64>;
}

/// In-memory catalog for testing and development.
///
/// Tables are keyed by their fully-qualified name (`schema.table`). Entries can be replaced
/// while other threads hold providers handed out earlier; those keep their snapshot.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tables: RwLock<HashMap<String, Arc<TableStatistics>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or replace) the statistics of `table`.
    pub fn add_table(&self, table: &TableRef, stats: TableStatistics) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.insert(table.to_string(), Arc::new(stats));
    }

    fn lookup(&self, table: &TableRef) -> Option<Arc<TableStatistics>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.get(&table.to_string()).cloned()
    }
}

impl Catalog for InMemoryCatalog {
    fn get_statistics(&self, table: &TableRef) -> Option<Arc<dyn StatisticsProvider>> {
        self.lookup(table)
            .map(|stats| stats as Arc<dyn StatisticsProvider>)
    }

    fn row_count(&self, table: &TableRef) -> Option<f64> {
        self.lookup(table).map(|stats| stats.row_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::OperandRef;
    use crate::stats::ColumnStatistics;

    #[test]
    fn test_replaced_statistics_do_not_affect_earlier_snapshots() {
        let catalog = InMemoryCatalog::new();
        let table = TableRef::new("tpch", "orders");
        catalog.add_table(&table, TableStatistics::new(100.0));

        let before = catalog.get_statistics(&table).unwrap();
        catalog.add_table(
            &table,
            TableStatistics::new(200.0)
                .with_column(OperandRef::Column(1), ColumnStatistics::new(10.0, 0.0)),
        );
        let after = catalog.get_statistics(&table).unwrap();

        assert!(!before.has_real_statistics(OperandRef::Column(1)));
        assert!(after.has_real_statistics(OperandRef::Column(1)));
        assert_eq!(catalog.row_count(&table), Some(200.0));
        assert!(catalog.get_statistics(&TableRef::new("tpch", "lineitem")).is_none());
    }
}
