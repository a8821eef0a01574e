use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Error;
use crate::operator::{ColumnDescriptor, DatabaseOperator, RowSink, RowValue};

#[derive(Clone, Debug)]
pub struct MemoryTable {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<RowValue>>,
}

impl MemoryTable {
    pub fn new(name: &str, columns: &[(&str, &str)], rows: Vec<Vec<RowValue>>) -> Self {
        Self {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(name, ty)| ColumnDescriptor::new(*name, *ty))
                .collect(),
            rows,
        }
    }
}

/// Operator over in-memory tables, with switches to simulate failures.
#[derive(Default)]
pub struct MemoryOperator {
    pub tables: Vec<MemoryTable>,
    pub failing_tables: HashSet<String>,
    pub fail_open: bool,
    pub fail_listing: bool,
    pub opened: bool,
    pub closed: bool,
    pub queries: AtomicUsize,
}

impl MemoryOperator {
    pub fn new(tables: Vec<MemoryTable>) -> Self {
        Self {
            tables,
            ..Self::default()
        }
    }
}

impl DatabaseOperator for MemoryOperator {
    fn open(&mut self) -> Result<(), Error> {
        if self.fail_open {
            return Err(Error::Database("login failed".to_string()));
        }
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.closed = true;
        Ok(())
    }

    fn list_tables(&self) -> Result<Vec<String>, Error> {
        if self.fail_listing {
            return Err(Error::Database("catalog unavailable".to_string()));
        }
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    fn query_all_records(&self, table: &str, sink: &mut dyn RowSink) -> Result<(), Error> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing_tables.contains(table) {
            return Err(Error::Database(format!("Invalid object name '{}'", table)));
        }
        let found = self
            .tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| Error::Database(format!("Invalid object name '{}'", table)))?;

        sink.columns(&found.columns)?;
        for row in &found.rows {
            sink.row(row)?;
        }
        Ok(())
    }
}
