//! Database backends and the values they hand to the exporter.
//!
//! A backend implements [`DatabaseOperator`]. The exporter only ever sees
//! [`ColumnDescriptor`]s and [`RowValue`]s, so adding an engine means adding one
//! operator and a mapping from its type names to [`ColumnType`].

pub mod format;
#[cfg(test)]
pub(crate) mod memory;
mod mssql;

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::{Config, DatabaseKind};
use crate::error::Error;

pub use self::format::{format_value, UNSUPPORTED_COLUMN_TYPE_OUTPUT};
pub use self::mssql::MssqlOperator;

/// Normalized classification of a declared SQL column type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Boolean,
    Float,
    Decimal,
    Text,
    Date,
    /// Millisecond precision timestamp.
    DateTime,
    /// 100ns precision timestamp.
    DateTime2,
    /// Minute granularity timestamp.
    SmallDateTime,
    UniqueIdentifier,
    Unsupported(String),
}

impl ColumnType {
    /// Classifies a SQL Server type name such as `INT` or `nvarchar`.
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "TINYINT" | "SMALLINT" | "INT" | "BIGINT" => ColumnType::Integer,
            "BIT" => ColumnType::Boolean,
            "REAL" | "FLOAT" => ColumnType::Float,
            "DECIMAL" | "NUMERIC" | "MONEY" | "SMALLMONEY" => ColumnType::Decimal,
            "CHAR" | "VARCHAR" | "TEXT" | "NCHAR" | "NVARCHAR" | "NTEXT" => ColumnType::Text,
            "DATE" => ColumnType::Date,
            "DATETIME" => ColumnType::DateTime,
            "DATETIME2" => ColumnType::DateTime2,
            "SMALLDATETIME" => ColumnType::SmallDateTime,
            "UNIQUEIDENTIFIER" => ColumnType::UniqueIdentifier,
            _ => ColumnType::Unsupported(name.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub type_name: String,
    pub column_type: ColumnType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            column_type: ColumnType::from_type_name(&type_name),
            type_name,
        }
    }
}

/// A single cell as delivered by the driver.
#[derive(Clone, Debug, PartialEq)]
pub enum RowValue {
    Null,
    Int(i64),
    Bool(bool),
    Real(f32),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// A non-null value the exporter has no rendering for.
    Opaque,
}

/// Receives the result of a full table scan, in cursor order.
pub trait RowSink {
    fn columns(&mut self, columns: &[ColumnDescriptor]) -> Result<(), Error>;
    fn row(&mut self, values: &[RowValue]) -> Result<(), Error>;
}

/// Everything the exporter needs from a database engine.
///
/// Implementations are shared by all export tasks of a run, so queries may be
/// issued concurrently from several threads.
pub trait DatabaseOperator: Send + Sync {
    /// Connects and verifies the connection.
    fn open(&mut self) -> Result<(), Error>;

    fn close(&mut self) -> Result<(), Error>;

    /// Base tables (no views) of the configured schema.
    fn list_tables(&self) -> Result<Vec<String>, Error>;

    /// Streams every row of `table` into `sink`.
    fn query_all_records(&self, table: &str, sink: &mut dyn RowSink) -> Result<(), Error>;

    fn format_value(
        &self,
        value: &RowValue,
        column: &ColumnDescriptor,
        null_represent: &str,
    ) -> Result<String, Error> {
        format_value(value, &column.column_type, null_represent).map_err(|e| match e {
            Error::Format(msg) => Error::Format(format!(
                "column {} ({}): {}",
                column.name, column.type_name, msg
            )),
            other => other,
        })
    }
}

impl<T: DatabaseOperator + ?Sized> DatabaseOperator for Box<T> {
    fn open(&mut self) -> Result<(), Error> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), Error> {
        (**self).close()
    }

    fn list_tables(&self) -> Result<Vec<String>, Error> {
        (**self).list_tables()
    }

    fn query_all_records(&self, table: &str, sink: &mut dyn RowSink) -> Result<(), Error> {
        (**self).query_all_records(table, sink)
    }

    fn format_value(
        &self,
        value: &RowValue,
        column: &ColumnDescriptor,
        null_represent: &str,
    ) -> Result<String, Error> {
        (**self).format_value(value, column, null_represent)
    }
}

/// Creates the operator for the configured database kind.
pub fn new_operator(config: &Config) -> Box<dyn DatabaseOperator> {
    match config.database.kind {
        DatabaseKind::Mssql => Box::new(MssqlOperator::new(
            config.database.clone(),
            config.export.max_parallel,
        )),
    }
}
