use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Error;
use crate::operator::{ColumnDescriptor, DatabaseOperator, RowSink, RowValue};
use crate::processor::writer::CsvRowWriter;

#[derive(Clone, Debug, PartialEq)]
pub struct TableExport {
    pub table: String,
    pub path: PathBuf,
    pub rows: u64,
}

/// Returns `<out_dir>/<table>.csv`, creating `out_dir` if needed.
pub fn output_file_path(out_dir: &Path, table: &str) -> Result<PathBuf, Error> {
    if table.is_empty() || table.contains(['/', '\\']) || table == "." || table == ".." {
        return Err(Error::Processing(format!(
            "table name {:?} cannot be used as a file name",
            table
        )));
    }
    fs::create_dir_all(out_dir)?;
    Ok(out_dir.join(format!("{}.csv", table)))
}

/// Exports single tables to CSV files.
pub struct TableExporter<'a> {
    operator: &'a dyn DatabaseOperator,
    out_dir: &'a Path,
    null_represent: &'a str,
}

impl<'a> TableExporter<'a> {
    pub fn new(config: &'a Config, operator: &'a dyn DatabaseOperator) -> Self {
        Self {
            operator,
            out_dir: &config.export.out_dir,
            null_represent: &config.export.null_represent,
        }
    }

    /// Scans `table` and writes it to its CSV file.
    ///
    /// Any error is tagged with the table name. The file is flushed and
    /// closed whether or not the scan succeeded.
    pub fn export(&self, table: &str) -> Result<TableExport, Error> {
        let path = output_file_path(self.out_dir, table).map_err(|e| e.in_table(table))?;
        let mut sink = CsvTableSink::new(self.operator, &path, self.null_represent);

        let scanned = self.operator.query_all_records(table, &mut sink);
        let finished = sink.finish(scanned.is_ok());

        match (scanned, finished) {
            (Err(e), _) | (Ok(()), Err(e)) => Err(e.in_table(table)),
            (Ok(()), Ok(rows)) => Ok(TableExport {
                table: table.to_string(),
                path,
                rows,
            }),
        }
    }
}

/// Receives one table's rows and writes them out as they arrive.
struct CsvTableSink<'a> {
    operator: &'a dyn DatabaseOperator,
    path: &'a Path,
    null_represent: &'a str,
    columns: Vec<ColumnDescriptor>,
    writer: Option<CsvRowWriter<BufWriter<File>>>,
    rows: u64,
}

impl<'a> CsvTableSink<'a> {
    fn new(operator: &'a dyn DatabaseOperator, path: &'a Path, null_represent: &'a str) -> Self {
        Self {
            operator,
            path,
            null_represent,
            columns: Vec::new(),
            writer: None,
            rows: 0,
        }
    }

    fn writer(&mut self) -> Result<&mut CsvRowWriter<BufWriter<File>>, Error> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::Processing("row received before column metadata".to_string()))
    }

    /// Flushes and closes the file. A scan that succeeded without reporting
    /// any columns still leaves an (empty) file behind.
    fn finish(mut self, scanned: bool) -> Result<u64, Error> {
        match self.writer.take() {
            Some(writer) => {
                let mut inner = writer.into_inner()?;
                inner.flush()?;
            }
            None if scanned => {
                File::create(self.path)?;
            }
            None => {}
        }
        Ok(self.rows)
    }
}

impl RowSink for CsvTableSink<'_> {
    fn columns(&mut self, columns: &[ColumnDescriptor]) -> Result<(), Error> {
        if self.writer.is_some() {
            return Err(Error::Processing(
                "query returned more than one result set".to_string(),
            ));
        }
        let file = File::create(self.path)?;
        let mut writer = CsvRowWriter::new(BufWriter::new(file));
        writer.write_header(columns)?;

        self.columns = columns.to_vec();
        self.writer = Some(writer);
        Ok(())
    }

    fn row(&mut self, values: &[RowValue]) -> Result<(), Error> {
        if values.len() != self.columns.len() {
            return Err(Error::Processing(format!(
                "row has {} values but the table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }

        let record = values
            .iter()
            .zip(&self.columns)
            .map(|(value, column)| self.operator.format_value(value, column, self.null_represent))
            .collect::<Result<Vec<_>, Error>>()?;

        self.writer()?.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, DatabaseKind};
    use crate::operator::memory::{MemoryOperator, MemoryTable};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> Config {
        let mut config = Config::new(DatabaseConfig::new(DatabaseKind::Mssql));
        config.export.out_dir = dir.join("out");
        config.export.null_represent = "N/A".to_string();
        config
    }

    fn scenario_table() -> MemoryTable {
        MemoryTable::new(
            "mixed",
            &[("int", "INT"), ("varchar", "VARCHAR"), ("float", "FLOAT"), ("bit", "BIT")],
            vec![
                vec![
                    RowValue::Int(1),
                    RowValue::Text("x".to_string()),
                    RowValue::Float(3.14),
                    RowValue::Bool(false),
                ],
                vec![
                    RowValue::Int(2),
                    RowValue::Text("y".to_string()),
                    RowValue::Null,
                    RowValue::Bool(true),
                ],
            ],
        )
    }

    #[test]
    fn test_export_mixed_table() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(temp_dir.path());
        let operator = MemoryOperator::new(vec![scenario_table()]);

        let export = TableExporter::new(&config, &operator).export("mixed").unwrap();

        assert_eq!(export.rows, 2);
        assert_eq!(export.path, temp_dir.path().join("out").join("mixed.csv"));
        assert_eq!(
            fs::read_to_string(&export.path).unwrap(),
            "int,varchar,float,bit\n1,x,3.14,0\n2,y,N/A,1\n"
        );
    }

    #[test]
    fn test_empty_table_has_header_only() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(temp_dir.path());
        let table = MemoryTable::new("empty", &[("id", "INT")], vec![]);
        let operator = MemoryOperator::new(vec![table]);

        let export = TableExporter::new(&config, &operator).export("empty").unwrap();

        assert_eq!(export.rows, 0);
        assert_eq!(fs::read_to_string(&export.path).unwrap(), "id\n");
    }

    #[test]
    fn test_query_failure_is_table_scoped() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(temp_dir.path());
        let mut operator = MemoryOperator::new(vec![scenario_table()]);
        operator.failing_tables = HashSet::from(["mixed".to_string()]);

        let result = TableExporter::new(&config, &operator).export("mixed");

        match result {
            Err(Error::Table { table, source }) => {
                assert_eq!(table, "mixed");
                assert!(matches!(*source, Error::Database(_)));
            }
            other => panic!("Expected Table error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_guid_aborts_table_but_flushes_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(temp_dir.path());
        let table = MemoryTable::new(
            "guids",
            &[("id", "UNIQUEIDENTIFIER")],
            vec![
                vec![RowValue::Bytes(vec![0u8; 16])],
                vec![RowValue::Bytes(vec![1, 2, 3])],
                vec![RowValue::Bytes(vec![0u8; 16])],
            ],
        );
        let operator = MemoryOperator::new(vec![table]);

        let result = TableExporter::new(&config, &operator).export("guids");

        match result {
            Err(err @ Error::Table { .. }) => {
                assert!(err.to_string().contains("column id (UNIQUEIDENTIFIER)"))
            }
            other => panic!("Expected Table error, got {:?}", other),
        }
        let written = fs::read_to_string(temp_dir.path().join("out").join("guids.csv")).unwrap();
        assert_eq!(written, "id\n00000000-0000-0000-0000-000000000000\n");
    }

    #[test]
    fn test_unsupported_column_degrades() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(temp_dir.path());
        let table = MemoryTable::new(
            "docs",
            &[("doc", "xml"), ("id", "int")],
            vec![
                vec![RowValue::Opaque, RowValue::Int(1)],
                vec![RowValue::Null, RowValue::Int(2)],
            ],
        );
        let operator = MemoryOperator::new(vec![table]);

        let export = TableExporter::new(&config, &operator).export("docs").unwrap();

        assert_eq!(
            fs::read_to_string(&export.path).unwrap(),
            "doc,id\n[UNSUPPORTED COLUMN TYPE],1\nN/A,2\n"
        );
    }

    #[test]
    fn test_existing_file_is_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(temp_dir.path());
        fs::create_dir_all(&config.export.out_dir).unwrap();
        fs::write(config.export.out_dir.join("mixed.csv"), "stale\nstale\nstale\nstale\n").unwrap();
        let operator = MemoryOperator::new(vec![scenario_table()]);

        let export = TableExporter::new(&config, &operator).export("mixed").unwrap();

        let written = fs::read_to_string(&export.path).unwrap();
        assert!(!written.contains("stale"));
    }

    #[test]
    fn test_output_file_path_rejects_separators() {
        let temp_dir = TempDir::new().unwrap();
        assert!(output_file_path(temp_dir.path(), "../escape").is_err());
        assert!(output_file_path(temp_dir.path(), "").is_err());

        let nested = temp_dir.path().join("a").join("b");
        let path = output_file_path(&nested, "t").unwrap();
        assert!(nested.is_dir());
        assert_eq!(path, nested.join("t.csv"));
    }
}
