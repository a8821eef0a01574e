mod table;
mod writer;

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use rayon::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{Config, LoggingConfig};
use crate::error::Error;
use crate::operator::DatabaseOperator;

pub use self::table::{output_file_path, TableExport, TableExporter};
pub use self::writer::CsvRowWriter;

/// Outcome of one table's export.
#[derive(Debug)]
pub enum ExportResult {
    Exported(TableExport),
    Failed { table: String, error: Error },
}

impl ExportResult {
    pub fn table(&self) -> &str {
        match self {
            ExportResult::Exported(export) => &export.table,
            ExportResult::Failed { table, .. } => table,
        }
    }
}

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub results: Vec<ExportResult>,
}

impl ExportSummary {
    pub fn exported(&self) -> impl Iterator<Item = &TableExport> {
        self.results.iter().filter_map(|r| match r {
            ExportResult::Exported(export) => Some(export),
            ExportResult::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.results.iter().filter_map(|r| match r {
            ExportResult::Failed { table, error } => Some((table.as_str(), error)),
            ExportResult::Exported(_) => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Runs a whole export: resolves the tables, exports them in parallel and
/// reports what failed.
pub struct DbExportProcessor<O: DatabaseOperator> {
    config: Config,
    operator: O,
    progress_logger: ProgressLogger,
}

struct ProgressLogger {
    log_file: Option<Arc<Mutex<File>>>,
    log_path: Option<PathBuf>,
    start_time: Instant,
}

impl ProgressLogger {
    fn new(logging: &LoggingConfig) -> Result<Self, Error> {
        let start_time = Instant::now();
        let Some(log_dir) = logging.directory.as_deref() else {
            return Ok(Self {
                log_file: None,
                log_path: None,
                start_time,
            });
        };

        // Ensure the log directory exists
        fs::create_dir_all(log_dir).map_err(Error::Io)?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("{}{}.log", logging.prefix, timestamp));

        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(Error::Io)?;

        writeln!(log_file, "=== Log started at {} ===", timestamp).map_err(Error::Io)?;

        Ok(Self {
            log_file: Some(Arc::new(Mutex::new(log_file))),
            log_path: Some(log_path),
            start_time,
        })
    }

    fn log(&self, message: &str) -> Result<(), Error> {
        let elapsed = self.start_time.elapsed();
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let log_message = format!("[{} +{}s] {}\n", timestamp, elapsed.as_secs(), message);

        // Diagnostics go to stderr so stdout stays clean
        eprint!("{}", log_message);

        if let Some(log_file) = &self.log_file {
            let mut file = log_file.lock().map_err(|e|
                Error::Processing(format!("Failed to lock log file: {}", e)))?;

            file.write_all(log_message.as_bytes())
                .map_err(|e| Error::Processing(format!("Failed to write to log file: {}", e)))?;

            file.flush()
                .map_err(|e| Error::Processing(format!("Failed to flush log file: {}", e)))?;
        }

        Ok(())
    }

    fn get_log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }
}

impl<O: DatabaseOperator> DbExportProcessor<O> {
    pub fn new(config: Config, operator: O) -> Result<Self, Error> {
        config.export.validate()?;
        let progress_logger = ProgressLogger::new(&config.logging)?;

        Ok(Self {
            config,
            operator,
            progress_logger,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.progress_logger.get_log_path()
    }

    pub fn into_operator(self) -> O {
        self.operator
    }

    /// Exports every target table.
    ///
    /// Only a failure to connect or to list the schema's tables is returned as
    /// an error; per-table failures are reported and collected in the summary.
    pub fn process(&mut self) -> Result<ExportSummary, Error> {
        self.report("Starting export processing");

        self.operator
            .open()
            .map_err(|e| Error::fatal("Failed to connect to the database", e))?;

        let exported = self
            .resolve_tables()
            .and_then(|tables| self.export_tables(tables));
        let closed = self.operator.close();

        let summary = exported?;
        closed?;

        let failed = summary.failures().count();
        if failed > 0 {
            self.report(&format!(
                "Completed with {} of {} tables failed",
                failed,
                summary.results.len()
            ));
        } else {
            self.report("Successfully completed processing");
        }
        Ok(summary)
    }

    /// A broken log file never ends the run; the line already went to stderr.
    fn report(&self, message: &str) {
        if let Err(e) = self.progress_logger.log(message) {
            eprintln!("Warning: {}", e);
        }
    }

    fn resolve_tables(&self) -> Result<Vec<String>, Error> {
        let explicit = self.config.export.table_names();
        let tables = if explicit.is_empty() {
            self.operator
                .list_tables()
                .map_err(|e| Error::fatal("Failed to retrieve the list of tables", e))?
        } else {
            explicit
        };

        let mut seen = HashSet::new();
        Ok(tables
            .into_iter()
            .filter(|table| seen.insert(table.clone()))
            .collect())
    }

    fn export_tables(&self, tables: Vec<String>) -> Result<ExportSummary, Error> {
        let (tables, conflicts) = split_output_conflicts(tables);

        self.report(&format!(
            "Exporting {} tables to {}",
            tables.len(),
            self.config.export.out_dir.display()
        ));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.export.max_parallel)
            .build()
            .map_err(|e| Error::Processing(format!("Failed to start export workers: {}", e)))?;

        let progress_bar = if self.config.export.show_progress {
            ProgressBar::new(tables.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress_bar.set_style(ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map_err(|e| Error::Processing(format!("Failed to set progress bar style: {}", e)))?);

        let exporter = TableExporter::new(&self.config, &self.operator);

        let mut results: Vec<ExportResult> = pool.install(|| {
            tables.par_iter()
                .map(|table| {
                    let result = match exporter.export(table) {
                        Ok(export) => ExportResult::Exported(export),
                        Err(error) => ExportResult::Failed {
                            table: table.clone(),
                            error,
                        },
                    };
                    progress_bar.inc(1);
                    result
                })
                .collect()
        });

        progress_bar.finish_with_message("Export complete");
        results.extend(conflicts);

        for result in &results {
            match result {
                ExportResult::Exported(export) => self.report(&format!(
                    "Exported {} ({} rows)",
                    export.table, export.rows
                )),
                ExportResult::Failed { table, error } => {
                    self.report(&format!("Failed {}: {}", table, error))
                }
            }
        }

        Ok(ExportSummary { results })
    }
}

/// Splits off tables whose CSV file name only differs by ASCII case from an
/// earlier table's, so one file is never written by two tables.
fn split_output_conflicts(tables: Vec<String>) -> (Vec<String>, Vec<ExportResult>) {
    let mut owners: HashMap<String, String> = HashMap::new();
    let mut accepted = Vec::with_capacity(tables.len());
    let mut conflicts = Vec::new();

    for table in tables {
        match owners.get(&table.to_ascii_lowercase()) {
            Some(existing) => conflicts.push(ExportResult::Failed {
                error: Error::OutputConflict {
                    table: table.clone(),
                    existing: existing.clone(),
                },
                table,
            }),
            None => {
                owners.insert(table.to_ascii_lowercase(), table.clone());
                accepted.push(table);
            }
        }
    }

    (accepted, conflicts)
}
