use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Error;

pub const DEFAULT_OUT_DIR: &str = "db-puke-exported";
pub const DEFAULT_NULL_REPRESENT: &str = "NULL";
pub const DEFAULT_MAX_PARALLEL: usize = 8;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub out_dir: PathBuf,
    pub null_represent: String,
    pub tables: Vec<String>,
    pub max_parallel: usize,
    pub show_progress: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            null_represent: DEFAULT_NULL_REPRESENT.to_string(),
            tables: Vec::new(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            show_progress: true,
        }
    }
}

impl ExportConfig {
    /// Explicit table names with blanks trimmed and empty entries dropped.
    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_parallel == 0 {
            return Err(Error::Config(
                "max_parallel must be at least 1 (-j)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Splits a comma-separated table option, keeping the order given.
pub fn parse_table_names(option: &str) -> Vec<String> {
    option
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}
