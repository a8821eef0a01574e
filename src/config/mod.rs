mod args;
mod database;
mod export;
mod logging;

use serde::Deserialize;
use std::fs;
use std::path::Path;
use crate::error::Error;

pub use self::args::{parse_args, usage_message, PASSWORD_ENV};
pub use self::database::{DatabaseConfig, DatabaseKind, DEFAULT_MSSQL_PORT};
pub use self::export::{parse_table_names, ExportConfig};
pub use self::logging::LoggingConfig;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn new(database: DatabaseConfig) -> Self {
        Self {
            database,
            export: ExportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, Error> {
        serde_yaml::from_str(content).map_err(Error::from)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.database.validate()?;
        self.export.validate()
    }
}
