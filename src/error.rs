use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Csv(csv::Error),
    Config(String),
    Usage(String),
    Database(String),
    Format(String),
    OutputConflict { table: String, existing: String },
    Table { table: String, source: Box<Error> },
    Fatal { context: String, source: Box<Error> },
    Processing(String),
}

impl Error {
    /// Attaches the table name to an error raised while exporting that table.
    pub fn in_table(self, table: &str) -> Self {
        match self {
            Error::Table { .. } | Error::OutputConflict { .. } | Error::Fatal { .. } => self,
            other => Error::Table {
                table: table.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Marks an error that ends the whole run.
    pub fn fatal(context: &str, source: Error) -> Self {
        Error::Fatal {
            context: context.to_string(),
            source: Box::new(source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Yaml(err) => Some(err),
            Error::Csv(err) => Some(err),
            Error::Table { source, .. } | Error::Fatal { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Yaml(err) => write!(f, "YAML parsing error: {}", err),
            Error::Csv(err) => write!(f, "CSV write error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Usage(msg) => write!(f, "{}", msg),
            Error::Database(msg) => write!(f, "Database error: {}", msg),
            Error::Format(msg) => write!(f, "Format error: {}", msg),
            Error::OutputConflict { table, existing } => write!(
                f,
                "Output conflict: table {} would overwrite the file of table {}",
                table, existing
            ),
            Error::Table { table, source } => write!(f, "Table {}: {}", table, source),
            Error::Fatal { context, source } => write!(f, "{}: {}", context, source),
            Error::Processing(msg) => write!(f, "Processing error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Yaml(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Csv(err)
    }
}

impl From<tiberius::error::Error> for Error {
    fn from(err: tiberius::error::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Database(format!("connection pool: {}", err))
    }
}
