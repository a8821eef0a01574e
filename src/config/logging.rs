use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// When set, diagnostics are also appended to a file in this directory.
    pub directory: Option<PathBuf>,
    pub prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: "export_".to_string(),
        }
    }
}
