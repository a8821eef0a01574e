pub mod config;
pub mod error;
pub mod operator;
pub mod processor;

pub use config::Config;
pub use error::Error;
pub use operator::{new_operator, DatabaseOperator};
pub use processor::{DbExportProcessor, ExportSummary};
