use std::path::PathBuf;
use tempfile::TempDir;

use db_puke::config::{DatabaseConfig, DatabaseKind};
use db_puke::Config;

pub fn setup_test_environment() -> (TempDir, Config, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("exported");

    let mut database = DatabaseConfig::new(DatabaseKind::Mssql);
    database.database = "dummy_database".to_string();
    database.schema = "dummy_schema".to_string();
    database.user = "sa".to_string();
    database.password = "saPassword1234".to_string();

    let mut config = Config::new(database);
    config.export.out_dir = out_dir.clone();
    config.export.show_progress = false;

    (temp_dir, config, out_dir)
}
