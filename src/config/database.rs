use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub const DEFAULT_MSSQL_PORT: u16 = 1433;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Mssql,
}

impl DatabaseKind {
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseKind::Mssql => DEFAULT_MSSQL_PORT,
        }
    }
}

impl FromStr for DatabaseKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mssql" => Ok(DatabaseKind::Mssql),
            other => Err(Error::Config(format!(
                "specified database type ({}) is not supported",
                other
            ))),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Mssql => write!(f, "mssql"),
        }
    }
}

#[derive(Clone, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub kind: DatabaseKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    pub schema: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl DatabaseConfig {
    pub fn new(kind: DatabaseKind) -> Self {
        Self {
            kind,
            host: default_host(),
            port: None,
            database: String::new(),
            schema: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.kind.default_port())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.database.is_empty() {
            return Err(Error::Config("please specify the database name (-d)".to_string()));
        }
        if self.schema.is_empty() {
            return Err(Error::Config("please specify the schema name (-s)".to_string()));
        }
        if self.user.is_empty() {
            return Err(Error::Config("please specify the username (-u)".to_string()));
        }
        if self.password.is_empty() {
            return Err(Error::Config(
                "please specify the database password (-P)".to_string(),
            ));
        }
        Ok(())
    }
}

// Keep the password out of debug output and logs.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}
