use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

use crate::config::{parse_table_names, Config, DatabaseConfig, DatabaseKind};
use crate::error::Error;

pub const PASSWORD_ENV: &str = "DB_PUKE_PASSWORD";

const EXAMPLES: &str = "Example:
  mssql(SQLServer):
    DB_PUKE_PASSWORD=saPassword1234 db-puke mssql -h localhost -d dummy_database -s dummy_schema -u sa";

#[derive(Parser, Debug)]
#[command(name = "db-puke", version, about = "database data exporter")]
struct Cli {
    #[command(subcommand)]
    command: DatabaseCommand,
}

#[derive(Subcommand, Debug)]
enum DatabaseCommand {
    /// Export every table of a SQL Server schema
    #[command(disable_help_flag = true, after_help = EXAMPLES)]
    Mssql(ConnectionArgs),
}

/// Flags of one database type. `-h` is the host, so help is `--help` only.
#[derive(Args, Debug)]
struct ConnectionArgs {
    /// database server host (default: localhost)
    #[arg(short = 'h', long = "host", alias = "h")]
    host: Option<String>,

    /// database server port (default: 1433)
    #[arg(short = 'p', long = "port", alias = "p")]
    port: Option<u16>,

    /// database
    #[arg(short = 'd', long = "database", alias = "d")]
    database: Option<String>,

    /// database schema
    #[arg(short = 's', long = "schema", alias = "s")]
    schema: Option<String>,

    /// database user name
    #[arg(short = 'u', long = "user", alias = "u")]
    user: Option<String>,

    /// database user password (or use the DB_PUKE_PASSWORD env var)
    #[arg(short = 'P', long = "password", alias = "P")]
    password: Option<String>,

    /// export directory (default: db-puke-exported)
    #[arg(short = 'o', long = "out-dir", alias = "o")]
    out_dir: Option<PathBuf>,

    /// string to represent NULL (default: NULL)
    #[arg(short = 'N', long = "null", alias = "N")]
    null_represent: Option<String>,

    /// table names to export (comma-separated). exports all tables if omitted.
    #[arg(short = 't', long = "tables", alias = "t")]
    tables: Option<String>,

    /// maximum number of tables exported at once (default: 8)
    #[arg(short = 'j', long = "max-parallel", alias = "j")]
    max_parallel: Option<usize>,

    /// YAML configuration file; command line flags take precedence
    #[arg(short = 'c', long = "config", alias = "c")]
    config: Option<PathBuf>,

    #[arg(long = "help", action = ArgAction::Help)]
    help: Option<bool>,
}

impl ConnectionArgs {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.database.host = host;
        }
        if let Some(port) = self.port {
            config.database.port = Some(port);
        }
        if let Some(database) = self.database {
            config.database.database = database;
        }
        if let Some(schema) = self.schema {
            config.database.schema = schema;
        }
        if let Some(user) = self.user {
            config.database.user = user;
        }
        if let Some(password) = self.password {
            config.database.password = password;
        }
        if let Some(out_dir) = self.out_dir {
            config.export.out_dir = out_dir;
        }
        if let Some(null_represent) = self.null_represent {
            config.export.null_represent = null_represent;
        }
        if let Some(tables) = self.tables {
            config.export.tables = parse_table_names(&tables);
        }
        if let Some(max_parallel) = self.max_parallel {
            config.export.max_parallel = max_parallel;
        }
    }
}

/// Help text for the `mssql` command.
pub fn usage_message(program: &str) -> String {
    let mut command = Cli::command().bin_name(program.to_string());
    command.build();
    match command.find_subcommand_mut("mssql") {
        Some(mssql) => mssql.render_help().to_string(),
        None => command.render_help().to_string(),
    }
}

/// Builds the run configuration from `argv`.
///
/// `password_env` is the value of [`PASSWORD_ENV`], if set; it wins over `-P`.
pub fn parse_args(args: &[String], password_env: Option<String>) -> Result<Config, Error> {
    let program = args.first().map(String::as_str).unwrap_or("db-puke");

    if args.len() < 3 || args.iter().skip(1).any(|arg| arg == "-help") {
        return Err(Error::Usage(usage_message(program)));
    }
    if !args[1].starts_with('-') {
        args[1].parse::<DatabaseKind>()?;
    }

    let cli = Cli::try_parse_from(args).map_err(usage_error)?;
    let (kind, flags) = match cli.command {
        DatabaseCommand::Mssql(flags) => (DatabaseKind::Mssql, flags),
    };

    // A config file is the base layer, flags are applied on top of it
    let mut config = match &flags.config {
        Some(path) => Config::from_file(path)?,
        None => Config::new(DatabaseConfig::new(kind)),
    };
    if config.database.kind != kind {
        return Err(Error::Config(format!(
            "config file is for {} but {} was requested",
            config.database.kind, kind
        )));
    }

    flags.apply(&mut config);

    if let Some(password) = password_env {
        config.database.password = password;
    }

    config.validate()?;
    Ok(config)
}

/// Bad values (e.g. a non-numeric port) are configuration errors, anything
/// else clap rejects gets the usage text.
fn usage_error(err: clap::Error) -> Error {
    let message = err.to_string().trim_end().to_string();
    match err.kind() {
        ErrorKind::ValueValidation => Error::Config(message),
        _ => Error::Usage(message),
    }
}
