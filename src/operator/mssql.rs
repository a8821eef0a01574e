use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as TimeDelta, NaiveDate, NaiveDateTime};
use futures_util::TryStreamExt;
use r2d2::{ManageConnection, Pool, PooledConnection};
use tiberius::{AuthMethod, Client, ColumnData, EncryptionLevel, FromSql, QueryItem};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::DatabaseConfig;
use crate::error::Error;
use crate::operator::{ColumnDescriptor, ColumnType, DatabaseOperator, RowSink, RowValue};

type MssqlClient = Client<Compat<TcpStream>>;

const LIST_TABLES_SQL: &str = "
    SELECT
        TABLE_SCHEMA,
        TABLE_NAME
    FROM
        INFORMATION_SCHEMA.TABLES
    WHERE
        TABLE_TYPE = 'BASE TABLE'
    AND
        TABLE_SCHEMA = @P1";

const COLUMN_TYPES_SQL: &str = "
    SELECT
        COLUMN_NAME,
        DATA_TYPE
    FROM
        INFORMATION_SCHEMA.COLUMNS
    WHERE
        TABLE_SCHEMA = @P1
    AND
        TABLE_NAME = @P2
    ORDER BY
        ORDINAL_POSITION";

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// r2d2 manager that opens tiberius clients on a shared tokio runtime.
pub struct MssqlConnectionManager {
    config: tiberius::Config,
    runtime: Arc<Runtime>,
}

impl MssqlConnectionManager {
    pub fn new(settings: &DatabaseConfig, runtime: Arc<Runtime>) -> Self {
        let mut config = tiberius::Config::new();
        config.host(&settings.host);
        config.port(settings.port());
        config.database(&settings.database);
        config.authentication(AuthMethod::sql_server(&settings.user, &settings.password));
        config.encryption(EncryptionLevel::NotSupported);

        Self { config, runtime }
    }
}

impl ManageConnection for MssqlConnectionManager {
    type Connection = MssqlClient;
    type Error = Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.runtime.block_on(async {
            let tcp = TcpStream::connect(self.config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            let client = Client::connect(self.config.clone(), tcp.compat_write()).await?;
            Ok::<_, Error>(client)
        })
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        self.runtime.block_on(async {
            conn.simple_query("SELECT 1").await?.into_row().await?;
            Ok::<(), Error>(())
        })
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// SQL Server backend.
///
/// Each export task checks out its own pooled connection, so the pool size
/// is the effective bound on concurrent queries.
pub struct MssqlOperator {
    settings: DatabaseConfig,
    pool_size: u32,
    runtime: Option<Arc<Runtime>>,
    pool: Option<Pool<MssqlConnectionManager>>,
}

impl MssqlOperator {
    pub fn new(settings: DatabaseConfig, max_parallel: usize) -> Self {
        Self {
            settings,
            pool_size: u32::try_from(max_parallel).unwrap_or(u32::MAX).max(1),
            runtime: None,
            pool: None,
        }
    }

    fn connection(&self) -> Result<(PooledConnection<MssqlConnectionManager>, &Runtime), Error> {
        let (Some(pool), Some(runtime)) = (self.pool.as_ref(), self.runtime.as_deref()) else {
            return Err(Error::Database("connection is not open".to_string()));
        };
        Ok((pool.get()?, runtime))
    }
}

impl DatabaseOperator for MssqlOperator {
    fn open(&mut self) -> Result<(), Error> {
        let runtime = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()?,
        );
        let manager = MssqlConnectionManager::new(&self.settings, Arc::clone(&runtime));
        let pool = Pool::builder()
            .max_size(self.pool_size)
            .min_idle(Some(1))
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)?;

        // Checkout runs is_valid, which pings the server
        drop(pool.get()?);

        self.runtime = Some(runtime);
        self.pool = Some(pool);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        // Connections go before the runtime that drives them
        self.pool = None;
        self.runtime = None;
        Ok(())
    }

    fn list_tables(&self) -> Result<Vec<String>, Error> {
        let (mut conn, runtime) = self.connection()?;
        let schema = self.settings.schema.as_str();

        let rows = runtime.block_on(async {
            let stream = conn.query(LIST_TABLES_SQL, &[&schema]).await?;
            Ok::<_, Error>(stream.into_first_result().await?)
        })?;

        rows.iter()
            .map(|row| {
                row.try_get::<&str, _>("TABLE_NAME")?
                    .map(String::from)
                    .ok_or_else(|| Error::Database("catalog returned a NULL table name".to_string()))
            })
            .collect()
    }

    fn query_all_records(&self, table: &str, sink: &mut dyn RowSink) -> Result<(), Error> {
        let (mut conn, runtime) = self.connection()?;
        let schema = self.settings.schema.as_str();
        runtime.block_on(async {
            let declared = declared_types(&mut conn, schema, table).await?;
            let sql = format!(
                "SELECT {} FROM {}.{}",
                select_list(&declared),
                quote_identifier(schema),
                quote_identifier(table)
            );
            let declared: HashMap<&str, &str> = declared
                .iter()
                .map(|(name, data_type)| (name.as_str(), data_type.as_str()))
                .collect();

            let mut stream = conn.query(sql, &[]).await?;
            let mut columns: Vec<ColumnDescriptor> = Vec::new();

            while let Some(item) = stream.try_next().await? {
                match item {
                    QueryItem::Metadata(meta) => {
                        columns = meta
                            .columns()
                            .iter()
                            .map(|column| {
                                let type_name = declared
                                    .get(column.name())
                                    .map(|t| t.to_string())
                                    .unwrap_or_else(|| wire_type_name(column.column_type()));
                                ColumnDescriptor::new(column.name(), type_name)
                            })
                            .collect();
                        sink.columns(&columns)?;
                    }
                    QueryItem::Row(row) => {
                        let values = row
                            .into_iter()
                            .zip(&columns)
                            .map(|(data, column)| to_row_value(data, column))
                            .collect::<Result<Vec<_>, Error>>()?;
                        sink.row(&values)?;
                    }
                }
            }
            Ok::<(), Error>(())
        })
    }
}

/// Declared `(name, type)` pairs of `table`, in column order.
async fn declared_types(
    conn: &mut MssqlClient,
    schema: &str,
    table: &str,
) -> Result<Vec<(String, String)>, Error> {
    let rows = conn
        .query(COLUMN_TYPES_SQL, &[&schema, &table])
        .await?
        .into_first_result()
        .await?;

    let mut types = Vec::with_capacity(rows.len());
    for row in &rows {
        if let (Some(name), Some(data_type)) = (
            row.try_get::<&str, _>("COLUMN_NAME")?,
            row.try_get::<&str, _>("DATA_TYPE")?,
        ) {
            types.push((name.to_string(), data_type.to_string()));
        }
    }
    Ok(types)
}

/// Column list for the table scan.
///
/// The driver decodes money through `f64`, so money columns are cast to a
/// decimal of the same range and arrive as exact numerics.
fn select_list(declared: &[(String, String)]) -> String {
    let has_money = declared
        .iter()
        .any(|(_, data_type)| money_cast(data_type).is_some());
    if !has_money {
        return "*".to_string();
    }

    declared
        .iter()
        .map(|(name, data_type)| {
            let column = quote_identifier(name);
            match money_cast(data_type) {
                Some(target) => format!("CAST({} AS {}) AS {}", column, target, column),
                None => column,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn money_cast(data_type: &str) -> Option<&'static str> {
    match data_type.to_ascii_lowercase().as_str() {
        "money" => Some("decimal(19,4)"),
        "smallmoney" => Some("decimal(10,4)"),
        _ => None,
    }
}

fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Type name derived from the TDS column metadata, used when the catalog
/// did not report the column.
fn wire_type_name(column_type: tiberius::ColumnType) -> String {
    use tiberius::ColumnType as Wire;

    let name = match column_type {
        Wire::Bit | Wire::Bitn => "bit",
        Wire::Int1 => "tinyint",
        Wire::Int2 => "smallint",
        Wire::Int4 | Wire::Intn => "int",
        Wire::Int8 => "bigint",
        Wire::Float4 => "real",
        Wire::Float8 | Wire::Floatn => "float",
        Wire::Money => "money",
        Wire::Money4 => "smallmoney",
        Wire::Decimaln => "decimal",
        Wire::Numericn => "numeric",
        Wire::Datetime | Wire::Datetimen => "datetime",
        Wire::Datetime4 => "smalldatetime",
        Wire::Daten => "date",
        Wire::Datetime2 => "datetime2",
        Wire::Guid => "uniqueidentifier",
        Wire::BigChar => "char",
        Wire::BigVarChar => "varchar",
        Wire::Text => "text",
        Wire::NChar => "nchar",
        Wire::NVarchar => "nvarchar",
        Wire::NText => "ntext",
        other => return format!("{:?}", other).to_lowercase(),
    };
    name.to_string()
}

fn to_row_value(data: ColumnData<'static>, column: &ColumnDescriptor) -> Result<RowValue, Error> {
    let value = match (&column.column_type, data) {
        (ColumnType::DateTime, ColumnData::DateTime(Some(dt))) => {
            datetime_from_ticks(dt.days(), dt.seconds_fragments())
                .map_or(RowValue::Opaque, RowValue::DateTime)
        }
        (ColumnType::Date, data) => {
            NaiveDate::from_sql(&data)?.map_or(RowValue::Null, RowValue::Date)
        }
        (ColumnType::DateTime | ColumnType::DateTime2 | ColumnType::SmallDateTime, data) => {
            NaiveDateTime::from_sql(&data)?.map_or(RowValue::Null, RowValue::DateTime)
        }
        (_, data) => plain_value(data),
    };
    Ok(value)
}

/// `datetime` counts days since 1900-01-01 and 1/300 second ticks since
/// midnight. Ticks are rounded to the nearest millisecond.
fn datetime_from_ticks(days: i32, ticks: u32) -> Option<NaiveDateTime> {
    let seconds = i64::from(ticks / 300);
    let millis = (i64::from(ticks % 300) * 20 + 3) / 6;

    NaiveDate::from_ymd_opt(1900, 1, 1)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(TimeDelta::days(i64::from(days)))?
        .checked_add_signed(TimeDelta::seconds(seconds))?
        .checked_add_signed(TimeDelta::milliseconds(millis))
}

fn plain_value(data: ColumnData<'static>) -> RowValue {
    let value = match data {
        ColumnData::U8(v) => v.map(|n| RowValue::Int(n.into())),
        ColumnData::I16(v) => v.map(|n| RowValue::Int(n.into())),
        ColumnData::I32(v) => v.map(|n| RowValue::Int(n.into())),
        ColumnData::I64(v) => v.map(RowValue::Int),
        ColumnData::F32(v) => v.map(RowValue::Real),
        ColumnData::F64(v) => v.map(RowValue::Float),
        ColumnData::Bit(v) => v.map(RowValue::Bool),
        ColumnData::String(v) => v.map(|s| RowValue::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map(|g| RowValue::Bytes(g.to_bytes_le().to_vec())),
        ColumnData::Binary(v) => v.map(|b| RowValue::Bytes(b.into_owned())),
        ColumnData::Numeric(v) => {
            v.map(|n| RowValue::Bytes(numeric_text(n.value(), n.scale()).into_bytes()))
        }
        ColumnData::Xml(v) => v.map(|_| RowValue::Opaque),
        ColumnData::DateTime(v) => v.map(|_| RowValue::Opaque),
        ColumnData::SmallDateTime(v) => v.map(|_| RowValue::Opaque),
        ColumnData::Time(v) => v.map(|_| RowValue::Opaque),
        ColumnData::Date(v) => v.map(|_| RowValue::Opaque),
        ColumnData::DateTime2(v) => v.map(|_| RowValue::Opaque),
        ColumnData::DateTimeOffset(v) => v.map(|_| RowValue::Opaque),
    };
    value.unwrap_or(RowValue::Null)
}

/// Exact decimal text of an unscaled value, e.g. (-5, 2) is `-0.05`.
fn numeric_text(value: i128, scale: u8) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let digits = value.unsigned_abs().to_string();
    let scale = usize::from(scale);
    if scale == 0 {
        return format!("{}{}", sign, digits);
    }

    let padded = format!("{:0>width$}", digits, width = scale + 1);
    let (int_part, fraction) = padded.split_at(padded.len() - scale);
    format!("{}{}.{}", sign, int_part, fraction)
}
