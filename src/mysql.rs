//! MySQL client and query execution for seatable-mysync.

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::transform::{RawRow, SourceValue};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// MySQL client wrapper.
pub struct MySqlClient {
    pool: MySqlPool,
    label: String,
}

impl MySqlClient {
    /// Connect to a MySQL source, selecting the given database.
    #[instrument(skip(config), fields(source = %config.name, database = %database))]
    pub async fn connect(config: &SourceConfig, database: &str) -> Result<Self> {
        let label = connection_label(config, database);
        info!("Connecting to {}...", label);

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(database);

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| Error::mysql_connection(format!("Failed to connect to {}", label), e))?;

        info!("Connected to {}", label);
        Ok(Self { pool, label })
    }

    /// Test connectivity.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::mysql_connection(format!("Ping failed for {}", self.label), e))?;
        Ok(())
    }

    /// Execute a SQL statement and return all rows with tagged values, in
    /// query column order.
    ///
    /// No retry here: a failed query fails the dataset (and the task).
    #[instrument(skip(self, sql), fields(dataset = %dataset))]
    pub async fn execute_query(&self, dataset: &str, sql: &str) -> Result<Vec<RawRow>> {
        debug!("Executing query: {}", sql);

        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::query(dataset, "Query execution failed", e))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(decode_row(dataset, row)?);
        }

        debug!("Fetched {} rows for dataset '{}'", results.len(), dataset);
        Ok(results)
    }

    /// Close the connection pool. Safe to call more than once.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Semantic kind of a MySQL column, derived from its reported type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Decimal,
    Date,
    DateTime,
    Timestamp,
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Text,
}

fn kind_of(type_name: &str) -> ColumnKind {
    if type_name.ends_with("UNSIGNED") {
        return ColumnKind::UInt;
    }
    match type_name {
        "DECIMAL" | "NEWDECIMAL" => ColumnKind::Decimal,
        "DATE" => ColumnKind::Date,
        "DATETIME" => ColumnKind::DateTime,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "BOOLEAN" => ColumnKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => ColumnKind::Int,
        "FLOAT" => ColumnKind::Float,
        "DOUBLE" => ColumnKind::Double,
        _ => ColumnKind::Text,
    }
}

fn decode_row(dataset: &str, row: &MySqlRow) -> Result<RawRow> {
    let mut out = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, i, kind_of(column.type_info().name()))
            .map_err(|e| Error::query(dataset, format!("Failed to decode column '{}'", column.name()), e))?;
        out.push((column.name().to_string(), value));
    }
    Ok(out)
}

fn decode_value(
    row: &MySqlRow,
    idx: usize,
    kind: ColumnKind,
) -> std::result::Result<SourceValue, sqlx::Error> {
    let value = match kind {
        ColumnKind::Decimal => row
            .try_get_unchecked::<Option<BigDecimal>, _>(idx)?
            .map(SourceValue::Decimal),
        ColumnKind::Date => row
            .try_get_unchecked::<Option<NaiveDate>, _>(idx)?
            .map(SourceValue::Date),
        ColumnKind::DateTime => row
            .try_get_unchecked::<Option<NaiveDateTime>, _>(idx)?
            .map(SourceValue::DateTime),
        ColumnKind::Timestamp => row
            .try_get_unchecked::<Option<DateTime<Utc>>, _>(idx)?
            .map(|dt| SourceValue::DateTime(dt.naive_utc())),
        ColumnKind::Bool => row
            .try_get_unchecked::<Option<bool>, _>(idx)?
            .map(SourceValue::Bool),
        ColumnKind::Int => row
            .try_get_unchecked::<Option<i64>, _>(idx)?
            .map(SourceValue::Int),
        ColumnKind::UInt => row
            .try_get_unchecked::<Option<u64>, _>(idx)?
            .map(SourceValue::UInt),
        ColumnKind::Float => row
            .try_get_unchecked::<Option<f32>, _>(idx)?
            .map(|f| SourceValue::Float(f as f64)),
        ColumnKind::Double => row
            .try_get_unchecked::<Option<f64>, _>(idx)?
            .map(SourceValue::Float),
        ColumnKind::Text => match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(text) => text.map(SourceValue::Text),
            // Binary payloads still come through, lossily, instead of
            // failing the whole dataset.
            Err(_) => row
                .try_get_unchecked::<Option<Vec<u8>>, _>(idx)?
                .map(|bytes| SourceValue::Text(String::from_utf8_lossy(&bytes).into_owned())),
        },
    };

    Ok(value.unwrap_or(SourceValue::Null))
}

/// Connection label for logging; never contains the password.
fn connection_label(config: &SourceConfig, database: &str) -> String {
    format!(
        "mysql://{}@{}:{}/{}",
        config.username, config.host, config.port, database
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_type_names() {
        assert_eq!(kind_of("NEWDECIMAL"), ColumnKind::Decimal);
        assert_eq!(kind_of("DATE"), ColumnKind::Date);
        assert_eq!(kind_of("DATETIME"), ColumnKind::DateTime);
        assert_eq!(kind_of("TIMESTAMP"), ColumnKind::Timestamp);
        assert_eq!(kind_of("BIGINT"), ColumnKind::Int);
        assert_eq!(kind_of("INT UNSIGNED"), ColumnKind::UInt);
        assert_eq!(kind_of("BIGINT UNSIGNED"), ColumnKind::UInt);
        assert_eq!(kind_of("FLOAT"), ColumnKind::Float);
        assert_eq!(kind_of("DOUBLE"), ColumnKind::Double);
        assert_eq!(kind_of("VARCHAR"), ColumnKind::Text);
        assert_eq!(kind_of("ENUM"), ColumnKind::Text);
        assert_eq!(kind_of("JSON"), ColumnKind::Text);
    }

    #[test]
    fn test_connection_label_masks_password() {
        let config = SourceConfig {
            name: "primary".into(),
            host: "db.internal".into(),
            port: 3306,
            username: "sync".into(),
            password: "hunter2".into(),
        };
        let label = connection_label(&config, "chpm_v2");
        assert_eq!(label, "mysql://sync@db.internal:3306/chpm_v2");
        assert!(!label.contains("hunter2"));
    }
}
