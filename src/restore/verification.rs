// datastore-backup/src/restore/verification.rs
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use std::fmt;
use tracing::info;

use crate::config::{ConnectionConfig, is_valid_table_name};
use crate::errors::{AppError, Result};

/// md5 of the empty string; what an empty table hashes to.
pub const EMPTY_TABLE_CHECKSUM: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// Row count plus an order-independent content hash of one table.
///
/// Taken before a backup and again after a restore, two equal fingerprints
/// show the round trip preserved the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFingerprint {
    pub table: String,
    pub row_count: i64,
    pub checksum: String,
}

impl fmt::Display for TableFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} rows, md5 {}", self.table, self.row_count, self.checksum)
    }
}

pub fn connect_options(conn: &ConnectionConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&conn.host)
        .port(conn.port)
        .username(&conn.user)
        .password(&conn.password)
        .database(&conn.database)
}

/// `public.shooters` -> `"public"."shooters"`.
pub fn quote_table(table: &str) -> Result<String> {
    if !is_valid_table_name(table) {
        return Err(AppError::Config(format!("invalid table name: {:?}", table)));
    }
    Ok(table
        .split('.')
        .map(|part| format!("\"{}\"", part))
        .collect::<Vec<_>>()
        .join("."))
}

pub async fn table_fingerprint(conn: &ConnectionConfig, table: &str) -> Result<TableFingerprint> {
    let quoted = quote_table(table)?;
    let mut db = PgConnection::connect_with(&connect_options(conn)).await?;

    let row_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quoted))
        .fetch_one(&mut db)
        .await?;
    let checksum: Option<String> = sqlx::query_scalar(&format!(
        "SELECT md5(string_agg(t::text, E'\\n' ORDER BY t::text)) FROM {} AS t",
        quoted
    ))
    .fetch_one(&mut db)
    .await?;
    db.close().await?;

    let fingerprint = TableFingerprint {
        table: table.to_string(),
        row_count,
        checksum: checksum.unwrap_or_else(|| EMPTY_TABLE_CHECKSUM.to_string()),
    };
    info!("Fingerprint {}", fingerprint);
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_and_qualified_names() -> Result<()> {
        assert_eq!(quote_table("shooters")?, "\"shooters\"");
        assert_eq!(quote_table("public.shooter_images")?, "\"public\".\"shooter_images\"");
        Ok(())
    }

    #[test]
    fn rejects_injection_attempts() {
        assert!(quote_table("shooters; DROP TABLE shooters").is_err());
        assert!(quote_table("\"shooters\"").is_err());
    }

    #[tokio::test]
    async fn invalid_table_fails_before_connecting() {
        let conn = ConnectionConfig {
            host: "unreachable.invalid".into(),
            port: 5432,
            user: "u".into(),
            password: "p".into(),
            database: "d".into(),
        };
        let err = table_fingerprint(&conn, "a b").await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn display_is_operator_readable() {
        let fp = TableFingerprint {
            table: "shooters".into(),
            row_count: 2,
            checksum: EMPTY_TABLE_CHECKSUM.into(),
        };
        assert_eq!(fp.to_string(), format!("shooters: 2 rows, md5 {}", EMPTY_TABLE_CHECKSUM));
    }
}
