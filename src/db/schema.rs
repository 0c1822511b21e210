//! Database and table convenience helpers.
//!
//! Thin wrappers over [`Database::query`]. Names are backtick-quoted, so any
//! identifier MySQL accepts can be passed as-is.

use crate::db::driver::Driver;
use crate::db::lifecycle::Database;
use crate::db::params::{escape_identifier, escape_qualified_identifier};
use crate::error::{DbError, DbResult};
use crate::models::{QueryOutput, Row};
use serde_json::Value as JsonValue;
use tracing::debug;

mod queries {
    pub const SHOW_DATABASES: &str = "SHOW DATABASES";
    pub const SHOW_TABLES: &str = "SHOW TABLES";
}

impl<D: Driver> Database<D> {
    /// Create database `name` if it does not exist and make it the default
    /// database of the connection.
    pub async fn create_db(&self, name: &str) -> DbResult<QueryOutput> {
        let quoted = quote(name)?;
        let output = self
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", quoted), &[])
            .await?;
        self.query(&format!("USE {}", quoted), &[]).await?;
        debug!(database = name, "Database created");
        Ok(output)
    }

    /// Empty `table`, which may be qualified as `db.table`.
    pub async fn truncate_table(&self, table: &str) -> DbResult<QueryOutput> {
        if table.trim().is_empty() {
            return Err(DbError::invalid_input("table name must not be empty"));
        }
        let sql = format!("TRUNCATE TABLE {}", escape_qualified_identifier(table));
        self.query(&sql, &[]).await
    }

    /// Names of the databases visible to the configured user.
    pub async fn get_dbs(&self) -> DbResult<Vec<String>> {
        let output = self.query(queries::SHOW_DATABASES, &[]).await?;
        Ok(first_column(&output))
    }

    pub async fn is_db_exist(&self, name: &str) -> DbResult<bool> {
        Ok(self.get_dbs().await?.iter().any(|db| db == name))
    }

    /// Names of the tables in the connection's default database.
    pub async fn get_tables(&self) -> DbResult<Vec<String>> {
        let output = self.query(queries::SHOW_TABLES, &[]).await?;
        Ok(first_column(&output))
    }

    /// Whether `table` exists in database `db`.
    pub async fn is_table_exist(&self, db: &str, table: &str) -> DbResult<bool> {
        let sql = format!("{} FROM {}", queries::SHOW_TABLES, quote(db)?);
        let output = self.query(&sql, &[]).await?;
        Ok(first_column(&output).iter().any(|t| t == table))
    }
}

fn quote(name: &str) -> DbResult<String> {
    if name.trim().is_empty() {
        return Err(DbError::invalid_input("database name must not be empty"));
    }
    Ok(escape_identifier(name))
}

/// SHOW DATABASES / SHOW TABLES return a single column ("Database",
/// "Tables_in_<db>").
fn first_column(output: &QueryOutput) -> Vec<String> {
    output.rows.iter().filter_map(first_string).collect()
}

fn first_string(row: &Row) -> Option<String> {
    match row.values().next()? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}
