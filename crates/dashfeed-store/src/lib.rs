//! # dashfeed store
//!
//! DuckDB-backed persistence for the dashfeed client.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `exchange_rates` | Last successfully fetched rate table, one row per currency |
//! | `preferences` | Key-value wallet preferences |
//! | `schema_migrations` | Applied migration versions |
//!
//! All values are bound as query parameters, never interpolated.
//!
//! ```rust,no_run
//! use dashfeed_store::{resolve_dashfeed_home, RateRecord, Store, StoreConfig};
//!
//! let store = Store::open(StoreConfig::in_home(resolve_dashfeed_home()))?;
//! store.replace_rates(&[RateRecord {
//!     currency_code: String::from("USD"),
//!     rate: String::from("31.25"),
//!     source: String::from("dashretail"),
//!     updated_at: String::from("2026-01-01T00:00:00Z"),
//! }])?;
//! # Ok::<(), dashfeed_store::StoreError>(())
//! ```

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};
use serde::Serialize;
use thiserror::Error;

pub use crate::duckdb::{DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration for the store database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for dashfeed data.
    pub dashfeed_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl StoreConfig {
    /// Configuration rooted at an explicit home directory.
    pub fn in_home(dashfeed_home: impl Into<PathBuf>) -> Self {
        let dashfeed_home = dashfeed_home.into();
        let db_path = dashfeed_home.join("db").join("dashfeed.duckdb");
        Self {
            dashfeed_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// One persisted exchange-rate row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateRecord {
    /// Currency code (e.g. "USD").
    pub currency_code: String,
    /// Decimal rate rendered as text to avoid float rounding.
    pub rate: String,
    /// Identifier of the source that produced the row.
    pub source: String,
    /// RFC3339 timestamp of the refresh that wrote the row.
    pub updated_at: String,
}

/// Handle to the dashfeed database.
#[derive(Clone)]
pub struct Store {
    config: StoreConfig,
    manager: DuckDbConnectionManager,
}

impl Store {
    /// Open a store with the specified configuration.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let store = Self { config, manager };
        store.initialize()?;
        Ok(store)
    }

    /// Apply pending schema migrations.
    pub fn initialize(&self) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        Ok(migrations::apply_migrations(&connection)?)
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Root directory this store lives under.
    pub fn home(&self) -> &Path {
        self.config.dashfeed_home.as_path()
    }

    /// Replace the whole rate table in one transaction.
    pub fn replace_rates(&self, rows: &[RateRecord]) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), StoreError> {
            connection.execute_batch("DELETE FROM exchange_rates")?;
            for row in rows {
                let params: [&dyn ToSql; 4] =
                    [&row.currency_code, &row.rate, &row.source, &row.updated_at];
                connection.execute(
                    "INSERT OR REPLACE INTO exchange_rates \
                     (currency_code, rate, source, updated_at) VALUES (?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    /// Load every persisted rate ordered by currency code.
    pub fn load_rates(&self) -> Result<Vec<RateRecord>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT currency_code, rate, source, updated_at \
             FROM exchange_rates ORDER BY currency_code",
        )?;
        let rows = statement.query_map([], read_rate_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Read a preference value.
    pub fn preference(&self, key: &str) -> Result<Option<String>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare("SELECT value FROM preferences WHERE key = ?")?;
        let params: [&dyn ToSql; 1] = [&key];
        let mut rows = statement.query_map(params.as_slice(), |row| row.get::<_, String>(0))?;
        Ok(rows.next().transpose()?)
    }

    /// Insert or overwrite a preference value.
    pub fn set_preference(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 2] = [&key, &value];
        connection.execute(
            "INSERT OR REPLACE INTO preferences (key, value, updated_at) \
             VALUES (?, ?, CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Delete a preference. Returns whether a row existed.
    pub fn remove_preference(&self, key: &str) -> Result<bool, StoreError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 1] = [&key];
        let removed = connection.execute("DELETE FROM preferences WHERE key = ?", params.as_slice())?;
        Ok(removed > 0)
    }

    /// All preferences ordered by key.
    pub fn preferences(&self) -> Result<Vec<(String, String)>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare("SELECT key, value FROM preferences ORDER BY key")?;
        let rows = statement.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn read_rate_row(row: &::duckdb::Row<'_>) -> Result<RateRecord, ::duckdb::Error> {
    Ok(RateRecord {
        currency_code: row.get(0)?,
        rate: row.get(1)?,
        source: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the dashfeed home directory from environment or default.
pub fn resolve_dashfeed_home() -> PathBuf {
    if let Some(path) = env::var_os("DASHFEED_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".dashfeed");
    }

    PathBuf::from(".dashfeed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp_store() -> (tempfile::TempDir, Store) {
        let temp = tempdir().expect("tempdir");
        let store = Store::open(StoreConfig::in_home(temp.path().join("home"))).expect("store open");
        (temp, store)
    }

    fn record(code: &str, rate: &str) -> RateRecord {
        RateRecord {
            currency_code: code.to_string(),
            rate: rate.to_string(),
            source: "dashretail".to_string(),
            updated_at: "2026-02-20T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let (_temp, store) = open_temp_store();
        assert_eq!(store.initialize().expect("second initialize"), 0);
        assert_eq!(migrations::known_versions().len(), 2);
    }

    #[test]
    fn replace_rates_overwrites_previous_table() {
        let (_temp, store) = open_temp_store();

        store
            .replace_rates(&[record("USD", "31.25"), record("VEF", "1000")])
            .expect("first replace");
        store
            .replace_rates(&[record("EUR", "29.10"), record("USD", "31.50")])
            .expect("second replace");

        let rows = store.load_rates().expect("load");
        let codes = rows.iter().map(|row| row.currency_code.as_str()).collect::<Vec<_>>();
        assert_eq!(codes, vec!["EUR", "USD"]);
        assert_eq!(rows[1].rate, "31.50");
    }

    #[test]
    fn lookups_bind_parameters() {
        let (_temp, store) = open_temp_store();
        let hostile = r#"USD'; DROP TABLE exchange_rates; --"#;

        store.replace_rates(&[record(hostile, "1")]).expect("replace");
        store.set_preference(hostile, "x").expect("set");

        let rows = store.load_rates().expect("load");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].currency_code, hostile);
        assert_eq!(store.preference(hostile).expect("lookup").as_deref(), Some("x"));
        assert!(store.preference("USD").expect("lookup").is_none());
    }

    #[test]
    fn preferences_round_trip_and_remove() {
        let (_temp, store) = open_temp_store();

        store.set_preference("pin_length", "4").expect("set");
        store.set_preference("pin_length", "6").expect("overwrite");
        store.set_preference("biometric_enabled", "true").expect("set");

        assert_eq!(store.preference("pin_length").expect("get").as_deref(), Some("6"));
        assert_eq!(store.preferences().expect("list").len(), 2);

        assert!(store.remove_preference("pin_length").expect("remove"));
        assert!(!store.remove_preference("pin_length").expect("remove again"));
        assert!(store.preference("pin_length").expect("get").is_none());
    }

    #[test]
    fn data_survives_reopen() {
        let temp = tempdir().expect("tempdir");
        let config = StoreConfig::in_home(temp.path().join("home"));

        {
            let store = Store::open(config.clone()).expect("open");
            store.replace_rates(&[record("USD", "31.25")]).expect("replace");
        }

        let reopened = Store::open(config).expect("reopen");
        assert_eq!(reopened.load_rates().expect("load").len(), 1);
    }
}
