//! Local SQLite database layer for Pump Ledger.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, the shared
//! connection state handed to every operation, and the settings helpers
//! used for tank-capacity overrides.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 4;

/// Initialize the database at `{data_dir}/pump-ledger.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join("pump-ledger.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let wal = db_path.with_extension("db-wal");
                let shm = db_path.with_extension("db-shm");
                let _ = fs::remove_file(&wal);
                let _ = fs::remove_file(&shm);
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    // Ensure schema_version table exists first
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }
    if current < 4 {
        migrate_v4(conn)?;
    }

    Ok(())
}

/// Migration v1: daily sheet tables, users, and the settings store.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        -- app_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS app_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        -- daily_sheets: one per (date, pump)
        CREATE TABLE IF NOT EXISTS daily_sheets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            pump_id INTEGER NOT NULL DEFAULT 1,
            sales_person TEXT,
            total_nozzle_sales REAL NOT NULL DEFAULT 0,
            total_credit_sales REAL NOT NULL DEFAULT 0,
            total_oil_lube REAL NOT NULL DEFAULT 0,
            paytm_amount REAL NOT NULL DEFAULT 0,
            card_amount REAL NOT NULL DEFAULT 0,
            fleet_card_amount REAL NOT NULL DEFAULT 0,
            night_cash_amount REAL NOT NULL DEFAULT 0,
            total_to_bank REAL NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- nozzle_sales: per nozzle per sheet, replaced wholesale on save
        CREATE TABLE IF NOT EXISTS nozzle_sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            daily_sheet_id INTEGER NOT NULL REFERENCES daily_sheets(id),
            date TEXT NOT NULL,
            nozzle TEXT NOT NULL,
            product TEXT NOT NULL,
            open_reading REAL NOT NULL,
            close_reading REAL NOT NULL,
            testing REAL NOT NULL DEFAULT 0,
            total_sale REAL NOT NULL,
            rate REAL NOT NULL,
            total_amount REAL NOT NULL
        );

        -- credit_sales
        CREATE TABLE IF NOT EXISTS credit_sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            daily_sheet_id INTEGER REFERENCES daily_sheets(id),
            date TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            amount REAL NOT NULL,
            payment_method TEXT NOT NULL DEFAULT 'CREDIT'
        );

        -- oil_lube_sales
        CREATE TABLE IF NOT EXISTS oil_lube_sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            daily_sheet_id INTEGER REFERENCES daily_sheets(id),
            date TEXT NOT NULL,
            product_name TEXT NOT NULL,
            quantity REAL NOT NULL,
            price REAL NOT NULL,
            total REAL NOT NULL
        );

        -- users
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- Indexes
        CREATE INDEX IF NOT EXISTS idx_daily_sheets_date ON daily_sheets(date);
        CREATE INDEX IF NOT EXISTS idx_nozzle_sales_sheet ON nozzle_sales(daily_sheet_id);
        CREATE INDEX IF NOT EXISTS idx_nozzle_sales_date ON nozzle_sales(date);
        CREATE INDEX IF NOT EXISTS idx_credit_sales_sheet ON credit_sales(daily_sheet_id);
        CREATE INDEX IF NOT EXISTS idx_credit_sales_date ON credit_sales(date);
        CREATE INDEX IF NOT EXISTS idx_oil_lube_sales_sheet ON oil_lube_sales(daily_sheet_id);
        CREATE INDEX IF NOT EXISTS idx_oil_lube_sales_date ON oil_lube_sales(date);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        format!("migration v1: {e}")
    })?;

    info!("Applied migration v1 (core tables)");
    Ok(())
}

/// Migration v2: approval workflow columns and the one-sheet-per-day guarantee.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        ALTER TABLE daily_sheets ADD COLUMN is_approved INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE daily_sheets ADD COLUMN approved_by TEXT;
        ALTER TABLE daily_sheets ADD COLUMN approved_at TEXT;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_daily_sheets_date_pump
            ON daily_sheets(date, pump_id);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        format!("migration v2: {e}")
    })?;

    info!("Applied migration v2 (approval workflow)");
    Ok(())
}

/// Migration v3: tank DIP readings and the standalone expense log.
fn migrate_v3(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tank_readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            tank TEXT NOT NULL,
            dip_reading REAL NOT NULL,
            liters REAL,
            recorded_by TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            amount REAL NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_tank_readings_tank_date ON tank_readings(tank, date);
        CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date);

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| {
        error!("Migration v3 failed: {e}");
        format!("migration v3: {e}")
    })?;

    info!("Applied migration v3 (tank readings, expenses)");
    Ok(())
}

/// Migration v4: credit ledger lifecycle columns.
///
/// Credit entries created from a daily sheet start out pending; the ledger
/// view flips them to received independently of the owning sheet.
fn migrate_v4(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        ALTER TABLE credit_sales ADD COLUMN status TEXT NOT NULL DEFAULT 'pending';
        ALTER TABLE credit_sales ADD COLUMN received_date TEXT;
        ALTER TABLE credit_sales ADD COLUMN created_at TEXT DEFAULT (datetime('now'));

        CREATE INDEX IF NOT EXISTS idx_credit_sales_status ON credit_sales(status);

        INSERT INTO schema_version (version) VALUES (4);
        ",
    )
    .map_err(|e| {
        error!("Migration v4 failed: {e}");
        format!("migration v4: {e}")
    })?;

    info!("Applied migration v4 (credit ledger lifecycle)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM app_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO app_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

/// Build an in-memory `DbState` with the full schema (test helper).
#[cfg(test)]
pub fn test_db_state() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .expect("pragma setup");
    run_migrations_for_test(&conn);
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    /// Open an in-memory database and apply pragmas (mirrors open_and_configure).
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .expect("pragma setup");
        conn
    }

    /// Helper: list table names in the database.
    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_v1_to_latest() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations should apply cleanly");

        let tables = table_names(&conn);
        for expected in [
            "app_settings",
            "daily_sheets",
            "nozzle_sales",
            "credit_sales",
            "oil_lube_sales",
            "tank_readings",
            "expenses",
            "users",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .expect("read schema version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run should be a no-op");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .expect("count versions");
        assert_eq!(count, CURRENT_SCHEMA_VERSION as i64);
    }

    #[test]
    fn test_sheet_uniqueness_per_date_and_pump() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO daily_sheets (date, pump_id) VALUES ('2026-03-01', 1)",
            [],
        )
        .expect("first insert");

        let dup = conn.execute(
            "INSERT INTO daily_sheets (date, pump_id) VALUES ('2026-03-01', 1)",
            [],
        );
        assert!(dup.is_err(), "duplicate (date, pump) row must be rejected");

        // Same date on another pump is fine
        conn.execute(
            "INSERT INTO daily_sheets (date, pump_id) VALUES ('2026-03-01', 2)",
            [],
        )
        .expect("other pump insert");
    }

    #[test]
    fn test_settings_roundtrip() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        assert_eq!(get_setting(&conn, "tanks", "petrol_capacity"), None);
        set_setting(&conn, "tanks", "petrol_capacity", "15000").expect("set");
        assert_eq!(
            get_setting(&conn, "tanks", "petrol_capacity"),
            Some("15000".to_string())
        );
        set_setting(&conn, "tanks", "petrol_capacity", "16000").expect("overwrite");
        assert_eq!(
            get_setting(&conn, "tanks", "petrol_capacity"),
            Some("16000".to_string())
        );
    }
}
