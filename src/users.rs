//! User administration and login.
//!
//! One admin account is seeded on first run and cannot be deleted; the
//! admin creates owner/manager accounts from the settings screen. Login
//! verifies a bcrypt hash and returns the [`Principal`] that gated
//! operations take.

use bcrypt::{hash, verify, DEFAULT_COST};
use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};

use crate::access::{self, Action, Principal, Role};
use crate::db::DbState;
use crate::value_str;

const SEED_ADMIN_USERNAME: &str = "admin";
const SEED_ADMIN_PASSWORD: &str = "admin123";

/// Uniform login failure: never reveals whether the username exists.
const LOGIN_FAILED: &str = "Invalid username or password";

/// Insert the admin account if no admin exists yet. Idempotent.
pub fn seed_admin(db: &DbState) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let admin_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'admin'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| format!("count admins: {e}"))?;
    if admin_count > 0 {
        return Ok(());
    }

    let password_hash =
        hash(SEED_ADMIN_PASSWORD, DEFAULT_COST).map_err(|e| format!("hash password: {e}"))?;
    conn.execute(
        "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, 'admin')",
        params![SEED_ADMIN_USERNAME, password_hash],
    )
    .map_err(|e| format!("seed admin: {e}"))?;

    warn!("Seeded default admin account; change the password on first login");
    Ok(())
}

/// Verify credentials and return the authenticated principal.
pub fn login(db: &DbState, username: &str, password: &str) -> Result<Principal, String> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(LOGIN_FAILED.into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let row: Option<(i64, String, String, String)> = conn
        .query_row(
            "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .ok();

    let (id, username, password_hash, role) = match row {
        Some(r) => r,
        None => {
            warn!(username, "Login attempt for unknown user");
            return Err(LOGIN_FAILED.into());
        }
    };

    let ok = verify(password, &password_hash).map_err(|e| format!("verify password: {e}"))?;
    if !ok {
        warn!(username = %username, "Login attempt with wrong password");
        return Err(LOGIN_FAILED.into());
    }

    let role = Role::parse(&role).ok_or_else(|| format!("Corrupt role for user {username}"))?;

    info!(username = %username, role = role.as_str(), "User logged in");
    Ok(Principal { id, username, role })
}

/// Create an owner or manager account (admin only). The admin account is
/// seeded, never created here.
pub fn create_user(db: &DbState, principal: &Principal, payload: &Value) -> Result<Value, String> {
    access::require(principal, Action::ManageUsers)?;

    let username = value_str(payload, &["username"])
        .ok_or_else(|| "Username is required".to_string())?;
    let password = payload
        .get("password")
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| "Password is required".to_string())?;
    let role = value_str(payload, &["role"])
        .and_then(|r| Role::parse(&r))
        .ok_or_else(|| "Role must be owner or manager".to_string())?;
    if role == Role::Admin {
        return Err("Role must be owner or manager".into());
    }

    let password_hash = hash(password, DEFAULT_COST).map_err(|e| format!("hash password: {e}"))?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let inserted = conn.execute(
        "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
        params![username, password_hash, role.as_str()],
    );
    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(format!("Username already exists: {username}"));
        }
        Err(e) => return Err(format!("create user: {e}")),
    }
    let id = conn.last_insert_rowid();

    info!(id, username = %username, role = role.as_str(), by = %principal.username, "User created");

    Ok(serde_json::json!({
        "success": true,
        "id": id,
        "message": "User created!"
    }))
}

/// All accounts, without password hashes.
pub fn list_users(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare("SELECT id, username, role, created_at FROM users ORDER BY id")
        .map_err(|e| format!("prepare user list: {e}"))?;
    let rows: Vec<Value> = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, i64>(0)?,
                "username": row.get::<_, String>(1)?,
                "role": row.get::<_, String>(2)?,
                "createdAt": row.get::<_, Option<String>>(3)?,
            }))
        })
        .map_err(|e| format!("query users: {e}"))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(Value::Array(rows))
}

/// Delete an account (admin only). The admin account itself is protected.
pub fn delete_user(db: &DbState, principal: &Principal, user_id: i64) -> Result<Value, String> {
    access::require(principal, Action::ManageUsers)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let role: String = conn
        .query_row(
            "SELECT role FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(|_| "User not found".to_string())?;
    if role == "admin" {
        return Err("The admin account cannot be deleted".into());
    }

    conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])
        .map_err(|e| format!("delete user: {e}"))?;

    info!(user_id, by = %principal.username, "User deleted");
    Ok(serde_json::json!({ "success": true }))
}

// ===========================================================================
// Tests
// ===========================================================================
