//! Standalone expense log. No relation to daily sheets.

use rusqlite::params;
use serde_json::Value;
use tracing::info;

use crate::access::{self, Action, Principal};
use crate::db::DbState;
use crate::{value_f64, value_str};

/// Record an expense. Name must be non-empty, amount positive, date valid.
pub fn add_expense(db: &DbState, payload: &Value) -> Result<Value, String> {
    let name = value_str(payload, &["name"])
        .ok_or_else(|| "Expense name is required".to_string())?;
    let amount = value_f64(payload, &["amount"])
        .ok_or_else(|| "Amount is required".to_string())?;
    if amount <= 0.0 {
        return Err("Amount must be positive".into());
    }
    let date = value_str(payload, &["date"])
        .ok_or_else(|| "Date is required".to_string())
        .and_then(|d| crate::normalize_date(&d))?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO expenses (name, amount, date) VALUES (?1, ?2, ?3)",
        params![name, amount, date],
    )
    .map_err(|e| format!("insert expense: {e}"))?;
    let id = conn.last_insert_rowid();

    info!(id, name = %name, amount, date = %date, "Expense added");

    Ok(serde_json::json!({
        "success": true,
        "id": id,
        "message": "Expense saved!"
    }))
}

/// All expenses newest first, with the overall total.
pub fn list_expenses(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, amount, date, created_at
             FROM expenses ORDER BY date DESC, id DESC",
        )
        .map_err(|e| format!("prepare expense list: {e}"))?;
    let rows: Vec<Value> = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, i64>(0)?,
                "name": row.get::<_, String>(1)?,
                "amount": row.get::<_, f64>(2)?,
                "date": row.get::<_, String>(3)?,
                "createdAt": row.get::<_, Option<String>>(4)?,
            }))
        })
        .map_err(|e| format!("query expenses: {e}"))?
        .filter_map(|r| r.ok())
        .collect();

    let total: f64 = rows
        .iter()
        .filter_map(|r| r.get("amount").and_then(|v| v.as_f64()))
        .sum();

    Ok(serde_json::json!({
        "success": true,
        "expenses": rows,
        "total": total,
    }))
}

/// Remove an expense (admin only).
pub fn delete_expense(db: &DbState, principal: &Principal, id: i64) -> Result<Value, String> {
    access::require(principal, Action::Delete)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute("DELETE FROM expenses WHERE id = ?1", params![id])
        .map_err(|e| format!("delete expense: {e}"))?;

    if changed == 0 {
        return Err("Expense not found".into());
    }

    info!(id, by = %principal.username, "Expense deleted");
    Ok(serde_json::json!({ "success": true }))
}

// ===========================================================================
// Tests
// ===========================================================================
