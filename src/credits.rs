//! Standalone credit ledger.
//!
//! Credit entries come from two places: daily sheet saves (always pending)
//! and direct ledger entry. Status moves between pending and received;
//! `received_date` is set exactly when status is received.

use chrono::Local;
use rusqlite::params;
use serde_json::Value;
use tracing::info;

use crate::access::{self, Action, Principal};
use crate::db::DbState;
use crate::{value_f64, value_i64, value_str};

fn parse_status(raw: &str) -> Result<&'static str, String> {
    match raw.trim().to_lowercase().as_str() {
        "pending" => Ok("pending"),
        "received" => Ok("received"),
        other => Err(format!("Unknown credit status: {other}")),
    }
}

/// Record a credit entry directly in the ledger (no owning sheet).
pub fn add_credit(db: &DbState, payload: &Value) -> Result<Value, String> {
    let name = value_str(payload, &["customerName", "name"])
        .ok_or_else(|| "Customer name is required".to_string())?;
    let amount = value_f64(payload, &["amount"])
        .ok_or_else(|| "Amount is required".to_string())?;
    if amount <= 0.0 {
        return Err("Amount must be positive".into());
    }
    let date = value_str(payload, &["date"])
        .ok_or_else(|| "Date is required".to_string())
        .and_then(|d| crate::normalize_date(&d))?;
    let status = match value_str(payload, &["status"]) {
        Some(s) => parse_status(&s)?,
        None => "pending",
    };
    let received_date = if status == "received" {
        let d = value_str(payload, &["receivedDate"])
            .ok_or_else(|| "Received date is required for received credits".to_string())?;
        Some(crate::normalize_date(&d)?)
    } else {
        None
    };
    let payment_method = value_str(payload, &["paymentMethod"]).unwrap_or_else(|| "CREDIT".into());

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO credit_sales
            (daily_sheet_id, date, customer_name, amount, payment_method, status, received_date)
         VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6)",
        params![date, name, amount, payment_method, status, received_date],
    )
    .map_err(|e| format!("insert credit: {e}"))?;
    let id = conn.last_insert_rowid();

    info!(id, customer = %name, amount, status, "Credit entry added");

    Ok(serde_json::json!({
        "success": true,
        "id": id,
        "message": "Credit entry saved!"
    }))
}

/// All credit entries newest first, plus pending/received/overall totals.
pub fn list_credits(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT id, date, customer_name, amount, payment_method,
                    status, received_date, daily_sheet_id
             FROM credit_sales ORDER BY date DESC, id DESC",
        )
        .map_err(|e| format!("prepare credit list: {e}"))?;
    let rows: Vec<Value> = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, i64>(0)?,
                "date": row.get::<_, String>(1)?,
                "customerName": row.get::<_, String>(2)?,
                "amount": row.get::<_, f64>(3)?,
                "paymentMethod": row.get::<_, String>(4)?,
                "status": row.get::<_, String>(5)?,
                "receivedDate": row.get::<_, Option<String>>(6)?,
                "dailySheetId": row.get::<_, Option<i64>>(7)?,
            }))
        })
        .map_err(|e| format!("query credits: {e}"))?
        .filter_map(|r| r.ok())
        .collect();

    let sum_for = |status: &str| -> f64 {
        rows.iter()
            .filter(|r| r.get("status").and_then(|v| v.as_str()) == Some(status))
            .filter_map(|r| r.get("amount").and_then(|v| v.as_f64()))
            .sum()
    };
    let pending_total = sum_for("pending");
    let received_total = sum_for("received");

    Ok(serde_json::json!({
        "success": true,
        "credits": rows,
        "pendingTotal": pending_total,
        "receivedTotal": received_total,
        "total": pending_total + received_total,
    }))
}

/// Move a credit entry between pending and received.
///
/// Transition to received stamps `received_date` (payload date, or today);
/// transition back to pending clears it.
pub fn update_credit_status(db: &DbState, payload: &Value) -> Result<Value, String> {
    let id = value_i64(payload, &["id"]).ok_or_else(|| "Credit id is required".to_string())?;
    let status = value_str(payload, &["status"])
        .ok_or_else(|| "Status is required".to_string())
        .and_then(|s| parse_status(&s).map(str::to_string))?;

    let received_date = if status == "received" {
        match value_str(payload, &["receivedDate"]) {
            Some(d) => Some(crate::normalize_date(&d)?),
            None => Some(Local::now().date_naive().format("%Y-%m-%d").to_string()),
        }
    } else {
        None
    };

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "UPDATE credit_sales SET status = ?1, received_date = ?2 WHERE id = ?3",
            params![status, received_date, id],
        )
        .map_err(|e| format!("update credit status: {e}"))?;

    if changed == 0 {
        return Err("Credit entry not found".into());
    }

    info!(id, status = %status, "Credit status updated");
    Ok(serde_json::json!({ "success": true }))
}

/// Remove a credit entry (admin only).
pub fn delete_credit(db: &DbState, principal: &Principal, id: i64) -> Result<Value, String> {
    access::require(principal, Action::Delete)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute("DELETE FROM credit_sales WHERE id = ?1", params![id])
        .map_err(|e| format!("delete credit: {e}"))?;

    if changed == 0 {
        return Err("Credit entry not found".into());
    }

    info!(id, by = %principal.username, "Credit entry deleted");
    Ok(serde_json::json!({ "success": true }))
}

// ===========================================================================
// Tests
// ===========================================================================
