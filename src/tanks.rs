//! Tank DIP reading tracker.
//!
//! Readings are append-only: each save inserts a new row and the level view
//! takes the most recent row per tank. Corrections go through the gated
//! update/delete operations, which touch a single row and never cascade.

use rusqlite::params;
use serde_json::Value;
use tracing::info;

use crate::access::{self, Action, Principal};
use crate::config;
use crate::db::DbState;
use crate::sheets::Product;
use crate::{value_f64, value_i64, value_str};

fn parse_tank(payload: &Value) -> Result<Product, String> {
    let raw = value_str(payload, &["tank", "product"])
        .ok_or_else(|| "Tank is required".to_string())?;
    Product::parse(&raw).ok_or_else(|| format!("Unknown tank: {raw}"))
}

/// Fill percentage for display, rounded to a whole number.
fn fill_percentage(liters: f64, capacity: f64) -> f64 {
    if capacity <= 0.0 {
        return 0.0;
    }
    (liters / capacity * 100.0).round()
}

/// Record a new DIP reading. Liters defaults to the dip value when the
/// converted figure is not supplied.
pub fn save_tank_reading(db: &DbState, payload: &Value) -> Result<Value, String> {
    let tank = parse_tank(payload)?;
    let date = value_str(payload, &["date"])
        .ok_or_else(|| "Date is required".to_string())
        .and_then(|d| crate::normalize_date(&d))?;
    let dip = value_f64(payload, &["dipReading", "dip"])
        .ok_or_else(|| "DIP reading is required".to_string())?;
    if dip < 0.0 {
        return Err("DIP reading cannot be negative".into());
    }
    let liters = value_f64(payload, &["liters"]).unwrap_or(dip);
    let recorded_by = value_str(payload, &["recordedBy"]);

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO tank_readings (date, tank, dip_reading, liters, recorded_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![date, tank.as_str(), dip, liters, recorded_by],
    )
    .map_err(|e| format!("insert tank reading: {e}"))?;
    let id = conn.last_insert_rowid();

    info!(id, tank = tank.as_str(), date = %date, liters, "Tank reading saved");

    Ok(serde_json::json!({
        "success": true,
        "id": id,
        "message": "Tank reading saved!"
    }))
}

/// Most recent reading per tank, with capacity and a fill percentage
/// clamped to 0..100 for the gauge display.
pub fn latest_tank_readings(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut readings = Vec::new();
    for tank in [Product::Petrol, Product::Diesel] {
        let capacity = config::tank_capacity(&conn, tank);
        let row: Option<(i64, String, f64, Option<f64>)> = conn
            .query_row(
                "SELECT id, date, dip_reading, liters FROM tank_readings
                 WHERE tank = ?1 ORDER BY date DESC, id DESC LIMIT 1",
                params![tank.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .ok();

        let entry = match row {
            Some((id, date, dip, liters)) => {
                let liters = liters.unwrap_or(dip);
                serde_json::json!({
                    "tank": tank.as_str(),
                    "id": id,
                    "date": date,
                    "dipReading": dip,
                    "liters": liters,
                    "capacity": capacity,
                    "percentage": fill_percentage(liters, capacity).clamp(0.0, 100.0),
                })
            }
            None => serde_json::json!({
                "tank": tank.as_str(),
                "id": Value::Null,
                "date": Value::Null,
                "dipReading": 0.0,
                "liters": 0.0,
                "capacity": capacity,
                "percentage": 0.0,
            }),
        };
        readings.push(entry);
    }

    Ok(Value::Array(readings))
}

/// Reading history, newest first. Percentage is reported unclamped so an
/// over-capacity entry is visible in the list. A non-positive limit yields
/// an empty list.
pub fn tank_history(db: &DbState, limit: i64) -> Result<Value, String> {
    if limit <= 0 {
        return Ok(Value::Array(Vec::new()));
    }
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT id, date, tank, dip_reading, liters, recorded_by, created_at
             FROM tank_readings ORDER BY date DESC, id DESC LIMIT ?1",
        )
        .map_err(|e| format!("prepare tank history: {e}"))?;

    let rows: Vec<Value> = stmt
        .query_map(params![limit], |row| {
            let tank: String = row.get(2)?;
            let dip: f64 = row.get(3)?;
            let liters: Option<f64> = row.get(4)?;
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                tank,
                dip,
                liters.unwrap_or(dip),
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })
        .map_err(|e| format!("query tank history: {e}"))?
        .filter_map(|r| r.ok())
        .map(|(id, date, tank, dip, liters, recorded_by, created_at)| {
            let capacity = Product::parse(&tank)
                .map(|t| config::tank_capacity(&conn, t))
                .unwrap_or(0.0);
            serde_json::json!({
                "id": id,
                "date": date,
                "tank": tank,
                "dipReading": dip,
                "liters": liters,
                "recordedBy": recorded_by,
                "createdAt": created_at,
                "percentage": fill_percentage(liters, capacity),
            })
        })
        .collect();

    Ok(Value::Array(rows))
}

/// Correct a single reading (admin/owner).
pub fn update_tank_reading(
    db: &DbState,
    principal: &Principal,
    payload: &Value,
) -> Result<Value, String> {
    access::require(principal, Action::EditTank)?;

    let id = value_i64(payload, &["id"]).ok_or_else(|| "Reading id is required".to_string())?;
    let dip = value_f64(payload, &["dipReading", "dip"])
        .ok_or_else(|| "DIP reading is required".to_string())?;
    if dip < 0.0 {
        return Err("DIP reading cannot be negative".into());
    }
    let liters = value_f64(payload, &["liters"]).unwrap_or(dip);
    let date = match value_str(payload, &["date"]) {
        Some(d) => Some(crate::normalize_date(&d)?),
        None => None,
    };

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "UPDATE tank_readings SET
                dip_reading = ?1,
                liters = ?2,
                date = COALESCE(?3, date)
             WHERE id = ?4",
            params![dip, liters, date, id],
        )
        .map_err(|e| format!("update tank reading: {e}"))?;

    if changed == 0 {
        return Err("Tank reading not found".into());
    }

    info!(id, by = %principal.username, "Tank reading updated");
    Ok(serde_json::json!({ "success": true }))
}

/// Remove a single reading (admin only).
pub fn delete_tank_reading(db: &DbState, principal: &Principal, id: i64) -> Result<Value, String> {
    access::require(principal, Action::DeleteTank)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute("DELETE FROM tank_readings WHERE id = ?1", params![id])
        .map_err(|e| format!("delete tank reading: {e}"))?;

    if changed == 0 {
        return Err("Tank reading not found".into());
    }

    info!(id, by = %principal.username, "Tank reading deleted");
    Ok(serde_json::json!({ "success": true }))
}

// ===========================================================================
// Tests
// ===========================================================================
