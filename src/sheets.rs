//! Daily sheet reconciliation for Pump Ledger.
//!
//! Transforms one day's raw entries for one pump (nozzle meter readings,
//! credit entries, oil/lube lines, digital-payment amounts) into a persisted
//! daily sheet plus its line items, and computes the cash figure expected at
//! the bank. Saves are upserts keyed on (date, pump): nozzle rows are
//! replaced wholesale, credit and oil/lube rows only when the incoming set
//! is non-empty so a partial re-save cannot wipe curated entries.
//!
//! Totals are always recomputed here from the raw entries; client-supplied
//! totals are ignored.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::access::{self, Action, Principal};
use crate::db::DbState;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Fuel product dispensed by a nozzle (also identifies a storage tank).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Product {
    Petrol,
    Diesel,
}

impl Product {
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Petrol => "Petrol",
            Product::Diesel => "Diesel",
        }
    }

    pub fn parse(s: &str) -> Option<Product> {
        match s.trim().to_lowercase().as_str() {
            "petrol" => Some(Product::Petrol),
            "diesel" => Some(Product::Diesel),
            _ => None,
        }
    }
}

/// Meter readings arrive as strings from form inputs; accept both shapes.
fn de_f64_flexible<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => Ok(s.trim().parse::<f64>().unwrap_or(0.0)),
        _ => Ok(0.0),
    }
}

/// One nozzle's raw meter readings for the day.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NozzleEntry {
    pub nozzle: String,
    pub product: Product,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub open_reading: f64,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub close_reading: f64,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub testing: f64,
}

/// Computed liters and amount for one nozzle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NozzleTotals {
    pub liters_sold: f64,
    pub amount: f64,
}

/// One credit entry from the sheet form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditEntry {
    #[serde(default, alias = "customerName")]
    pub name: String,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub amount: f64,
    #[serde(default, alias = "paymentMethod")]
    pub payment_method: Option<String>,
}

impl CreditEntry {
    /// Entries without a customer name or a positive amount are dropped on
    /// save, not stored.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && self.amount > 0.0
    }
}

/// One oil/lube product line from the sheet form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OilLubeLine {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: String,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub price: f64,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub quantity: f64,
}

impl OilLubeLine {
    /// Display name stored in the row: "<name> <size>".
    pub fn product_name(&self) -> String {
        format!("{} {}", self.name.trim(), self.size.trim())
            .trim()
            .to_string()
    }

    pub fn total(&self) -> f64 {
        self.quantity * self.price
    }
}

/// Digital-payment and night-cash amounts for the day.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payments {
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub paytm: f64,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub card: f64,
    // Historical spelling "fleatCard" still arrives from older clients
    #[serde(default, alias = "fleatCard", deserialize_with = "de_f64_flexible")]
    pub fleet_card: f64,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub night_cash: f64,
}

/// The full save payload for one (date, pump) sheet.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySheetPayload {
    pub date: String,
    #[serde(default = "default_pump_id")]
    pub pump_id: i64,
    #[serde(default)]
    pub sales_person: Option<String>,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub petrol_rate: f64,
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub diesel_rate: f64,
    #[serde(default)]
    pub nozzles: Vec<NozzleEntry>,
    #[serde(default)]
    pub credit_sales: Vec<CreditEntry>,
    #[serde(default)]
    pub oil_lube_sales: Vec<OilLubeLine>,
    #[serde(default)]
    pub payment_methods: Payments,
}

fn default_pump_id() -> i64 {
    1
}

/// Aggregate figures for one day, derived entirely from raw entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTotals {
    pub total_nozzle_sales: f64,
    pub total_credit_sales: f64,
    pub total_oil_lube: f64,
    pub grand_total: f64,
    pub total_card_paytm: f64,
    pub total_to_bank: f64,
}

// ---------------------------------------------------------------------------
// Pure computation
// ---------------------------------------------------------------------------

/// Per-nozzle liters and amount.
///
/// liters = max(0, close − open − testing); a closing reading below
/// opening + testing clamps to zero rather than guessing at meter rollover.
/// amount = liters × rate for the nozzle's product.
pub fn compute_nozzle_totals(
    nozzles: &[NozzleEntry],
    petrol_rate: f64,
    diesel_rate: f64,
) -> Vec<NozzleTotals> {
    nozzles
        .iter()
        .map(|n| {
            let liters_sold = (n.close_reading - n.open_reading - n.testing).max(0.0);
            let rate = match n.product {
                Product::Petrol => petrol_rate,
                Product::Diesel => diesel_rate,
            };
            NozzleTotals {
                liters_sold,
                amount: liters_sold * rate,
            }
        })
        .collect()
}

/// Fold raw day entries into the reconciliation figures.
///
/// total_to_bank may legitimately come out negative (a data-entry
/// inconsistency); it is surfaced as-is for human review, never rejected.
pub fn compute_day_totals(
    nozzle_totals: &[NozzleTotals],
    credit_entries: &[CreditEntry],
    oil_lube_lines: &[OilLubeLine],
    payments: &Payments,
) -> DayTotals {
    let total_nozzle_sales: f64 = nozzle_totals.iter().map(|n| n.amount).sum();
    let total_credit_sales: f64 = credit_entries
        .iter()
        .filter(|c| c.is_valid())
        .map(|c| c.amount)
        .sum();
    let total_oil_lube: f64 = oil_lube_lines
        .iter()
        .filter(|l| l.quantity > 0.0)
        .map(|l| l.total())
        .sum();

    let grand_total = total_nozzle_sales + total_oil_lube;
    let total_card_paytm = payments.paytm + payments.card + payments.fleet_card;
    let total_to_bank =
        grand_total - (total_card_paytm + total_credit_sales + payments.night_cash);

    DayTotals {
        total_nozzle_sales,
        total_credit_sales,
        total_oil_lube,
        grand_total,
        total_card_paytm,
        total_to_bank,
    }
}

// ---------------------------------------------------------------------------
// Save daily sheet (upsert)
// ---------------------------------------------------------------------------

/// Save one day's sheet for one pump. Upsert keyed on (date, pump).
///
/// Creating a sheet needs the Save capability (every role); overwriting an
/// existing sheet is an edit and needs the Edit capability (admin/owner).
/// Nozzle rows are replaced unconditionally. Credit and oil/lube rows are
/// replaced only when the incoming set is non-empty; an empty set leaves
/// previously stored rows untouched. The whole save runs in one immediate
/// transaction.
pub fn save_daily_sheet(
    db: &DbState,
    principal: &Principal,
    payload: &Value,
) -> Result<Value, String> {
    let data: DailySheetPayload = serde_json::from_value(payload.clone())
        .map_err(|e| format!("Invalid daily sheet payload: {e}"))?;
    let date = crate::normalize_date(&data.date)?;

    let nozzle_totals = compute_nozzle_totals(&data.nozzles, data.petrol_rate, data.diesel_rate);
    let totals = compute_day_totals(
        &nozzle_totals,
        &data.credit_sales,
        &data.oil_lube_sales,
        &data.payment_methods,
    );

    if totals.total_to_bank < 0.0 {
        warn!(
            date = %date,
            pump_id = data.pump_id,
            total_to_bank = totals.total_to_bank,
            "Negative cash-to-bank figure, saving for review"
        );
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let existing_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM daily_sheets WHERE date = ?1 AND pump_id = ?2",
            params![date, data.pump_id],
            |row| row.get(0),
        )
        .ok();

    match existing_id {
        Some(_) => access::require(principal, Action::Edit)?,
        None => access::require(principal, Action::Save)?,
    }

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<i64, String> {
        let sheet_id = match existing_id {
            Some(id) => {
                conn.execute(
                    "UPDATE daily_sheets SET
                        sales_person = ?1,
                        total_nozzle_sales = ?2,
                        total_credit_sales = ?3,
                        total_oil_lube = ?4,
                        paytm_amount = ?5,
                        card_amount = ?6,
                        fleet_card_amount = ?7,
                        night_cash_amount = ?8,
                        total_to_bank = ?9,
                        updated_at = datetime('now')
                     WHERE id = ?10",
                    params![
                        data.sales_person,
                        totals.total_nozzle_sales,
                        totals.total_credit_sales,
                        totals.total_oil_lube,
                        data.payment_methods.paytm,
                        data.payment_methods.card,
                        data.payment_methods.fleet_card,
                        data.payment_methods.night_cash,
                        totals.total_to_bank,
                        id,
                    ],
                )
                .map_err(|e| format!("update sheet: {e}"))?;

                // Nozzle rows are the sheet's snapshot: always replaced.
                conn.execute(
                    "DELETE FROM nozzle_sales WHERE daily_sheet_id = ?1",
                    params![id],
                )
                .map_err(|e| format!("clear nozzle rows: {e}"))?;

                // Credit/oil rows survive an omitting re-save.
                if data.credit_sales.iter().any(|c| c.is_valid()) {
                    conn.execute(
                        "DELETE FROM credit_sales WHERE daily_sheet_id = ?1",
                        params![id],
                    )
                    .map_err(|e| format!("clear credit rows: {e}"))?;
                }
                if data.oil_lube_sales.iter().any(|l| l.quantity > 0.0) {
                    conn.execute(
                        "DELETE FROM oil_lube_sales WHERE daily_sheet_id = ?1",
                        params![id],
                    )
                    .map_err(|e| format!("clear oil/lube rows: {e}"))?;
                }
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO daily_sheets (
                        date, pump_id, sales_person,
                        total_nozzle_sales, total_credit_sales, total_oil_lube,
                        paytm_amount, card_amount, fleet_card_amount,
                        night_cash_amount, total_to_bank
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        date,
                        data.pump_id,
                        data.sales_person,
                        totals.total_nozzle_sales,
                        totals.total_credit_sales,
                        totals.total_oil_lube,
                        data.payment_methods.paytm,
                        data.payment_methods.card,
                        data.payment_methods.fleet_card,
                        data.payment_methods.night_cash,
                        totals.total_to_bank,
                    ],
                )
                .map_err(|e| format!("insert sheet: {e}"))?;
                conn.last_insert_rowid()
            }
        };

        for (entry, computed) in data.nozzles.iter().zip(nozzle_totals.iter()) {
            let rate = match entry.product {
                Product::Petrol => data.petrol_rate,
                Product::Diesel => data.diesel_rate,
            };
            conn.execute(
                "INSERT INTO nozzle_sales (
                    daily_sheet_id, date, nozzle, product,
                    open_reading, close_reading, testing,
                    total_sale, rate, total_amount
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    sheet_id,
                    date,
                    entry.nozzle,
                    entry.product.as_str(),
                    entry.open_reading,
                    entry.close_reading,
                    entry.testing,
                    computed.liters_sold,
                    rate,
                    computed.amount,
                ],
            )
            .map_err(|e| format!("insert nozzle row: {e}"))?;
        }

        for entry in data.credit_sales.iter().filter(|c| c.is_valid()) {
            conn.execute(
                "INSERT INTO credit_sales (
                    daily_sheet_id, date, customer_name, amount, payment_method, status
                 ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
                params![
                    sheet_id,
                    date,
                    entry.name.trim(),
                    entry.amount,
                    entry.payment_method.as_deref().unwrap_or("CREDIT"),
                ],
            )
            .map_err(|e| format!("insert credit row: {e}"))?;
        }

        for line in data.oil_lube_sales.iter().filter(|l| l.quantity > 0.0) {
            conn.execute(
                "INSERT INTO oil_lube_sales (
                    daily_sheet_id, date, product_name, quantity, price, total
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    sheet_id,
                    date,
                    line.product_name(),
                    line.quantity,
                    line.price,
                    line.total(),
                ],
            )
            .map_err(|e| format!("insert oil/lube row: {e}"))?;
        }

        Ok(sheet_id)
    })();

    let sheet_id = match result {
        Ok(id) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| format!("commit: {e}"))?;
            id
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    };

    info!(
        sheet_id,
        date = %date,
        pump_id = data.pump_id,
        total_to_bank = totals.total_to_bank,
        updated = existing_id.is_some(),
        "Daily sheet saved"
    );

    Ok(serde_json::json!({
        "success": true,
        "sheetId": sheet_id,
        "message": if existing_id.is_some() { "Daily sheet updated!" } else { "Daily sheet saved!" },
        "totals": totals,
    }))
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

/// Approve a daily sheet. One-way: Draft → Approved, never back.
///
/// Stamps the approver's username and an RFC 3339 timestamp. Fails if the
/// sheet is missing or already approved.
pub fn approve_daily_sheet(
    db: &DbState,
    principal: &Principal,
    sheet_id: i64,
) -> Result<Value, String> {
    access::require(principal, Action::Approve)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let is_approved: i64 = conn
        .query_row(
            "SELECT is_approved FROM daily_sheets WHERE id = ?1",
            params![sheet_id],
            |row| row.get(0),
        )
        .map_err(|_| "Daily sheet not found".to_string())?;

    if is_approved != 0 {
        return Err("Daily sheet is already approved".into());
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE daily_sheets SET is_approved = 1, approved_by = ?1, approved_at = ?2
         WHERE id = ?3",
        params![principal.username, now, sheet_id],
    )
    .map_err(|e| format!("approve sheet: {e}"))?;

    info!(sheet_id, approved_by = %principal.username, "Daily sheet approved");

    Ok(serde_json::json!({ "success": true }))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn sheet_row_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(serde_json::json!({
        "id": row.get::<_, i64>(0)?,
        "date": row.get::<_, String>(1)?,
        "pumpId": row.get::<_, i64>(2)?,
        "salesPerson": row.get::<_, Option<String>>(3)?,
        "totalNozzleSales": row.get::<_, f64>(4)?,
        "totalCreditSales": row.get::<_, f64>(5)?,
        "totalOilLube": row.get::<_, f64>(6)?,
        "paytmAmount": row.get::<_, f64>(7)?,
        "cardAmount": row.get::<_, f64>(8)?,
        "fleetCardAmount": row.get::<_, f64>(9)?,
        "nightCashAmount": row.get::<_, f64>(10)?,
        "totalToBank": row.get::<_, f64>(11)?,
        "isApproved": row.get::<_, i64>(12)? != 0,
        "approvedBy": row.get::<_, Option<String>>(13)?,
        "approvedAt": row.get::<_, Option<String>>(14)?,
    }))
}

const SHEET_COLUMNS: &str = "id, date, pump_id, sales_person,
    total_nozzle_sales, total_credit_sales, total_oil_lube,
    paytm_amount, card_amount, fleet_card_amount, night_cash_amount,
    total_to_bank, is_approved, approved_by, approved_at";

/// Sheet plus its line items, or JSON null when absent.
pub fn daily_sheet_by_date(db: &DbState, date: &str, pump_id: i64) -> Result<Value, String> {
    let date = crate::normalize_date(date)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let sheet_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM daily_sheets WHERE date = ?1 AND pump_id = ?2",
            params![date, pump_id],
            |row| row.get(0),
        )
        .ok();

    match sheet_id {
        Some(id) => sheet_details(&conn, id),
        None => Ok(Value::Null),
    }
}

/// Sheet plus its line items by id, or JSON null when absent.
pub fn daily_sheet_details(db: &DbState, sheet_id: i64) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    sheet_details(&conn, sheet_id)
}

fn sheet_details(conn: &Connection, sheet_id: i64) -> Result<Value, String> {
    let sheet = conn
        .query_row(
            &format!("SELECT {SHEET_COLUMNS} FROM daily_sheets WHERE id = ?1"),
            params![sheet_id],
            sheet_row_to_json,
        )
        .ok();

    let mut sheet = match sheet {
        Some(s) => s,
        None => return Ok(Value::Null),
    };

    let mut nozzle_stmt = conn
        .prepare(
            "SELECT nozzle, product, open_reading, close_reading, testing,
                    total_sale, rate, total_amount
             FROM nozzle_sales WHERE daily_sheet_id = ?1 ORDER BY nozzle",
        )
        .map_err(|e| format!("prepare nozzle query: {e}"))?;
    let nozzle_rows: Vec<Value> = nozzle_stmt
        .query_map(params![sheet_id], |row| {
            Ok(serde_json::json!({
                "nozzle": row.get::<_, String>(0)?,
                "product": row.get::<_, String>(1)?,
                "openReading": row.get::<_, f64>(2)?,
                "closeReading": row.get::<_, f64>(3)?,
                "testing": row.get::<_, f64>(4)?,
                "totalSale": row.get::<_, f64>(5)?,
                "rate": row.get::<_, f64>(6)?,
                "totalAmount": row.get::<_, f64>(7)?,
            }))
        })
        .map_err(|e| format!("query nozzle rows: {e}"))?
        .filter_map(|r| r.ok())
        .collect();

    let mut credit_stmt = conn
        .prepare(
            "SELECT id, customer_name, amount, payment_method, status, received_date
             FROM credit_sales WHERE daily_sheet_id = ?1 ORDER BY id",
        )
        .map_err(|e| format!("prepare credit query: {e}"))?;
    let credit_rows: Vec<Value> = credit_stmt
        .query_map(params![sheet_id], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, i64>(0)?,
                "customerName": row.get::<_, String>(1)?,
                "amount": row.get::<_, f64>(2)?,
                "paymentMethod": row.get::<_, String>(3)?,
                "status": row.get::<_, String>(4)?,
                "receivedDate": row.get::<_, Option<String>>(5)?,
            }))
        })
        .map_err(|e| format!("query credit rows: {e}"))?
        .filter_map(|r| r.ok())
        .collect();

    let mut oil_stmt = conn
        .prepare(
            "SELECT product_name, quantity, price, total
             FROM oil_lube_sales WHERE daily_sheet_id = ?1 ORDER BY id",
        )
        .map_err(|e| format!("prepare oil/lube query: {e}"))?;
    let oil_rows: Vec<Value> = oil_stmt
        .query_map(params![sheet_id], |row| {
            Ok(serde_json::json!({
                "productName": row.get::<_, String>(0)?,
                "quantity": row.get::<_, f64>(1)?,
                "price": row.get::<_, f64>(2)?,
                "total": row.get::<_, f64>(3)?,
            }))
        })
        .map_err(|e| format!("query oil/lube rows: {e}"))?
        .filter_map(|r| r.ok())
        .collect();

    if let Some(obj) = sheet.as_object_mut() {
        obj.insert("nozzleSales".into(), Value::Array(nozzle_rows));
        obj.insert("creditSales".into(), Value::Array(credit_rows));
        obj.insert("oilLubeSales".into(), Value::Array(oil_rows));
    }

    Ok(sheet)
}

/// Recent sheets, newest first. A non-positive limit yields an empty list.
pub fn list_daily_sheets(db: &DbState, limit: i64) -> Result<Value, String> {
    if limit <= 0 {
        return Ok(Value::Array(Vec::new()));
    }
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SHEET_COLUMNS} FROM daily_sheets ORDER BY date DESC, pump_id ASC LIMIT ?1"
        ))
        .map_err(|e| format!("prepare sheet list: {e}"))?;
    let rows: Vec<Value> = stmt
        .query_map(params![limit], sheet_row_to_json)
        .map_err(|e| format!("query sheets: {e}"))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(Value::Array(rows))
}

// ---------------------------------------------------------------------------
// Full reset
// ---------------------------------------------------------------------------

/// Delete every sheet and its line items (admin only). Users, tank
/// readings, and expenses are untouched.
pub fn reset_all_data(db: &DbState, principal: &Principal) -> Result<Value, String> {
    access::require(principal, Action::MasterReset)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute_batch(
        "
        BEGIN IMMEDIATE;
        DELETE FROM nozzle_sales;
        DELETE FROM credit_sales;
        DELETE FROM oil_lube_sales;
        DELETE FROM daily_sheets;
        COMMIT;
        ",
    )
    .map_err(|e| format!("reset data: {e}"))?;

    warn!(by = %principal.username, "All daily sheet data reset");

    Ok(serde_json::json!({
        "success": true,
        "message": "Database reset successfully"
    }))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::db;

    fn admin() -> Principal {
        Principal {
            id: 1,
            username: "sanjay".into(),
            role: Role::Admin,
        }
    }

    fn manager() -> Principal {
        Principal {
            id: 2,
            username: "ravi".into(),
            role: Role::Manager,
        }
    }

    fn sample_payload() -> Value {
        serde_json::json!({
            "date": "2026-03-05",
            "pumpId": 1,
            "salesPerson": "Ramesh",
            "petrolRate": 100.0,
            "dieselRate": 90.0,
            "nozzles": [
                { "nozzle": "A1", "product": "Petrol", "openReading": 1000, "closeReading": 1050, "testing": 2 },
                { "nozzle": "A2", "product": "Diesel", "openReading": "2000", "closeReading": "2100", "testing": "0" }
            ],
            "creditSales": [
                { "name": "Sharma Transport", "amount": 1000 },
                { "name": "", "amount": 50 },
                { "name": "Ghost Entry", "amount": 0 }
            ],
            "oilLubeSales": [
                { "name": "LUBE 20-40", "size": "1L", "price": 370, "quantity": 2 },
                { "name": "OIL", "size": "20ML", "price": 10, "quantity": 0 }
            ],
            "paymentMethods": { "paytm": 500, "card": 1000, "fleetCard": 500, "nightCash": 500 }
        })
    }

    #[test]
    fn nozzle_totals_worked_example() {
        let nozzles = vec![NozzleEntry {
            nozzle: "A1".into(),
            product: Product::Petrol,
            open_reading: 1000.0,
            close_reading: 1050.0,
            testing: 2.0,
        }];
        let totals = compute_nozzle_totals(&nozzles, 100.0, 90.0);
        assert_eq!(totals[0].liters_sold, 48.0);
        assert_eq!(totals[0].amount, 4800.0);
    }

    #[test]
    fn nozzle_liters_clamp_at_zero() {
        let nozzles = vec![NozzleEntry {
            nozzle: "B1".into(),
            product: Product::Diesel,
            open_reading: 5000.0,
            close_reading: 4990.0,
            testing: 5.0,
        }];
        let totals = compute_nozzle_totals(&nozzles, 100.0, 90.0);
        assert_eq!(totals[0].liters_sold, 0.0);
        assert_eq!(totals[0].amount, 0.0);
    }

    #[test]
    fn day_totals_worked_example() {
        // totalNozzleSales=10000, oilLube=500, credit=1000, digital=2000,
        // nightCash=500 -> totalToBank = 10500 - 3500 = 7000
        let nozzle_totals = vec![NozzleTotals {
            liters_sold: 100.0,
            amount: 10_000.0,
        }];
        let credits = vec![CreditEntry {
            name: "Sharma Transport".into(),
            amount: 1000.0,
            payment_method: None,
        }];
        let oil = vec![OilLubeLine {
            name: "LUBE".into(),
            size: "1L".into(),
            price: 250.0,
            quantity: 2.0,
        }];
        let payments = Payments {
            paytm: 800.0,
            card: 700.0,
            fleet_card: 500.0,
            night_cash: 500.0,
        };
        let totals = compute_day_totals(&nozzle_totals, &credits, &oil, &payments);
        assert_eq!(totals.total_oil_lube, 500.0);
        assert_eq!(totals.grand_total, 10_500.0);
        assert_eq!(totals.total_card_paytm, 2000.0);
        assert_eq!(totals.total_to_bank, 7000.0);
    }

    #[test]
    fn day_totals_ignore_invalid_credit_and_zero_quantity_lines() {
        let credits = vec![
            CreditEntry {
                name: "  ".into(),
                amount: 100.0,
                payment_method: None,
            },
            CreditEntry {
                name: "Real".into(),
                amount: 0.0,
                payment_method: None,
            },
        ];
        let oil = vec![OilLubeLine {
            name: "OIL".into(),
            size: "20ML".into(),
            price: 10.0,
            quantity: 0.0,
        }];
        let totals = compute_day_totals(&[], &credits, &oil, &Payments::default());
        assert_eq!(totals.total_credit_sales, 0.0);
        assert_eq!(totals.total_oil_lube, 0.0);
        assert_eq!(totals.total_to_bank, 0.0);
    }

    #[test]
    fn day_totals_surface_negative_cash_to_bank() {
        let payments = Payments {
            paytm: 5000.0,
            card: 0.0,
            fleet_card: 0.0,
            night_cash: 0.0,
        };
        let totals = compute_day_totals(&[], &[], &[], &payments);
        assert_eq!(totals.total_to_bank, -5000.0);
    }

    #[test]
    fn save_creates_then_updates() {
        let db = db::test_db_state();

        let first = save_daily_sheet(&db, &admin(), &sample_payload()).expect("first save");
        assert_eq!(
            first.get("message").and_then(|v| v.as_str()),
            Some("Daily sheet saved!")
        );

        let second = save_daily_sheet(&db, &admin(), &sample_payload()).expect("second save");
        assert_eq!(
            second.get("message").and_then(|v| v.as_str()),
            Some("Daily sheet updated!")
        );
        assert_eq!(
            first.get("sheetId").and_then(|v| v.as_i64()),
            second.get("sheetId").and_then(|v| v.as_i64()),
            "upsert must reuse the same sheet row"
        );

        // Replace-on-save: still exactly two nozzle rows
        let conn = db.conn.lock().unwrap();
        let nozzle_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nozzle_sales", [], |row| row.get(0))
            .unwrap();
        assert_eq!(nozzle_count, 2);
        let credit_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM credit_sales", [], |row| row.get(0))
            .unwrap();
        assert_eq!(credit_count, 1, "invalid credit entries must be dropped");
    }

    #[test]
    fn manager_can_create_but_not_overwrite() {
        let db = db::test_db_state();

        // Any role can record a fresh sheet
        let first = save_daily_sheet(&db, &manager(), &sample_payload()).expect("manager create");
        assert_eq!(
            first.get("message").and_then(|v| v.as_str()),
            Some("Daily sheet saved!")
        );

        // Overwriting an existing sheet is an edit: admin/owner only
        let err = save_daily_sheet(&db, &manager(), &sample_payload())
            .expect_err("manager re-save must be denied");
        assert!(err.contains("Permission denied"));
        assert!(err.contains("edit"));

        // Nothing changed underneath the denied save
        let conn = db.conn.lock().unwrap();
        let nozzle_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nozzle_sales", [], |row| row.get(0))
            .unwrap();
        drop(conn);
        assert_eq!(nozzle_count, 2);

        save_daily_sheet(&db, &admin(), &sample_payload()).expect("admin re-save allowed");
    }

    #[test]
    fn save_recomputes_totals_server_side() {
        let db = db::test_db_state();
        let mut payload = sample_payload();
        // Client-supplied totals are ignored even if present
        payload.as_object_mut().unwrap().insert(
            "totals".into(),
            serde_json::json!({ "totalNozzleSales": 999999 }),
        );
        let result = save_daily_sheet(&db, &admin(), &payload).expect("save");

        // Petrol: 48 L * 100 = 4800; Diesel: 100 L * 90 = 9000
        let totals = result.get("totals").expect("totals in response");
        assert_eq!(
            totals.get("totalNozzleSales").and_then(|v| v.as_f64()),
            Some(13_800.0)
        );
        assert_eq!(
            totals.get("totalOilLube").and_then(|v| v.as_f64()),
            Some(740.0)
        );
        // 13800 + 740 - (2000 + 1000 + 500) = 11040
        assert_eq!(
            totals.get("totalToBank").and_then(|v| v.as_f64()),
            Some(11_040.0)
        );
    }

    #[test]
    fn empty_credit_set_keeps_prior_rows() {
        let db = db::test_db_state();
        save_daily_sheet(&db, &admin(), &sample_payload()).expect("first save");

        let mut resave = sample_payload();
        resave
            .as_object_mut()
            .unwrap()
            .insert("creditSales".into(), serde_json::json!([]));
        resave
            .as_object_mut()
            .unwrap()
            .insert("oilLubeSales".into(), serde_json::json!([]));
        save_daily_sheet(&db, &admin(), &resave).expect("re-save without credits");

        let conn = db.conn.lock().unwrap();
        let credit_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM credit_sales", [], |row| row.get(0))
            .unwrap();
        assert_eq!(credit_count, 1, "prior credit rows must survive");
        let oil_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM oil_lube_sales", [], |row| row.get(0))
            .unwrap();
        assert_eq!(oil_count, 1, "prior oil/lube rows must survive");
    }

    #[test]
    fn approval_is_one_way() {
        let db = db::test_db_state();
        let saved = save_daily_sheet(&db, &admin(), &sample_payload()).expect("save");
        let sheet_id = saved.get("sheetId").and_then(|v| v.as_i64()).unwrap();

        approve_daily_sheet(&db, &admin(), sheet_id).expect("first approve");

        let err = approve_daily_sheet(&db, &admin(), sheet_id)
            .expect_err("second approve must conflict");
        assert_eq!(err, "Daily sheet is already approved");

        // Approver stamp survives the failed second attempt
        let details = daily_sheet_details(&db, sheet_id).expect("details");
        assert_eq!(
            details.get("approvedBy").and_then(|v| v.as_str()),
            Some("sanjay")
        );
        assert!(details
            .get("approvedAt")
            .and_then(|v| v.as_str())
            .is_some());
    }

    #[test]
    fn approval_requires_capability_and_existing_sheet() {
        let db = db::test_db_state();
        let saved = save_daily_sheet(&db, &admin(), &sample_payload()).expect("save");
        let sheet_id = saved.get("sheetId").and_then(|v| v.as_i64()).unwrap();

        let err = approve_daily_sheet(&db, &manager(), sheet_id)
            .expect_err("manager cannot approve");
        assert!(err.contains("Permission denied"));

        let err = approve_daily_sheet(&db, &admin(), 9999).expect_err("missing sheet");
        assert_eq!(err, "Daily sheet not found");
    }

    #[test]
    fn sheet_by_date_round_trip() {
        let db = db::test_db_state();
        assert_eq!(
            daily_sheet_by_date(&db, "2026-03-05", 1).expect("query"),
            Value::Null
        );

        save_daily_sheet(&db, &admin(), &sample_payload()).expect("save");
        let sheet = daily_sheet_by_date(&db, "2026-03-05", 1).expect("query");
        assert_eq!(sheet.get("pumpId").and_then(|v| v.as_i64()), Some(1));
        assert_eq!(
            sheet
                .get("nozzleSales")
                .and_then(|v| v.as_array())
                .map(|a| a.len()),
            Some(2)
        );
        // Other pump on the same day is a separate sheet
        assert_eq!(
            daily_sheet_by_date(&db, "2026-03-05", 2).expect("query"),
            Value::Null
        );
    }

    #[test]
    fn list_honors_limit_including_zero() {
        let db = db::test_db_state();
        save_daily_sheet(&db, &admin(), &sample_payload()).expect("save");

        let all = list_daily_sheets(&db, 30).expect("list");
        assert_eq!(all.as_array().map(|a| a.len()), Some(1));

        let none = list_daily_sheets(&db, 0).expect("list with zero limit");
        assert_eq!(none.as_array().map(|a| a.len()), Some(0));
        let none = list_daily_sheets(&db, -5).expect("list with negative limit");
        assert_eq!(none.as_array().map(|a| a.len()), Some(0));
    }

    #[test]
    fn reset_requires_admin_and_clears_sheets() {
        let db = db::test_db_state();
        save_daily_sheet(&db, &admin(), &sample_payload()).expect("save");

        let err = reset_all_data(&db, &manager()).expect_err("manager cannot reset");
        assert!(err.contains("Permission denied"));

        reset_all_data(&db, &admin()).expect("admin reset");
        let conn = db.conn.lock().unwrap();
        for table in ["daily_sheets", "nozzle_sales", "credit_sales", "oil_lube_sales"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "{table} should be empty after reset");
        }
    }

    #[test]
    fn save_rejects_bad_dates() {
        let db = db::test_db_state();
        let mut payload = sample_payload();
        payload
            .as_object_mut()
            .unwrap()
            .insert("date".into(), serde_json::json!("05-03-2026"));
        let err = save_daily_sheet(&db, &admin(), &payload).expect_err("bad date");
        assert!(err.contains("Invalid date"));
    }
}
