//! Monthly aggregation and dashboard queries.
//!
//! Pure projections over stored rows: nothing here mutates data. An empty
//! month yields zero totals and empty collections, not an error.

use chrono::{Datelike, Local, NaiveDate};
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::debug;

use crate::db::DbState;

/// Inclusive start / exclusive end of a calendar month, as `YYYY-MM-DD`.
fn month_range(month: u32, year: i32) -> Result<(String, String), String> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| format!("Invalid month/year: {month}/{year}"))?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| format!("Invalid month/year: {month}/{year}"))?;
    Ok((
        start.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    ))
}

fn fuel_amount(conn: &Connection, product: &str, start: &str, end: &str) -> Result<f64, String> {
    conn.query_row(
        "SELECT COALESCE(SUM(total_amount), 0)
         FROM nozzle_sales WHERE product = ?1 AND date >= ?2 AND date < ?3",
        params![product, start, end],
        |row| row.get(0),
    )
    .map_err(|e| format!("fuel amount query: {e}"))
}

fn fuel_liters(conn: &Connection, product: &str, start: &str, end: &str) -> Result<f64, String> {
    conn.query_row(
        "SELECT COALESCE(SUM(total_sale), 0)
         FROM nozzle_sales WHERE product = ?1 AND date >= ?2 AND date < ?3",
        params![product, start, end],
        |row| row.get(0),
    )
    .map_err(|e| format!("fuel liters query: {e}"))
}

/// Full monthly report: fuel amounts, oil/lube lines grouped by product,
/// credit totals grouped by customer, and the grand total.
pub fn monthly_report(db: &DbState, month: u32, year: i32) -> Result<Value, String> {
    let (start, end) = month_range(month, year)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let petrol_amount = fuel_amount(&conn, "Petrol", &start, &end)?;
    let diesel_amount = fuel_amount(&conn, "Diesel", &start, &end)?;

    // Unit price reported is the most recent one seen in the month
    let mut oil_stmt = conn
        .prepare(
            "SELECT product_name, SUM(quantity), SUM(total),
                    (SELECT price FROM oil_lube_sales o2
                     WHERE o2.product_name = o1.product_name
                       AND o2.date >= ?1 AND o2.date < ?2
                     ORDER BY o2.date DESC, o2.id DESC LIMIT 1)
             FROM oil_lube_sales o1
             WHERE date >= ?1 AND date < ?2
             GROUP BY product_name
             ORDER BY product_name",
        )
        .map_err(|e| format!("prepare oil/lube report: {e}"))?;
    let oil_rows: Vec<Value> = oil_stmt
        .query_map(params![start, end], |row| {
            Ok(serde_json::json!({
                "productName": row.get::<_, String>(0)?,
                "quantity": row.get::<_, f64>(1)?,
                "total": row.get::<_, f64>(2)?,
                "price": row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
            }))
        })
        .map_err(|e| format!("query oil/lube report: {e}"))?
        .filter_map(|r| r.ok())
        .collect();
    let oil_total: f64 = oil_rows
        .iter()
        .filter_map(|r| r.get("total").and_then(|v| v.as_f64()))
        .sum();

    let mut credit_stmt = conn
        .prepare(
            "SELECT customer_name, SUM(amount), COUNT(*)
             FROM credit_sales
             WHERE date >= ?1 AND date < ?2
             GROUP BY customer_name
             ORDER BY SUM(amount) DESC",
        )
        .map_err(|e| format!("prepare credit report: {e}"))?;
    let credit_rows: Vec<Value> = credit_stmt
        .query_map(params![start, end], |row| {
            Ok(serde_json::json!({
                "customerName": row.get::<_, String>(0)?,
                "amount": row.get::<_, f64>(1)?,
                "entries": row.get::<_, i64>(2)?,
            }))
        })
        .map_err(|e| format!("query credit report: {e}"))?
        .filter_map(|r| r.ok())
        .collect();
    let credit_total: f64 = credit_rows
        .iter()
        .filter_map(|r| r.get("amount").and_then(|v| v.as_f64()))
        .sum();

    let grand_total = petrol_amount + diesel_amount + oil_total;

    debug!(month, year, grand_total, "Monthly report computed");

    Ok(serde_json::json!({
        "success": true,
        "month": month,
        "year": year,
        "petrolAmount": petrol_amount,
        "dieselAmount": diesel_amount,
        "oilLube": oil_rows,
        "oilLubeTotal": oil_total,
        "credits": credit_rows,
        "creditTotal": credit_total,
        "grandTotal": grand_total,
    }))
}

/// Liters of petrol and diesel sold in a month.
pub fn monthly_sales_summary(db: &DbState, month: u32, year: i32) -> Result<Value, String> {
    let (start, end) = month_range(month, year)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let petrol_liters = fuel_liters(&conn, "Petrol", &start, &end)?;
    let diesel_liters = fuel_liters(&conn, "Diesel", &start, &end)?;

    Ok(serde_json::json!({
        "success": true,
        "month": month,
        "year": year,
        "petrolLiters": petrol_liters,
        "dieselLiters": diesel_liters,
        "totalLiters": petrol_liters + diesel_liters,
    }))
}

/// Today's sales plus current-month revenue and liters, for the landing page.
pub fn dashboard_summary(db: &DbState) -> Result<Value, String> {
    let now = Local::now().date_naive();
    dashboard_summary_for(db, now)
}

fn dashboard_summary_for(db: &DbState, today: NaiveDate) -> Result<Value, String> {
    let (start, end) = month_range(today.month(), today.year())?;
    let today_str = today.format("%Y-%m-%d").to_string();
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let today_sales: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(total_amount), 0) FROM nozzle_sales WHERE date = ?1",
            params![today_str],
            |row| row.get(0),
        )
        .map_err(|e| format!("today sales query: {e}"))?;

    let month_revenue: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(total_nozzle_sales + total_oil_lube), 0)
             FROM daily_sheets WHERE date >= ?1 AND date < ?2",
            params![start, end],
            |row| row.get(0),
        )
        .map_err(|e| format!("month revenue query: {e}"))?;

    let petrol_liters = fuel_liters(&conn, "Petrol", &start, &end)?;
    let diesel_liters = fuel_liters(&conn, "Diesel", &start, &end)?;

    Ok(serde_json::json!({
        "success": true,
        "date": today_str,
        "todaySales": today_sales,
        "monthRevenue": month_revenue,
        "petrolLiters": petrol_liters,
        "dieselLiters": diesel_liters,
    }))
}

/// Distinct credit customer names, for form autocomplete.
pub fn distinct_credit_customers(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare("SELECT DISTINCT customer_name FROM credit_sales ORDER BY customer_name")
        .map_err(|e| format!("prepare customer list: {e}"))?;
    let names: Vec<Value> = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| format!("query customers: {e}"))?
        .filter_map(|r| r.ok())
        .map(Value::String)
        .collect();
    Ok(Value::Array(names))
}

// ===========================================================================
// Tests
// ===========================================================================
