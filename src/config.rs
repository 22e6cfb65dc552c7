//! Tank configuration.
//!
//! Tank capacities are fixed per installation. Defaults are compiled in
//! and can be overridden through the `app_settings` table (category
//! "tanks", keys "petrol_capacity_liters" / "diesel_capacity_liters").

use rusqlite::Connection;

use crate::access::{self, Action, Principal};
use crate::db;
use crate::sheets::Product;

/// Default petrol tank capacity in liters.
pub const PETROL_CAPACITY_LITERS: f64 = 15_000.0;
/// Default diesel tank capacity in liters.
pub const DIESEL_CAPACITY_LITERS: f64 = 20_000.0;

fn capacity_key(tank: Product) -> &'static str {
    match tank {
        Product::Petrol => "petrol_capacity_liters",
        Product::Diesel => "diesel_capacity_liters",
    }
}

/// Capacity for a tank, honoring a settings override when one is present
/// and parses to a positive number.
pub fn tank_capacity(conn: &Connection, tank: Product) -> f64 {
    let default = match tank {
        Product::Petrol => PETROL_CAPACITY_LITERS,
        Product::Diesel => DIESEL_CAPACITY_LITERS,
    };
    db::get_setting(conn, "tanks", capacity_key(tank))
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| *v > 0.0)
        .unwrap_or(default)
}

/// Persist a capacity override (settings access: admin/owner).
pub fn set_tank_capacity(
    conn: &Connection,
    principal: &Principal,
    tank: Product,
    liters: f64,
) -> Result<(), String> {
    access::require(principal, Action::AccessSettings)?;
    if liters <= 0.0 {
        return Err("Tank capacity must be positive".into());
    }
    db::set_setting(conn, "tanks", capacity_key(tank), &liters.to_string())
}
