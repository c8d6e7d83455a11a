use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use repack_core::types::ReminderInterval;
use rusqlite::{types::Type, Connection};
use tracing::info;

use crate::error::Result;
use crate::migrate::upgrade_legacy_schema;
use crate::types::{Device, DeviceWithOwner, Owner};

/// Bumped whenever the target schema changes. Stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 2;

/// Initialise the device store schema. Safe to call on every startup.
///
/// Databases written by the earlier single-reminder schema are upgraded once;
/// after that `user_version` short-circuits the migration check.
pub fn init_db(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    // Rebuilding `users` drops the old table; with foreign keys on, that
    // would cascade into `devices`. The pragma is a no-op inside a
    // transaction, so it is switched off around it.
    let foreign_keys: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    if foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys=OFF;")?;
    }
    let result = create_schema(conn);
    if foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    }
    result?;

    info!(from = version, to = SCHEMA_VERSION, "device store schema ready");
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    upgrade_legacy_schema(&tx)?;
    create_users_table(&tx, "users")?;
    create_devices_table(&tx)?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

pub(crate) fn create_users_table(conn: &Connection, name: &str) -> rusqlite::Result<()> {
    // password is owned by the auth layer and may be absent for owners
    // created through this crate.
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            email       TEXT    NOT NULL UNIQUE,
            password    TEXT,
            first_name  TEXT    NOT NULL,
            last_name   TEXT    NOT NULL,
            is_admin    INTEGER NOT NULL DEFAULT 0,
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL
        );"
    ))
}

fn create_devices_table(conn: &Connection) -> rusqlite::Result<()> {
    // Reminder state lives in the device row so deleting a device can never
    // leave orphaned state behind.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS devices (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id              INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            device_name          TEXT    NOT NULL,
            serial_number        TEXT,
            notes                TEXT,
            last_packed          TEXT    NOT NULL,   -- RFC 3339
            reminder_interval    INTEGER NOT NULL DEFAULT 12
                                 CHECK (reminder_interval IN (6, 9, 12)),
            reminder_enabled     INTEGER NOT NULL DEFAULT 1,
            created_at           TEXT    NOT NULL,
            first_reminder_sent  TEXT,               -- RFC 3339 or NULL
            second_reminder_sent TEXT                -- RFC 3339 or NULL
        );
        CREATE INDEX IF NOT EXISTS idx_devices_user ON devices (user_id);",
    )
}

// ── row mapping ──────────────────────────────────────────────────────────────

pub(crate) const DEVICE_COLUMNS: &str = "d.id, d.user_id, d.device_name, d.serial_number, d.notes,
     d.last_packed, d.reminder_interval, d.reminder_enabled, d.first_reminder_sent,
     d.second_reminder_sent, d.created_at";

pub(crate) const OWNER_COLUMNS: &str =
    "u.id, u.email, u.first_name, u.last_name, u.is_admin, u.is_active, u.created_at";

/// Number of columns in [`DEVICE_COLUMNS`]; owner columns follow at this offset in joins.
const DEVICE_COLUMN_COUNT: usize = 11;

/// Map a row selected with [`DEVICE_COLUMNS`] (starting at column 0) to a Device.
pub(crate) fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    let months: u32 = row.get(6)?;
    let interval = ReminderInterval::try_from(months)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Integer, Box::new(e)))?;
    Ok(Device {
        id: row.get::<_, i64>(0)?.into(),
        owner_id: row.get::<_, i64>(1)?.into(),
        name: row.get(2)?,
        serial_number: row.get(3)?,
        notes: row.get(4)?,
        last_serviced: get_timestamp(row, 5)?,
        interval,
        reminders_enabled: row.get::<_, i64>(7)? != 0,
        stage1_sent_at: get_opt_timestamp(row, 8)?,
        stage2_sent_at: get_opt_timestamp(row, 9)?,
        created_at: get_timestamp(row, 10)?,
    })
}

/// Map a row selected with [`OWNER_COLUMNS`] starting at `offset`.
pub(crate) fn row_to_owner_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Owner> {
    Ok(Owner {
        id: row.get::<_, i64>(offset)?.into(),
        email: row.get(offset + 1)?,
        first_name: row.get(offset + 2)?,
        last_name: row.get(offset + 3)?,
        is_admin: row.get::<_, i64>(offset + 4)? != 0,
        is_active: row.get::<_, i64>(offset + 5)? != 0,
        created_at: get_timestamp(row, offset + 6)?,
    })
}

/// Map a `SELECT DEVICE_COLUMNS, OWNER_COLUMNS` join row.
pub(crate) fn row_to_device_with_owner(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceWithOwner> {
    Ok(DeviceWithOwner {
        device: row_to_device(row)?,
        owner: row_to_owner_at(row, DEVICE_COLUMN_COUNT)?,
    })
}

// ── timestamps ───────────────────────────────────────────────────────────────

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 (written by this crate), SQLite's `CURRENT_TIMESTAMP`
/// format and bare dates (midnight UTC), which older rows contain.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn get_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| bad_timestamp(idx, raw))
}

fn get_opt_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| bad_timestamp(idx, raw)),
    }
}

fn bad_timestamp(idx: usize, raw: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unparseable timestamp: {raw}").into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_all_stored_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-15T00:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15T00:00:00.000Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15"), Some(expected));
        assert_eq!(parse_timestamp("15.01.2024"), None);
    }

    #[test]
    fn rfc3339_offsets_are_normalised_to_utc() {
        let parsed = parse_timestamp("2024-01-15T01:00:00+01:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn init_db_is_idempotent_and_sets_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn interval_check_constraint_rejects_odd_plans() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (email, first_name, last_name, created_at)
             VALUES ('a@example.org', 'A', 'B', '2024-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        let res = conn.execute(
            "INSERT INTO devices (user_id, device_name, last_packed, reminder_interval, created_at)
             VALUES (1, 'Reserve', '2024-01-01T00:00:00+00:00', 7, '2024-01-01T00:00:00+00:00')",
            [],
        );
        assert!(res.is_err());
    }
}
