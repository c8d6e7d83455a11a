//! One-time upgrade of databases created by the earlier single-reminder schema.
//!
//! That schema named the owner columns `vorname`/`name`, the device name
//! column `name`, and tracked a single `last_reminder` timestamp. The upgrade
//! renames those columns in place and adds whatever two-stage columns are
//! missing. `init_db` only calls this while `user_version` is below
//! [`SCHEMA_VERSION`](crate::db::SCHEMA_VERSION), so it never runs on a hot path.

use rusqlite::Connection;
use tracing::info;

use crate::db::create_users_table;
use crate::error::Result;

pub(crate) fn upgrade_legacy_schema(conn: &Connection) -> Result<()> {
    let user_cols = table_columns(conn, "users")?;
    if !user_cols.is_empty() {
        let has = |c: &str| user_cols.iter().any(|col| col == c);
        if has("vorname") && !has("first_name") {
            conn.execute_batch(
                "ALTER TABLE users RENAME COLUMN vorname TO first_name;
                 ALTER TABLE users RENAME COLUMN name TO last_name;",
            )?;
            info!("migrated users: vorname/name -> first_name/last_name");
        }
        if !has("is_active") {
            conn.execute_batch("ALTER TABLE users ADD COLUMN is_active INTEGER NOT NULL DEFAULT 1;")?;
            info!("migrated users: added is_active");
        }
        if !has("is_admin") {
            conn.execute_batch("ALTER TABLE users ADD COLUMN is_admin INTEGER NOT NULL DEFAULT 0;")?;
        }
        if column_not_null(conn, "users", "password")? {
            relax_users_password(conn)?;
            info!("migrated users: password is now optional");
        }
    }

    let device_cols = table_columns(conn, "devices")?;
    if !device_cols.is_empty() {
        let has = |c: &str| device_cols.iter().any(|col| col == c);
        if has("name") && !has("device_name") {
            conn.execute_batch("ALTER TABLE devices RENAME COLUMN name TO device_name;")?;
            info!("migrated devices: name -> device_name");
        }
        // The single legacy reminder is the first stage of the two-stage model.
        if has("last_reminder") && !has("first_reminder_sent") {
            conn.execute_batch(
                "ALTER TABLE devices RENAME COLUMN last_reminder TO first_reminder_sent;",
            )?;
            info!("migrated devices: last_reminder -> first_reminder_sent");
        }

        let device_cols = table_columns(conn, "devices")?;
        let missing = [
            ("serial_number", "TEXT"),
            ("notes", "TEXT"),
            ("reminder_enabled", "INTEGER NOT NULL DEFAULT 1"),
            ("first_reminder_sent", "TEXT"),
            ("second_reminder_sent", "TEXT"),
        ];
        for (column, decl) in missing {
            if !device_cols.iter().any(|c| c == column) {
                conn.execute_batch(&format!("ALTER TABLE devices ADD COLUMN {column} {decl};"))?;
                info!(column, "migrated devices: added column");
            }
        }
    }
    Ok(())
}

/// SQLite cannot drop a NOT NULL constraint in place: copy the rows into a
/// table with the current layout and swap it in. Callers must have foreign
/// keys switched off, or dropping `users` cascades into `devices`.
fn relax_users_password(conn: &Connection) -> Result<()> {
    create_users_table(conn, "users_new")?;
    conn.execute_batch(
        "INSERT INTO users_new (id, email, password, first_name, last_name, is_admin, is_active, created_at)
         SELECT id, email, password, first_name, last_name,
                COALESCE(is_admin, 0), COALESCE(is_active, 1),
                COALESCE(created_at, CURRENT_TIMESTAMP)
         FROM users;
         DROP TABLE users;
         ALTER TABLE users_new RENAME TO users;",
    )?;
    Ok(())
}

fn column_not_null(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let not_null = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(3)? != 0)))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .any(|(name, not_null)| name == column && not_null);
    Ok(not_null)
}

/// Column names of `table`, empty when the table does not exist.
fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::error::DeviceError;
    use crate::store::DeviceStore;
    use crate::types::{NewOwner, ReminderState};
    use repack_core::types::{DeviceId, ReminderInterval};

    fn legacy_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                vorname TEXT NOT NULL,
                name TEXT NOT NULL,
                is_admin BOOLEAN DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                last_packed DATETIME NOT NULL,
                reminder_interval INTEGER NOT NULL DEFAULT 12,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                last_reminder DATETIME,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            INSERT INTO users (email, password, vorname, name)
                VALUES ('pilot@example.org', 'x', 'Hanna', 'Meier');
            INSERT INTO devices (user_id, name, last_packed, reminder_interval, last_reminder)
                VALUES (1, 'Reserve', '2024-01-15', 6, '2024-07-15T09:00:00.000Z');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn legacy_rows_survive_the_upgrade() {
        let conn = legacy_db();
        init_db(&conn).unwrap();

        let store = DeviceStore::new(conn).unwrap();
        let device = store.get_device(DeviceId(1)).unwrap().expect("device kept");
        assert_eq!(device.name, "Reserve");
        assert_eq!(device.interval, ReminderInterval::SixMonths);
        assert!(device.reminders_enabled);
        // The old single reminder counts as stage 1 of the current cycle.
        assert_eq!(device.reminder_state(), ReminderState::Stage1Notified);

        let owner = store.get_owner(device.owner_id).unwrap().unwrap();
        assert_eq!(owner.display_name(), "Hanna Meier");
        assert!(owner.is_active);
    }

    #[test]
    fn migrated_database_accepts_new_owners() {
        let store = DeviceStore::new(legacy_db()).unwrap();
        let fresh = store
            .create_owner(&NewOwner {
                email: "fresh@example.org".into(),
                first_name: "Fritz".into(),
                last_name: "Frisch".into(),
                is_admin: false,
            })
            .unwrap();
        assert!(store.get_owner(fresh.id).unwrap().is_some());

        // Rebuilding users must not cascade into the legacy devices.
        assert!(store.get_device(DeviceId(1)).unwrap().is_some());

        let dup = store.create_owner(&NewOwner {
            email: "pilot@example.org".into(),
            first_name: "X".into(),
            last_name: "Y".into(),
            is_admin: false,
        });
        assert!(matches!(dup, Err(DeviceError::OwnerExists(_))));
    }

    #[test]
    fn legacy_row_with_unknown_interval_is_counted() {
        let conn = legacy_db();
        conn.execute(
            "INSERT INTO devices (user_id, name, last_packed, reminder_interval)
             VALUES (1, 'Tandem reserve', '2023-05-01', 24)",
            [],
        )
        .unwrap();
        let store = DeviceStore::new(conn).unwrap();

        let listing = store.list_eligible_devices().unwrap();
        assert_eq!(listing.devices.len(), 1);
        assert_eq!(listing.unreadable, 1);
    }

    #[test]
    fn current_schema_is_left_alone() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let before = table_columns(&conn, "devices").unwrap();
        upgrade_legacy_schema(&conn).unwrap();
        assert_eq!(table_columns(&conn, "devices").unwrap(), before);
    }
}
