use std::sync::Mutex;

use chrono::{DateTime, Utc};
use repack_core::types::{DeviceId, OwnerId, ReminderStage};
use rusqlite::{ffi, params, Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::db::{
    format_timestamp, init_db, row_to_device, row_to_device_with_owner, row_to_owner_at,
    DEVICE_COLUMNS, OWNER_COLUMNS,
};
use crate::error::{DeviceError, Result};
use crate::types::{
    Device, DeviceListing, DeviceUpdate, DeviceWithOwner, NewDevice, NewOwner, Owner,
    OwnerSummary, RecordOutcome, UpdateOutcome,
};

/// Thread-safe store for owners, devices and their reminder state.
///
/// Wraps a single SQLite connection in a `Mutex`. Every write touches one
/// row, so the mutex is the only synchronisation the scheduler needs.
pub struct DeviceStore {
    db: Mutex<Connection>,
}

impl DeviceStore {
    /// Take ownership of `conn`, enable foreign keys and initialise the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    // ── owners ──────────────────────────────────────────────────────────────

    #[instrument(skip(self, new), fields(email = %new.email))]
    pub fn create_owner(&self, new: &NewOwner) -> Result<Owner> {
        if new.email.trim().is_empty() {
            return Err(DeviceError::Invalid("owner email is required".to_string()));
        }
        let now = Utc::now();
        let db = self.db.lock().unwrap();
        let res = db.execute(
            "INSERT INTO users (email, first_name, last_name, is_admin, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![
                new.email,
                new.first_name,
                new.last_name,
                new.is_admin as i32,
                format_timestamp(now),
            ],
        );
        if let Err(e) = res {
            return Err(unique_email_error(e, &new.email));
        }
        let id = OwnerId(db.last_insert_rowid());
        info!(owner_id = %id, "owner created");
        Ok(Owner {
            id,
            email: new.email.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            is_admin: new.is_admin,
            is_active: true,
            created_at: now,
        })
    }

    pub fn get_owner(&self, id: OwnerId) -> Result<Option<Owner>> {
        let db = self.db.lock().unwrap();
        let owner = db
            .query_row(
                &format!("SELECT {OWNER_COLUMNS} FROM users u WHERE u.id = ?1"),
                params![id.get()],
                |row| row_to_owner_at(row, 0),
            )
            .optional()?;
        Ok(owner)
    }

    /// Every owner with their device count, newest first.
    pub fn list_owners(&self) -> Result<Vec<OwnerSummary>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {OWNER_COLUMNS}, COUNT(d.id)
             FROM users u LEFT JOIN devices d ON d.user_id = u.id
             GROUP BY u.id
             ORDER BY u.created_at DESC, u.id DESC"
        ))?;
        let owners = stmt
            .query_map([], |row| {
                Ok(OwnerSummary {
                    owner: row_to_owner_at(row, 0)?,
                    device_count: row.get::<_, i64>(7)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(owners)
    }

    /// Change the address reminders are delivered to.
    #[instrument(skip(self))]
    pub fn update_owner_email(&self, id: OwnerId, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(DeviceError::Invalid("owner email is required".to_string()));
        }
        let db = self.db.lock().unwrap();
        let n = db
            .execute(
                "UPDATE users SET email = ?2 WHERE id = ?1",
                params![id.get(), email],
            )
            .map_err(|e| unique_email_error(e, email))?;
        if n == 0 {
            return Err(DeviceError::OwnerNotFound(id));
        }
        info!(owner_id = %id, "owner email updated");
        Ok(())
    }

    /// Deactivated owners keep their devices but receive no reminders.
    #[instrument(skip(self))]
    pub fn set_owner_active(&self, id: OwnerId, active: bool) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE users SET is_active = ?2 WHERE id = ?1",
            params![id.get(), active as i32],
        )?;
        if n == 0 {
            return Err(DeviceError::OwnerNotFound(id));
        }
        info!(owner_id = %id, active, "owner activation changed");
        Ok(())
    }

    /// Delete an owner; their devices go with them (`ON DELETE CASCADE`).
    #[instrument(skip(self))]
    pub fn delete_owner(&self, id: OwnerId) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM users WHERE id = ?1", params![id.get()])?;
        if n == 0 {
            return Err(DeviceError::OwnerNotFound(id));
        }
        info!(owner_id = %id, "owner deleted");
        Ok(())
    }

    // ── devices ─────────────────────────────────────────────────────────────

    /// Register a device. A new device starts a fresh cycle with no reminders sent.
    #[instrument(skip(self, new), fields(owner_id = %new.owner_id))]
    pub fn create_device(&self, new: &NewDevice) -> Result<Device> {
        validate_name(&new.name)?;
        let now = Utc::now();
        let last_serviced = new.last_serviced.unwrap_or(now);

        let db = self.db.lock().unwrap();
        let owner_exists: bool = db.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            params![new.owner_id.get()],
            |row| row.get(0),
        )?;
        if !owner_exists {
            return Err(DeviceError::OwnerNotFound(new.owner_id));
        }

        db.execute(
            "INSERT INTO devices
             (user_id, device_name, serial_number, notes, last_packed,
              reminder_interval, reminder_enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.owner_id.get(),
                new.name,
                new.serial_number,
                new.notes,
                format_timestamp(last_serviced),
                new.interval.months(),
                new.reminders_enabled as i32,
                format_timestamp(now),
            ],
        )?;
        let id = DeviceId(db.last_insert_rowid());
        info!(device_id = %id, interval = %new.interval, "device created");

        Ok(Device {
            id,
            owner_id: new.owner_id,
            name: new.name.clone(),
            serial_number: new.serial_number.clone(),
            notes: new.notes.clone(),
            last_serviced,
            interval: new.interval,
            reminders_enabled: new.reminders_enabled,
            stage1_sent_at: None,
            stage2_sent_at: None,
            created_at: now,
        })
    }

    pub fn get_device(&self, id: DeviceId) -> Result<Option<Device>> {
        let db = self.db.lock().unwrap();
        let device = db
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices d WHERE d.id = ?1"),
                params![id.get()],
                row_to_device,
            )
            .optional()?;
        Ok(device)
    }

    /// Devices of one owner, most recently packed first.
    pub fn list_devices_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Device>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices d
             WHERE d.user_id = ?1 ORDER BY d.last_packed DESC"
        ))?;
        let rows = stmt
            .query_map(params![owner_id.get()], row_to_device)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every device with its owner, regardless of eligibility (admin overview).
    pub fn list_all_devices(&self) -> Result<DeviceListing> {
        self.query_joined("ORDER BY d.id")
    }

    /// Devices whose owner is active and whose reminders are switched on.
    #[instrument(skip(self))]
    pub fn list_eligible_devices(&self) -> Result<DeviceListing> {
        let listing =
            self.query_joined("WHERE u.is_active = 1 AND d.reminder_enabled = 1 ORDER BY d.id")?;
        debug!(
            count = listing.devices.len(),
            unreadable = listing.unreadable,
            "eligible devices loaded"
        );
        Ok(listing)
    }

    /// Replace the editable fields of a device.
    ///
    /// A changed packing date starts a new cycle: both sent-flags are cleared
    /// in the same statement. Changing only the interval keeps the flags.
    #[instrument(skip(self, update))]
    pub fn update_device(&self, id: DeviceId, update: &DeviceUpdate) -> Result<UpdateOutcome> {
        validate_name(&update.name)?;
        let db = self.db.lock().unwrap();
        let current = db
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices d WHERE d.id = ?1"),
                params![id.get()],
                row_to_device,
            )
            .optional()?
            .ok_or(DeviceError::DeviceNotFound(id))?;

        let reminders_reset = current.last_serviced != update.last_serviced;
        let sql = if reminders_reset {
            "UPDATE devices SET device_name=?2, serial_number=?3, notes=?4, last_packed=?5,
                    reminder_interval=?6, reminder_enabled=?7,
                    first_reminder_sent=NULL, second_reminder_sent=NULL
             WHERE id=?1"
        } else {
            "UPDATE devices SET device_name=?2, serial_number=?3, notes=?4, last_packed=?5,
                    reminder_interval=?6, reminder_enabled=?7
             WHERE id=?1"
        };
        db.execute(
            sql,
            params![
                id.get(),
                update.name,
                update.serial_number,
                update.notes,
                format_timestamp(update.last_serviced),
                update.interval.months(),
                update.reminders_enabled as i32,
            ],
        )?;

        if reminders_reset {
            info!(device_id = %id, "packing date changed, reminder cycle reset");
        } else if current.interval != update.interval {
            debug!(device_id = %id, from = %current.interval, to = %update.interval,
                "interval changed mid-cycle, sent-flags kept");
        }
        Ok(UpdateOutcome { reminders_reset })
    }

    /// Record a new packing event without touching the other fields.
    pub fn mark_serviced(&self, id: DeviceId, when: DateTime<Utc>) -> Result<UpdateOutcome> {
        let device = self.get_device(id)?.ok_or(DeviceError::DeviceNotFound(id))?;
        self.update_device(
            id,
            &DeviceUpdate {
                name: device.name,
                serial_number: device.serial_number,
                notes: device.notes,
                last_serviced: when,
                interval: device.interval,
                reminders_enabled: device.reminders_enabled,
            },
        )
    }

    #[instrument(skip(self))]
    pub fn delete_device(&self, id: DeviceId) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM devices WHERE id = ?1", params![id.get()])?;
        if n == 0 {
            return Err(DeviceError::DeviceNotFound(id));
        }
        info!(device_id = %id, "device deleted");
        Ok(())
    }

    // ── reminder state ──────────────────────────────────────────────────────

    /// Persist that `stage` was delivered for the device's current cycle.
    ///
    /// Idempotent: an already-set flag is left untouched and reported as
    /// [`RecordOutcome::AlreadyRecorded`]. Fails with `DeviceNotFound` if the
    /// device was deleted and with `StageOrder` for stage 2 without stage 1.
    #[instrument(skip(self))]
    pub fn record_sent(
        &self,
        id: DeviceId,
        stage: ReminderStage,
        when: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        let db = self.db.lock().unwrap();
        let sql = match stage {
            ReminderStage::Stage1 => {
                "UPDATE devices SET first_reminder_sent = ?2
                 WHERE id = ?1 AND first_reminder_sent IS NULL"
            }
            ReminderStage::Stage2 => {
                "UPDATE devices SET second_reminder_sent = ?2
                 WHERE id = ?1 AND second_reminder_sent IS NULL
                   AND first_reminder_sent IS NOT NULL"
            }
        };
        if db.execute(sql, params![id.get(), format_timestamp(when)])? == 1 {
            return Ok(RecordOutcome::Recorded);
        }

        // Nothing updated: work out why.
        let flags: Option<(Option<String>, Option<String>)> = db
            .query_row(
                "SELECT first_reminder_sent, second_reminder_sent FROM devices WHERE id = ?1",
                params![id.get()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match (stage, flags) {
            (_, None) => Err(DeviceError::DeviceNotFound(id)),
            (ReminderStage::Stage2, Some((None, _))) => Err(DeviceError::StageOrder(id)),
            (_, Some(_)) => {
                warn!(device_id = %id, %stage, "reminder already recorded, leaving as is");
                Ok(RecordOutcome::AlreadyRecorded)
            }
        }
    }

    pub fn record_stage1_sent(&self, id: DeviceId, when: DateTime<Utc>) -> Result<RecordOutcome> {
        self.record_sent(id, ReminderStage::Stage1, when)
    }

    pub fn record_stage2_sent(&self, id: DeviceId, when: DateTime<Utc>) -> Result<RecordOutcome> {
        self.record_sent(id, ReminderStage::Stage2, when)
    }

    // ── private helpers ─────────────────────────────────────────────────────

    fn query_joined(&self, tail: &str) -> Result<DeviceListing> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {DEVICE_COLUMNS}, {OWNER_COLUMNS}
             FROM devices d JOIN users u ON d.user_id = u.id
             {tail}"
        ))?;
        // A single corrupt row must not hide every other device.
        let mut listing = DeviceListing::default();
        for row in stmt.query_map([], row_to_device_with_owner)? {
            match row {
                Ok(d) => listing.devices.push(d),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable device row");
                    listing.unreadable += 1;
                }
            }
        }
        Ok(listing)
    }
}

/// Map a failed insert/update of `users.email`: only a UNIQUE violation means
/// the address is taken.
fn unique_email_error(e: rusqlite::Error, email: &str) -> DeviceError {
    match e {
        rusqlite::Error::SqliteFailure(f, _) if f.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE => {
            DeviceError::OwnerExists(email.to_string())
        }
        other => other.into(),
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DeviceError::Invalid("device name is required".to_string()));
    }
    Ok(())
}
