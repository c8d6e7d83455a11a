//! Full reminder cycle against a real SQLite store: due, escalation, silence,
//! repack, and a new cycle.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use repack_core::config::SchedulerConfig;
use repack_core::types::{ReminderInterval, ReminderStage};
use repack_devices::{DeviceStore, DeviceUpdate, NewDevice, NewOwner, ReminderState};
use repack_notify::{Delivery, Dispatcher, ReminderPayload};
use repack_scheduler::{ReminderEngine, ReminderStore, RunSummary};
use rusqlite::Connection;

#[derive(Default)]
struct Outbox(Mutex<Vec<(String, ReminderStage, ReminderPayload)>>);

#[async_trait]
impl Dispatcher for Outbox {
    fn name(&self) -> &str {
        "outbox"
    }

    async fn send(
        &self,
        address: &str,
        stage: ReminderStage,
        payload: &ReminderPayload,
    ) -> repack_notify::Result<Delivery> {
        self.0
            .lock()
            .unwrap()
            .push((address.to_string(), stage, payload.clone()));
        Ok(Delivery::Delivered)
    }

    async fn send_test(&self, _address: &str) -> repack_notify::Result<Delivery> {
        Ok(Delivery::Delivered)
    }
}

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
}

fn summary(stage1: usize, stage2: usize, skipped: usize) -> RunSummary {
    RunSummary {
        evaluated: stage1 + stage2 + skipped,
        stage1_sent: stage1,
        stage2_sent: stage2,
        skipped,
        ..RunSummary::default()
    }
}

#[tokio::test]
async fn six_month_cycle_from_january_15() {
    let store = Arc::new(DeviceStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let owner = store
        .create_owner(&NewOwner {
            email: "pia@example.com".into(),
            first_name: "Pia".into(),
            last_name: "Pilot".into(),
            is_admin: false,
        })
        .unwrap();
    let device = store
        .create_device(&NewDevice {
            owner_id: owner.id,
            name: "Rescue 120".into(),
            serial_number: Some("R120-0042".into()),
            notes: None,
            last_serviced: Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()),
            interval: ReminderInterval::SixMonths,
            reminders_enabled: true,
        })
        .unwrap();

    let outbox = Arc::new(Outbox::default());
    let reminder_store: Arc<dyn ReminderStore> = store.clone();
    let engine = ReminderEngine::new(reminder_store, outbox.clone(), SchedulerConfig::default());

    assert_eq!(engine.run_once(day(2024, 7, 14)).await.unwrap(), summary(0, 0, 1));
    assert_eq!(engine.run_once(day(2024, 7, 15)).await.unwrap(), summary(1, 0, 0));
    assert_eq!(engine.run_once(day(2024, 8, 14)).await.unwrap(), summary(0, 0, 1));
    assert_eq!(engine.run_once(day(2024, 8, 15)).await.unwrap(), summary(0, 1, 0));
    assert_eq!(engine.run_once(day(2025, 1, 1)).await.unwrap(), summary(0, 0, 1));

    {
        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let (to, stage, payload) = &sent[0];
        assert_eq!(to, "pia@example.com");
        assert_eq!(*stage, ReminderStage::Stage1);
        assert_eq!(payload.owner_name, "Pia Pilot");
        assert_eq!(payload.serial_number.as_deref(), Some("R120-0042"));
        assert_eq!(payload.due_date, Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap());
        assert_eq!(payload.interval_months, 6);
        assert_eq!(sent[1].1, ReminderStage::Stage2);
    }

    // Repacked on 2025-01-02: new cycle, flags cleared.
    let current = store.get_device(device.id).unwrap().unwrap();
    let outcome = store
        .update_device(
            device.id,
            &DeviceUpdate {
                name: current.name.clone(),
                serial_number: current.serial_number.clone(),
                notes: current.notes.clone(),
                last_serviced: day(2025, 1, 2),
                interval: current.interval,
                reminders_enabled: true,
            },
        )
        .unwrap();
    assert!(outcome.reminders_reset);
    let repacked = store.get_device(device.id).unwrap().unwrap();
    assert_eq!(repacked.reminder_state(), ReminderState::Pending);

    assert_eq!(engine.run_once(day(2025, 7, 1)).await.unwrap(), summary(0, 0, 1));
    assert_eq!(engine.run_once(day(2025, 7, 2)).await.unwrap(), summary(1, 0, 0));
    assert_eq!(outbox.0.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn outage_catch_up_sends_stage1_first() {
    let store = Arc::new(DeviceStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let owner = store
        .create_owner(&NewOwner {
            email: "late@example.com".into(),
            first_name: "Lou".into(),
            last_name: "Late".into(),
            is_admin: false,
        })
        .unwrap();
    store
        .create_device(&NewDevice {
            owner_id: owner.id,
            name: "Reserve".into(),
            serial_number: None,
            notes: None,
            last_serviced: Some(day(2024, 1, 15)),
            interval: ReminderInterval::SixMonths,
            reminders_enabled: true,
        })
        .unwrap();

    let outbox = Arc::new(Outbox::default());
    let reminder_store: Arc<dyn ReminderStore> = store.clone();
    let engine = ReminderEngine::new(reminder_store, outbox.clone(), SchedulerConfig::default());

    // Down from July to October: the first run back sends stage 1, not stage 2.
    assert_eq!(engine.run_once(day(2024, 10, 1)).await.unwrap(), summary(1, 0, 0));
    // Escalation is measured from the due date, which is long past.
    assert_eq!(engine.run_once(day(2024, 10, 2)).await.unwrap(), summary(0, 1, 0));
}

#[tokio::test]
async fn end_of_month_packing_rolls_into_next_month() {
    let store = Arc::new(DeviceStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let owner = store
        .create_owner(&NewOwner {
            email: "eom@example.com".into(),
            first_name: "Eva".into(),
            last_name: "Ende".into(),
            is_admin: false,
        })
        .unwrap();
    store
        .create_device(&NewDevice {
            owner_id: owner.id,
            name: "Reserve".into(),
            serial_number: None,
            notes: None,
            last_serviced: Some(Utc.with_ymd_and_hms(2023, 8, 31, 0, 0, 0).unwrap()),
            interval: ReminderInterval::SixMonths,
            reminders_enabled: true,
        })
        .unwrap();

    let outbox = Arc::new(Outbox::default());
    let reminder_store: Arc<dyn ReminderStore> = store.clone();
    let engine = ReminderEngine::new(reminder_store, outbox.clone(), SchedulerConfig::default());

    // Feb 31 does not exist; the due date is Mar 2 2024, escalation Apr 2.
    assert_eq!(engine.run_once(day(2024, 2, 29)).await.unwrap(), summary(0, 0, 1));
    assert_eq!(engine.run_once(day(2024, 3, 1)).await.unwrap(), summary(0, 0, 1));
    assert_eq!(engine.run_once(day(2024, 3, 2)).await.unwrap(), summary(1, 0, 0));
    assert_eq!(engine.run_once(day(2024, 4, 1)).await.unwrap(), summary(0, 0, 1));
    assert_eq!(engine.run_once(day(2024, 4, 2)).await.unwrap(), summary(0, 1, 0));

    let sent = outbox.0.lock().unwrap();
    assert_eq!(sent[0].2.due_date, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
}
