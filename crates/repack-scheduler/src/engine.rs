use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use repack_core::config::SchedulerConfig;
use repack_core::types::ReminderStage;
use repack_core::OverlapPolicy;
use repack_devices::{DeviceWithOwner, RecordOutcome};
use repack_notify::{Delivery, Dispatcher, ReminderPayload};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    calendar::due_date,
    error::{Result, SchedulerError},
    evaluator::evaluate,
    schedule::next_daily_run,
    store::ReminderStore,
    types::{DeviceOutcome, DriverState, RunSummary},
};

/// Drives reminder batches: evaluate every eligible device, deliver, then
/// persist the sent-flag.
///
/// A device's state is only committed after its delivery succeeded, so a
/// failed delivery is retried on the next run. A crash between delivery and
/// commit can send the same reminder twice (at-least-once).
pub struct ReminderEngine {
    store: Arc<dyn ReminderStore>,
    dispatcher: Arc<dyn Dispatcher>,
    config: SchedulerConfig,
    /// Held for the whole of a batch; batches never overlap.
    run_lock: Mutex<()>,
    running: AtomicBool,
}

impl ReminderEngine {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        dispatcher: Arc<dyn Dispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
            run_lock: Mutex::new(()),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> DriverState {
        if self.running.load(Ordering::SeqCst) {
            DriverState::Running
        } else {
            DriverState::Idle
        }
    }

    /// Run one batch as of `now`.
    ///
    /// Under [`OverlapPolicy::Skip`] a call made while another batch is
    /// running fails with [`SchedulerError::RunInProgress`]; under
    /// [`OverlapPolicy::Queue`] it waits for that batch and then runs.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        self.run_once_until(now, &AtomicBool::new(false)).await
    }

    /// Like [`run_once`](Self::run_once), but stops starting device tasks
    /// once `stop` is set. In-flight deliveries finish; devices with a
    /// reminder due that were not started count as abandoned and are picked
    /// up by the next batch.
    pub async fn run_once_until(&self, now: DateTime<Utc>, stop: &AtomicBool) -> Result<RunSummary> {
        let _guard = match self.config.overlap {
            OverlapPolicy::Skip => self
                .run_lock
                .try_lock()
                .map_err(|_| SchedulerError::RunInProgress)?,
            OverlapPolicy::Queue => self.run_lock.lock().await,
        };
        let _running = RunningFlag::set(&self.running);

        let summary = self.run_batch(now, stop).await?;
        info!(
            %now,
            evaluated = summary.evaluated,
            unreadable = summary.unreadable,
            stage1_sent = summary.stage1_sent,
            stage2_sent = summary.stage2_sent,
            dry_run = summary.dry_run,
            skipped = summary.skipped,
            delivery_failures = summary.delivery_failures,
            commit_failures = summary.commit_failures,
            abandoned = summary.abandoned,
            "reminder run finished"
        );
        Ok(summary)
    }

    /// Daily loop. Optionally runs once at startup, then sleeps until the
    /// configured `HH:MM` UTC, runs, and repeats until `shutdown` is `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            hour = self.config.daily_at_hour,
            minute = self.config.daily_at_minute,
            "reminder engine started"
        );

        if self.config.run_on_startup && self.tick(&mut shutdown).await {
            info!("reminder engine shutting down");
            return;
        }

        loop {
            let now = Utc::now();
            let next = match next_daily_run(
                self.config.daily_at_hour,
                self.config.daily_at_minute,
                now,
            ) {
                Ok(next) => next,
                Err(e) => {
                    error!("cannot schedule reminder run: {e}");
                    break;
                }
            };
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(next_run = %next, "next reminder run scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if self.tick(&mut shutdown).await {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("reminder engine shutting down");
    }

    // ── private helpers ─────────────────────────────────────────────────────

    /// One scheduled batch. Returns true if shutdown was requested meanwhile.
    async fn tick(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let stop = AtomicBool::new(false);
        let batch = self.run_once_until(Utc::now(), &stop);
        tokio::pin!(batch);
        let mut stopping = false;

        let result = loop {
            tokio::select! {
                result = &mut batch => break result,
                changed = shutdown.changed(), if !stopping => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown requested, finishing in-flight deliveries");
                        stop.store(true, Ordering::SeqCst);
                        stopping = true;
                    }
                }
            }
        };

        match result {
            Ok(_) => {}
            Err(SchedulerError::RunInProgress) => {
                warn!("previous reminder run still in progress, skipping this tick")
            }
            Err(e) => error!("reminder run failed: {e}"),
        }
        stopping
    }

    async fn run_batch(&self, now: DateTime<Utc>, stop: &AtomicBool) -> Result<RunSummary> {
        let listing = self.store.list_eligible_devices(now)?;
        if listing.unreadable > 0 {
            warn!(
                unreadable = listing.unreadable,
                "eligible devices left out of this run because their rows could not be read"
            );
        }
        let mut summary = RunSummary {
            evaluated: listing.devices.len(),
            unreadable: listing.unreadable,
            ..RunSummary::default()
        };

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_deliveries.max(1)));
        let mut tasks = JoinSet::new();

        for record in listing.devices {
            let Some(stage) = evaluate(&record, now).stage() else {
                summary.record(DeviceOutcome::Skipped);
                continue;
            };
            if stop.load(Ordering::SeqCst) {
                summary.abandoned += 1;
                continue;
            }
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                summary.abandoned += 1;
                continue;
            };
            if stop.load(Ordering::SeqCst) {
                summary.abandoned += 1;
                continue;
            }

            let store = Arc::clone(&self.store);
            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.spawn(async move {
                let _permit = permit;
                process_device(store.as_ref(), dispatcher.as_ref(), record, stage, now).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!("device task failed: {e}");
                    summary.record(DeviceOutcome::DeliveryFailed);
                }
            }
        }
        Ok(summary)
    }
}

#[instrument(
    skip(store, dispatcher, record),
    fields(device_id = %record.device.id, owner_id = %record.owner.id)
)]
async fn process_device(
    store: &dyn ReminderStore,
    dispatcher: &dyn Dispatcher,
    record: DeviceWithOwner,
    stage: ReminderStage,
    now: DateTime<Utc>,
) -> DeviceOutcome {
    let payload = payload_for(&record);
    let id = record.device.id;

    match dispatcher.send(&record.owner.email, stage, &payload).await {
        Ok(Delivery::Delivered) => {}
        Ok(Delivery::DryRun) => {
            info!(%stage, to = %record.owner.email, "reminder due, dry run only, nothing recorded");
            return DeviceOutcome::DryRun(stage);
        }
        Err(e) => {
            warn!(
                dispatcher = dispatcher.name(),
                %stage,
                "reminder delivery failed, will retry next run: {e}"
            );
            return DeviceOutcome::DeliveryFailed;
        }
    }

    match store.record_sent(id, stage, now) {
        Ok(RecordOutcome::Recorded) => {
            info!(%stage, to = %record.owner.email, "reminder sent");
            DeviceOutcome::Sent(stage)
        }
        Ok(RecordOutcome::AlreadyRecorded) => DeviceOutcome::Sent(stage),
        Err(e) => {
            error!(%stage, "reminder delivered but not recorded, may be sent again: {e}");
            DeviceOutcome::CommitFailed
        }
    }
}

fn payload_for(record: &DeviceWithOwner) -> ReminderPayload {
    let device = &record.device;
    ReminderPayload {
        owner_name: record.owner.display_name(),
        device_name: device.name.clone(),
        serial_number: device.serial_number.clone(),
        last_serviced: device.last_serviced,
        due_date: due_date(device.last_serviced, device.interval),
        interval_months: device.interval.months(),
    }
}

/// Marks the engine as running for as long as it is alive.
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
