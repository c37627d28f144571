// libs/queue-cell/src/services/sweeper.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{SchedulingRules, SlotKey, SweepReport};
use crate::services::locks::ScopeLocks;
use crate::store::SchedulingStore;

/// Completes appointments whose slot has fully elapsed.
///
/// The slot containing `now` is still being served and is never touched,
/// however far into it the clock is.
pub struct TimeTransitionSweeper {
    store: Arc<dyn SchedulingStore>,
    rules: Arc<SchedulingRules>,
    locks: Arc<ScopeLocks<SlotKey>>,
}

impl TimeTransitionSweeper {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        rules: Arc<SchedulingRules>,
        locks: Arc<ScopeLocks<SlotKey>>,
    ) -> Self {
        Self { store, rules, locks }
    }

    #[instrument(skip(self))]
    pub async fn sweep(&self, now: NaiveDateTime) -> Result<SweepReport, SchedulingError> {
        let today = now.date();
        let current = self.rules.current_slot(now);

        let stale = self.store.stale_appointments(today, current.start).await?;
        if stale.is_empty() {
            debug!("Nothing to sweep before {} {}", today, current.start);
            return Ok(SweepReport::default());
        }

        let mut groups: BTreeMap<SlotKey, Vec<Uuid>> = BTreeMap::new();
        for appointment in &stale {
            let window = self.rules.slot_for(appointment.time);
            groups
                .entry(SlotKey::of(appointment, &window))
                .or_default()
                .push(appointment.id);
        }

        let mut report = SweepReport { examined: stale.len(), completed: 0 };
        for (key, ids) in groups {
            let _guard = self.locks.lock(&key).await;
            report.completed += self.store.complete_appointments(&ids).await?;
        }

        info!("Sweep completed {} of {} elapsed appointments", report.completed, report.examined);
        Ok(report)
    }
}
