//! Timeout monitor: periodic sweep over idle running tasks.
//!
//! A sweep reminds actors who went quiet, abandons tasks idle past the
//! abandonment threshold (keeping a resumable snapshot), and expires stale
//! invitations. Each task is re-read under its actor's lock, so a sweep never
//! interleaves with a delivery for the same actor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::channels::{NotificationTemplate, Notifier};
use crate::config::{EngineConfig, to_chrono};
use crate::error::EngineError;
use crate::invitations::InvitationLedger;
use crate::store::Database;
use crate::tasks::{AbandonedSnapshot, ActorLocks, Task, TaskStatus, TaskStore};

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub reminded: usize,
    pub abandoned: usize,
    pub invitations_expired: usize,
    /// Another sweep was already running; nothing was touched.
    pub skipped: bool,
}

enum SweepAction {
    Reminded,
    Abandoned,
    None,
}

/// Clears the in-flight flag when the sweep ends, including on early return.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct TimeoutMonitor {
    db: Arc<dyn Database>,
    tasks: TaskStore,
    locks: Arc<ActorLocks>,
    ledger: Arc<InvitationLedger>,
    notifier: Notifier,
    config: EngineConfig,
    running: AtomicBool,
}

impl TimeoutMonitor {
    pub fn new(
        db: Arc<dyn Database>,
        locks: Arc<ActorLocks>,
        ledger: Arc<InvitationLedger>,
        notifier: Notifier,
        config: EngineConfig,
    ) -> Self {
        Self {
            tasks: TaskStore::new(Arc::clone(&db)),
            db,
            locks,
            ledger,
            notifier,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Run one sweep at `now`.
    pub async fn run_timeout_sweep(&self, now: DateTime<Utc>) -> SweepSummary {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Timeout sweep already in flight, skipping");
            return SweepSummary {
                skipped: true,
                ..SweepSummary::default()
            };
        }
        let _in_flight = InFlight(&self.running);

        let mut summary = SweepSummary::default();
        let reminder_cutoff = now - to_chrono(self.config.reminder_threshold);

        let candidates = match self.tasks.idle_since(reminder_cutoff).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!("Failed to list idle tasks: {e}");
                Vec::new()
            }
        };

        for candidate in candidates
            .into_iter()
            .filter(|t| self.config.monitored_task_types.contains(&t.task_type))
        {
            match self.sweep_task(&candidate, now).await {
                Ok(SweepAction::Reminded) => summary.reminded += 1,
                Ok(SweepAction::Abandoned) => summary.abandoned += 1,
                Ok(SweepAction::None) => {}
                Err(e) => {
                    tracing::error!(task_id = %candidate.id, kind = e.kind(), "Sweep failed for task: {e}");
                }
            }
        }

        match self.ledger.expire_sweep(now).await {
            Ok(n) => summary.invitations_expired = n,
            Err(e) => tracing::error!("Invitation expiry failed: {e}"),
        }

        if summary.reminded + summary.abandoned + summary.invitations_expired > 0 {
            tracing::info!(
                reminded = summary.reminded,
                abandoned = summary.abandoned,
                invitations_expired = summary.invitations_expired,
                "Timeout sweep finished"
            );
        }
        summary
    }

    async fn sweep_task(&self, candidate: &Task, now: DateTime<Utc>) -> Result<SweepAction, EngineError> {
        let _guard = self
            .locks
            .lock(&candidate.actor_key, candidate.actor_role)
            .await;

        // The candidate list may be stale by the time the lock is ours.
        let task = self.tasks.get(candidate.id).await?;
        if task.status != TaskStatus::Running {
            return Ok(SweepAction::None);
        }
        let idle = task.idle_for(now);

        if idle >= to_chrono(self.config.abandonment_threshold) {
            // Snapshot before abandon: an abandoned task always has one.
            let previous = self
                .db
                .get_abandoned_snapshot(&task.actor_key, task.task_type)
                .await?;
            self.db
                .save_abandoned_snapshot(&AbandonedSnapshot::of(&task, now))
                .await?;
            if !self.tasks.abandon(&task, now).await? {
                tracing::debug!(task_id = %task.id, "Task changed during sweep, not abandoning");
                match previous {
                    Some(previous) => self.db.save_abandoned_snapshot(&previous).await?,
                    None => {
                        self.db
                            .delete_abandoned_snapshot(&task.actor_key, task.task_type)
                            .await?;
                    }
                }
                return Ok(SweepAction::None);
            }
            if let Err(e) = self
                .db
                .record_event(
                    "task_abandoned",
                    &task.actor_key,
                    &json!({
                        "task_id": task.id,
                        "task_type": task.task_type.as_str(),
                        "last_step": task.step(),
                        "idle_secs": idle.num_seconds(),
                        "reminder_sent": task.reminder_sent,
                    }),
                    now,
                )
                .await
            {
                tracing::error!(task_id = %task.id, "Failed to record task_abandoned: {e}");
            }

            tracing::info!(
                task_id = %task.id,
                actor_key = %task.actor_key,
                task_type = %task.task_type,
                step = task.step(),
                "Task abandoned"
            );
            self.notifier
                .notify(
                    &task.actor_key,
                    NotificationTemplate::TaskAbandoned,
                    json!({
                        "task_type": task.task_type.as_str(),
                        "resume_hours": to_chrono(self.config.resume_window).num_hours(),
                    }),
                )
                .await;
            return Ok(SweepAction::Abandoned);
        }

        if idle >= to_chrono(self.config.reminder_threshold) && !task.reminder_sent {
            if !self.tasks.mark_reminded(&task, now).await? {
                return Ok(SweepAction::None);
            }
            tracing::info!(task_id = %task.id, actor_key = %task.actor_key, "Reminder sent");
            self.notifier
                .notify(
                    &task.actor_key,
                    NotificationTemplate::TaskReminder,
                    json!({ "task_type": task.task_type.as_str() }),
                )
                .await;
            return Ok(SweepAction::Reminded);
        }

        Ok(SweepAction::None)
    }
}

/// Spawn a background task that sweeps every `interval`.
pub fn spawn_sweep_ticker(
    monitor: Arc<TimeoutMonitor>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            monitor.run_timeout_sweep(Utc::now()).await;
        }
    })
}
