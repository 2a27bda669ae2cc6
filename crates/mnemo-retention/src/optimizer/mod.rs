//! Periodic tier optimization
//!
//! A pass re-scores every tracked item in scope and moves the ones whose
//! tier no longer matches their score. It runs in three phases:
//!
//! 1. **Rescore**: fetch signals (cached values if the classifier is down),
//!    apply decay and compute each item's threshold tier. Items whose last
//!    score was stale go first.
//! 2. **Demote**: move unprotected items down, in parallel. A demotion whose
//!    target is full is deferred to phase 3.
//! 3. **Settle**: promotions and deferred demotions, one at a time in
//!    descending score order, displacing lower-scored members where needed.
//!
//! Demotions run first so the capacity they free is there for promotions.
//! Cancellation is checked between items. A pass that sees too many store
//! failures in a row stops early; migrations it already committed stay.

pub mod run_lock;
pub mod scheduler;

pub use run_lock::{RunGuard, RunLock, RunScope};
pub use scheduler::SchedulerHandle;

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::core::{EngineCore, Settlement};
use crate::error::{MigrationError, SignalError};
use crate::memory::index::{CachedSignals, ItemSlot};
use crate::memory::types::{ItemId, StorageTier};
use crate::signals::fetch_signals;
use crate::storage::decay::DecayOutcome;

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Stopped between items on request
    Cancelled,
    /// Stopped early; committed migrations stay
    Failed { reason: String },
    /// Another pass covering this scope was running; nothing was done
    AlreadyRunning,
}

/// What started a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

/// Summary of one optimization pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRunReport {
    pub run_id: Uuid,
    /// `None` for a pass over every owner
    pub owner_id: Option<String>,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub items_examined: usize,
    /// Items scored from cached signals because the classifier was down
    pub stale_scores: usize,
    pub decayed: usize,
    pub demotions: usize,
    pub promotions: usize,
    /// Includes moves of displaced members
    pub migrations_performed: usize,
    pub migrations_failed: usize,
    pub status: RunStatus,
}

impl OptimizationRunReport {
    pub fn started(owner_id: Option<&str>, trigger: RunTrigger, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            owner_id: owner_id.map(str::to_string),
            trigger,
            started_at,
            duration_ms: 0,
            items_examined: 0,
            stale_scores: 0,
            decayed: 0,
            demotions: 0,
            promotions: 0,
            migrations_performed: 0,
            migrations_failed: 0,
            status: RunStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerPhase {
    Idle,
    Running,
}

/// Current optimizer state and the outcome of the last pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub phase: OptimizerPhase,
    pub running: Vec<RunScope>,
    pub last_outcome: Option<RunStatus>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

/// Optimizer tuning
#[derive(Debug, Clone, Copy)]
pub struct OptimizerSettings {
    pub signal_timeout: Duration,
    pub max_parallel_migrations: usize,
    pub max_consecutive_failures: usize,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            signal_timeout: Duration::from_millis(2000),
            max_parallel_migrations: 8,
            max_consecutive_failures: 10,
        }
    }
}

/// An item whose tier should change
#[derive(Debug, Clone, Copy)]
struct Planned {
    item_id: ItemId,
    from: StorageTier,
    target: StorageTier,
    score: f64,
}

/// Work found by the rescore phase
#[derive(Debug, Default)]
struct Plan {
    demotions: Vec<Planned>,
    promotions: Vec<Planned>,
}

/// Per-pass failure bookkeeping
#[derive(Debug)]
struct PassControl {
    epoch: u64,
    consecutive_failures: usize,
    failure: Option<String>,
}

pub struct TierOptimizer {
    core: Arc<EngineCore>,
    settings: OptimizerSettings,
    run_lock: RunLock,
    cancel_epoch: AtomicU64,
    last: Mutex<Option<(RunStatus, DateTime<Utc>)>>,
}

impl std::fmt::Debug for TierOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierOptimizer")
            .field("settings", &self.settings)
            .field("running", &self.run_lock.running())
            .finish()
    }
}

impl TierOptimizer {
    pub fn new(core: Arc<EngineCore>, settings: OptimizerSettings) -> Self {
        Self {
            core,
            settings: OptimizerSettings {
                max_parallel_migrations: settings.max_parallel_migrations.max(1),
                max_consecutive_failures: settings.max_consecutive_failures.max(1),
                ..settings
            },
            run_lock: RunLock::new(),
            cancel_epoch: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn state(&self) -> OptimizerState {
        let running = self.run_lock.running();
        let last = self.last.lock().clone();
        OptimizerState {
            phase: if running.is_empty() {
                OptimizerPhase::Idle
            } else {
                OptimizerPhase::Running
            },
            running,
            last_outcome: last.as_ref().map(|(status, _)| status.clone()),
            last_finished_at: last.map(|(_, at)| at),
        }
    }

    /// Ask every running pass to stop before its next item
    pub fn cancel(&self) {
        self.cancel_epoch.fetch_add(1, Ordering::SeqCst);
        if !self.run_lock.is_idle() {
            tracing::info!("Cancellation requested for running optimization pass");
        }
    }

    /// Run one pass over `owner_id`'s items, or every item if `None`
    ///
    /// Never fails: problems are reported in the returned report's status.
    pub async fn run_pass(
        &self,
        owner_id: Option<&str>,
        trigger: RunTrigger,
    ) -> OptimizationRunReport {
        let mut report = OptimizationRunReport::started(owner_id, trigger, self.core.clock.now());
        let scope = RunScope::from_owner(owner_id);

        let Some(_guard) = self.run_lock.try_acquire(scope.clone()) else {
            tracing::info!(scope = %scope, "Optimization pass already running, trigger dropped");
            report.status = RunStatus::AlreadyRunning;
            self.core.metrics.record_pass(&report);
            return report;
        };

        let mut control = PassControl {
            epoch: self.cancel_epoch.load(Ordering::SeqCst),
            consecutive_failures: 0,
            failure: None,
        };
        let start = Instant::now();
        tracing::info!(run_id = %report.run_id, scope = %scope, ?trigger, "Starting optimization pass");

        let status = self.execute(owner_id, &mut control, &mut report).await;
        report.status = status;
        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.core.metrics.record_pass(&report);
        *self.last.lock() = Some((report.status.clone(), self.core.clock.now()));

        match &report.status {
            RunStatus::Failed { reason } => tracing::error!(
                run_id = %report.run_id,
                reason = %reason,
                migrations_performed = report.migrations_performed,
                "Optimization pass aborted"
            ),
            status => tracing::info!(
                run_id = %report.run_id,
                status = ?status,
                items_examined = report.items_examined,
                demotions = report.demotions,
                promotions = report.promotions,
                migrations_failed = report.migrations_failed,
                duration_ms = report.duration_ms,
                "Optimization pass complete"
            ),
        }

        report
    }

    async fn execute(
        &self,
        owner_id: Option<&str>,
        control: &mut PassControl,
        report: &mut OptimizationRunReport,
    ) -> RunStatus {
        let Some(plan) = self.rescore(owner_id, control, report).await else {
            return RunStatus::Cancelled;
        };

        let mut to_settle = plan.promotions;
        let deferred = self.demote(plan.demotions, control, report).await;
        if let Some(status) = self.interrupted(control) {
            return status;
        }

        to_settle.extend(deferred);
        to_settle.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.settle(to_settle, control, report).await;

        self.interrupted(control).unwrap_or(RunStatus::Completed)
    }

    /// Phase 1. Returns `None` if cancelled.
    async fn rescore(
        &self,
        owner_id: Option<&str>,
        control: &PassControl,
        report: &mut OptimizationRunReport,
    ) -> Option<Plan> {
        let mut slots: Vec<(bool, Arc<ItemSlot>)> = self
            .core
            .index
            .slots(owner_id)
            .into_iter()
            .map(|slot| {
                let stale = slot.lock().stale_score;
                (stale, slot)
            })
            .collect();
        slots.sort_by_key(|(stale, _)| !*stale);

        let mut plan = Plan::default();
        for (_, slot) in slots {
            if self.is_cancelled(control.epoch) {
                return None;
            }
            if let Some(planned) = self.rescore_item(&slot, report).await {
                if planned.target.is_colder_than(planned.from) {
                    plan.demotions.push(planned);
                } else {
                    plan.promotions.push(planned);
                }
            }
        }
        Some(plan)
    }

    /// Refresh one item's signals and score; returns a plan if its tier
    /// should change
    async fn rescore_item(
        &self,
        slot: &ItemSlot,
        report: &mut OptimizationRunReport,
    ) -> Option<Planned> {
        let (item_ref, cached) = {
            let entry = slot.lock();
            if entry.retired {
                return None;
            }
            (entry.item.item_ref(), entry.signals)
        };

        let fetched =
            fetch_signals(self.core.signals.as_ref(), &item_ref, self.settings.signal_timeout).await;
        let now = self.core.clock.now();

        let (signals, stale) = match fetched {
            Ok(reading) => (
                CachedSignals {
                    relevance: reading.relevance,
                    emotional_weight: reading.emotional_weight,
                    fetched_at: now,
                },
                false,
            ),
            Err(SignalError::Unavailable(reason)) => {
                self.core.metrics.record_classifier_unavailable();
                report.stale_scores += 1;
                tracing::warn!(item_id = %item_ref.id, reason = %reason, "Classifier unavailable, using cached signals");
                (cached, true)
            }
            // Nothing new to learn about this item
            Err(SignalError::UnknownItem(_)) => (cached, false),
        };

        let base_score = self.core.score_for(
            &item_ref.owner_id,
            signals.relevance,
            signals.emotional_weight,
            now,
        );
        let protected = self.core.protection.is_protected(item_ref.id);

        let (tier, score, outcome) = {
            let mut entry = slot.lock();
            if entry.retired {
                return None;
            }
            entry.signals = signals;
            entry.stale_score = stale;
            let outcome = self.core.decay.apply(&mut entry, base_score, protected, now);
            (entry.item.tier, entry.item.score, outcome)
        };

        report.items_examined += 1;
        if matches!(outcome, DecayOutcome::Decayed { .. }) {
            report.decayed += 1;
        }

        let target = self.core.classifier.threshold_tier(score);
        let demote = target.is_colder_than(tier) && !protected;
        let promote = tier.is_colder_than(target);
        (demote || promote).then_some(Planned {
            item_id: item_ref.id,
            from: tier,
            target,
            score,
        })
    }

    /// Phase 2. Returns the demotions whose target tier was full.
    async fn demote(
        &self,
        demotions: Vec<Planned>,
        control: &mut PassControl,
        report: &mut OptimizationRunReport,
    ) -> Vec<Planned> {
        let stop = AtomicBool::new(false);
        let epoch = control.epoch;
        let stop_ref = &stop;

        let mut results = pin!(
            futures::stream::iter(demotions)
                .map(|planned| async move {
                    if stop_ref.load(Ordering::SeqCst) || self.is_cancelled(epoch) {
                        return None;
                    }
                    let result = self
                        .core
                        .migrations
                        .migrate(planned.item_id, planned.from, planned.target)
                        .await;
                    Some((planned, result))
                })
                .buffer_unordered(self.settings.max_parallel_migrations)
        );

        let mut deferred = Vec::new();
        while let Some(outcome) = results.next().await {
            let Some((planned, result)) = outcome else {
                continue;
            };
            match result {
                Ok(()) => {
                    report.demotions += 1;
                    report.migrations_performed += 1;
                    control.consecutive_failures = 0;
                }
                Err(MigrationError::CapacityExceeded(_)) => deferred.push(planned),
                Err(e) => {
                    if self.record_failure(&e, control, report) {
                        stop.store(true, Ordering::SeqCst);
                    }
                }
            }
        }
        deferred
    }

    /// Phase 3
    async fn settle(
        &self,
        items: Vec<Planned>,
        control: &mut PassControl,
        report: &mut OptimizationRunReport,
    ) {
        for planned in items {
            if self.is_cancelled(control.epoch) || control.failure.is_some() {
                return;
            }
            match self.core.settle(planned.item_id).await {
                Ok(Settlement::Moved {
                    from,
                    to,
                    displaced,
                }) => {
                    if to.is_colder_than(from) {
                        report.demotions += 1;
                    } else {
                        report.promotions += 1;
                    }
                    report.migrations_performed += 1 + usize::from(displaced);
                    control.consecutive_failures = 0;
                }
                Ok(Settlement::Blocked | Settlement::NotNeeded) => {}
                Err(e) => {
                    self.record_failure(&e, control, report);
                }
            }
        }
    }

    /// Count a failed migration; returns true once the pass should stop
    fn record_failure(
        &self,
        error: &MigrationError,
        control: &mut PassControl,
        report: &mut OptimizationRunReport,
    ) -> bool {
        match error {
            // Untracked concurrently; nothing to retry
            MigrationError::ItemNotFound(_) | MigrationError::CapacityExceeded(_) => {}
            MigrationError::Store(_) | MigrationError::Timeout(_) => {
                report.migrations_failed += 1;
                control.consecutive_failures += 1;
            }
            MigrationError::TierMismatch { .. } | MigrationError::InFlight(_) => {
                report.migrations_failed += 1;
            }
        }

        if control.failure.is_none()
            && control.consecutive_failures >= self.settings.max_consecutive_failures
        {
            control.failure = Some(format!(
                "{} consecutive store failures, last: {error}",
                control.consecutive_failures
            ));
        }
        control.failure.is_some()
    }

    fn interrupted(&self, control: &PassControl) -> Option<RunStatus> {
        if let Some(reason) = &control.failure {
            return Some(RunStatus::Failed {
                reason: reason.clone(),
            });
        }
        self.is_cancelled(control.epoch)
            .then_some(RunStatus::Cancelled)
    }

    fn is_cancelled(&self, epoch: u64) -> bool {
        self.cancel_epoch.load(Ordering::SeqCst) != epoch
    }
}
