//! The rotation coordinator.
//!
//! Every operation converges the store towards "exactly one current record
//! for the present window, one staged next record" using only idempotent
//! writes: clear the current flag, then promote the target. Independent
//! instances racing through the same steps end in the same state; within
//! one instance, coordination tokens collapse duplicate work.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use ponder_core::clock::Clock;
use ponder_core::error::DomainError;
use ponder_core::generation::CandidateGenerator;
use ponder_core::item::{FlagUpdate, ItemFlag, ItemRecord};
use ponder_core::repository::ItemRepository;
use ponder_core::rng::DeterministicRng;
use ponder_core::window::WindowClock;
use ponder_generation::fallback::FallbackPool;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::application::coordination::{CoordinationToken, TokenRole};
use crate::application::query_handlers::{
    CurrentAndNextView, CurrentView, HistoryEntry, NextView, PreGenerateView, RotateView,
    history_entries, history_limit,
};
use crate::application::synthesis::{SynthesisPath, Synthesizer};
use crate::domain::state::{RotationOutcome, RotationState, is_fresh};

/// Tunables for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Window arithmetic in the reference zone.
    pub window_clock: WindowClock,
    /// Whether a next item is staged ahead of each boundary.
    pub stage_next: bool,
    /// Timeout applied to every store and generator call.
    pub call_timeout: Duration,
    /// How long a completed operation stays joinable.
    pub grace: Duration,
    /// How close to the boundary pre-generation starts.
    pub pregenerate_lead: TimeDelta,
    /// Pre-written items used when generation is unavailable.
    pub pool: FallbackPool,
}

impl CoordinatorConfig {
    /// Default per-call timeout.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default coordination grace delay.
    pub const DEFAULT_GRACE: Duration = Duration::from_millis(250);
    /// Default pre-generation lead, in minutes.
    pub const DEFAULT_PREGENERATE_LEAD_MINUTES: i64 = 5;

    /// Defaults for `window_clock`: staging on, 5 s timeouts, 250 ms grace,
    /// 5 minute pre-generation lead, built-in fallback pool.
    #[must_use]
    pub fn new(window_clock: WindowClock) -> Self {
        Self {
            window_clock,
            stage_next: true,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            grace: Self::DEFAULT_GRACE,
            pregenerate_lead: TimeDelta::minutes(Self::DEFAULT_PREGENERATE_LEAD_MINUTES),
            pool: FallbackPool::default(),
        }
    }

    /// Switches staging of the next item on or off.
    #[must_use]
    pub fn with_stage_next(mut self, stage_next: bool) -> Self {
        self.stage_next = stage_next;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Sets the coordination grace delay.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sets the pre-generation lead.
    #[must_use]
    pub fn with_pregenerate_lead(mut self, lead: TimeDelta) -> Self {
        self.pregenerate_lead = lead;
        self
    }

    /// Replaces the fallback pool.
    #[must_use]
    pub fn with_pool(mut self, pool: FallbackPool) -> Self {
        self.pool = pool;
        self
    }
}

/// A read of the store failed. Carries the best text available without it.
#[derive(Debug, Clone, Error)]
#[error("could not read the current item: {source}")]
pub struct ReadFailure {
    /// Last view this coordinator served, else a pool pick for the window.
    pub fallback: CurrentView,
    /// The underlying store error.
    pub source: DomainError,
}

#[derive(Debug, Clone)]
struct Convergence {
    record: ItemRecord,
    outcome: RotationOutcome,
}

#[derive(Debug, Clone)]
enum Staging {
    Staged(ItemRecord),
    AlreadyStaged(ItemRecord),
}

impl Staging {
    fn record(&self) -> &ItemRecord {
        match self {
            Self::Staged(record) | Self::AlreadyStaged(record) => record,
        }
    }
}

#[derive(Clone)]
struct Engine {
    repo: Arc<dyn ItemRepository>,
    clock: Arc<dyn Clock>,
    synthesizer: Arc<Synthesizer>,
    window_clock: WindowClock,
    call_timeout: Duration,
    stage_next: bool,
    rotation: CoordinationToken<DateTime<Utc>, Result<Convergence, DomainError>>,
    staging: CoordinationToken<DateTime<Utc>, Result<Staging, DomainError>>,
    staging_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Engine {
    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, DomainError>>,
    ) -> Result<T, DomainError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| {
                DomainError::StoreUnavailable(format!(
                    "{operation} timed out after {}ms",
                    self.call_timeout.as_millis()
                ))
            })?
    }

    async fn find(&self, flag: ItemFlag) -> Result<Option<ItemRecord>, DomainError> {
        self.bounded("find_by_flag", self.repo.find_by_flag(flag)).await
    }

    async fn current_or_converge(&self, now: DateTime<Utc>) -> Result<Convergence, DomainError> {
        if let Some(record) = self
            .find(ItemFlag::Current)
            .await?
            .filter(|record| is_fresh(record, &self.window_clock, now))
        {
            return Ok(Convergence {
                record,
                outcome: RotationOutcome::AlreadyCurrent,
            });
        }
        self.converge_once(now).await
    }

    async fn converge_once(&self, now: DateTime<Utc>) -> Result<Convergence, DomainError> {
        let window = self.window_clock.current_window_start(now);
        let engine = self.clone();
        let (result, role) = self
            .rotation
            .run(window, move || async move { engine.converge(now).await })
            .await;
        let convergence = result?;
        if role == TokenRole::Follower {
            if let Some(record) = self
                .find(ItemFlag::Current)
                .await?
                .filter(|record| is_fresh(record, &self.window_clock, now))
            {
                return Ok(Convergence {
                    record,
                    outcome: convergence.outcome,
                });
            }
        }
        Ok(convergence)
    }

    #[instrument(skip(self), fields(window_start))]
    async fn converge(&self, now: DateTime<Utc>) -> Result<Convergence, DomainError> {
        let window = self.window_clock.current_window_start(now);
        tracing::Span::current().record("window_start", tracing::field::display(window));

        // Next before current: a concurrent promotion clears next and sets
        // current in one write, so a missing next implies the current read
        // below already sees the promoted record.
        let next = self.find(ItemFlag::Next).await?;
        let current = self.find(ItemFlag::Current).await?;

        let state = RotationState::derive(current.as_ref(), next.as_ref(), &self.window_clock, now);
        if let Some(record) = current.filter(|_| state.is_serving()) {
            return Ok(Convergence {
                record,
                outcome: RotationOutcome::AlreadyCurrent,
            });
        }
        if let RotationState::Stale { missed_windows } = state {
            info!(missed_windows, "current item is stale; rotating");
        }

        let adopted = self
            .bounded(
                "find_records_for_window",
                self.repo.find_records_for_window(window),
            )
            .await?
            .into_iter()
            .next();

        let (target, outcome) = if let Some(record) = adopted {
            (record, RotationOutcome::Adopted)
        } else if let Some(record) = next {
            (record, RotationOutcome::Promoted)
        } else {
            match state {
                RotationState::Uninitialized => info!("no current item; initializing"),
                _ if self.stage_next => warn!(
                    "coordination miss: nothing staged at rotation time; synthesizing replacement"
                ),
                _ => info!("synthesizing item for new window"),
            }
            let synthesis = self
                .synthesizer
                .synthesize(window, SynthesisPath::Interactive)
                .await;
            let record = ItemRecord::for_window(&synthesis.text, now, window)?;
            match self.bounded("insert", self.repo.insert(record.clone())).await {
                Ok(stored) => self.settle_on_earliest(window, stored).await,
                Err(e) => return Ok(unpersisted(&record, window, &e)),
            }
        };

        if let Err(e) = self
            .bounded("clear_flag", self.repo.clear_flag(ItemFlag::Current))
            .await
        {
            return Ok(unpersisted(&target, window, &e));
        }
        match self
            .bounded(
                "set_flags",
                self.repo.set_flags(target.id, FlagUpdate::promote(window)),
            )
            .await
        {
            Ok(()) => {}
            Err(DomainError::Conflict(reason)) => {
                debug!(%reason, "another instance promoted first");
                return match self
                    .find(ItemFlag::Current)
                    .await?
                    .filter(|record| is_fresh(record, &self.window_clock, now))
                {
                    Some(record) => {
                        self.release_losers(window).await;
                        Ok(Convergence {
                            record,
                            outcome: RotationOutcome::Adopted,
                        })
                    }
                    None => Ok(unpersisted(&target, window, &DomainError::Conflict(reason))),
                };
            }
            Err(e) => return Ok(unpersisted(&target, window, &e)),
        }

        self.release_losers(window).await;
        let record = target.promoted(window);
        info!(id = %record.id, %outcome, "rotated current item");
        if self.stage_next {
            self.spawn_staging(now);
        }
        Ok(Convergence { record, outcome })
    }

    /// Instances that synthesized concurrently all promote the oldest record
    /// bound to the window, so they agree on one text.
    async fn settle_on_earliest(
        &self,
        window: DateTime<Utc>,
        stored: ItemRecord,
    ) -> (ItemRecord, RotationOutcome) {
        let earliest = self
            .bounded(
                "find_records_for_window",
                self.repo.find_records_for_window(window),
            )
            .await
            .ok()
            .and_then(|records| records.into_iter().next());
        match earliest {
            Some(record) if record.id != stored.id => (record, RotationOutcome::Adopted),
            _ => (stored, RotationOutcome::Synthesized),
        }
    }

    /// Unbinds records that racing instances bound to `window` but never
    /// kept current, leaving the window to the promoted record.
    async fn release_losers(&self, window: DateTime<Utc>) {
        let records = match self
            .bounded(
                "find_records_for_window",
                self.repo.find_records_for_window(window),
            )
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, window_start = %window, "could not list records to release");
                return;
            }
        };
        for record in records.iter().filter(|record| !record.is_current) {
            match self
                .bounded("release_window", self.repo.release_window(record.id))
                .await
            {
                Ok(true) => debug!(id = %record.id, "released record that lost its window"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, id = %record.id, "could not release record"),
            }
        }
    }

    fn spawn_staging(&self, now: DateTime<Utc>) {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = engine.stage(now).await {
                warn!(error = %e, "background staging failed");
            }
        });
        let mut tasks = self
            .staging_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    async fn stage(&self, now: DateTime<Utc>) -> Result<Staging, DomainError> {
        let key = self.window_clock.next_window_start(now);
        let engine = self.clone();
        let (result, _) = self
            .staging
            .run(key, move || async move { engine.ensure_next(now).await })
            .await;
        result
    }

    #[instrument(skip(self))]
    async fn ensure_next(&self, now: DateTime<Utc>) -> Result<Staging, DomainError> {
        if let Some(next) = self.find(ItemFlag::Next).await? {
            return Ok(Staging::AlreadyStaged(next));
        }

        let target_window = self.window_clock.next_window_start(now);
        let synthesis = self
            .synthesizer
            .synthesize(target_window, SynthesisPath::Advance)
            .await;
        let record = ItemRecord::staged(&synthesis.text, now)?;
        match self.bounded("insert", self.repo.insert(record)).await {
            Ok(stored) => {
                info!(id = %stored.id, next_window_start = %target_window, "staged next item");
                Ok(Staging::Staged(stored))
            }
            Err(DomainError::Conflict(reason)) => {
                debug!(%reason, "another instance staged first");
                self.find(ItemFlag::Next)
                    .await?
                    .map(Staging::AlreadyStaged)
                    .ok_or(DomainError::Conflict(reason))
            }
            Err(e) => Err(e),
        }
    }
}

fn unpersisted(target: &ItemRecord, window: DateTime<Utc>, cause: &DomainError) -> Convergence {
    error!(error = %cause, id = %target.id, window_start = %window, "rotation write failed; serving unpersisted item");
    Convergence {
        record: target.promoted(window),
        outcome: RotationOutcome::Unpersisted,
    }
}

/// Decides and maintains the current and next items.
pub struct RotationCoordinator {
    engine: Engine,
    pregenerate_lead: TimeDelta,
    last_known: Mutex<Option<CurrentView>>,
}

impl RotationCoordinator {
    /// Creates a coordinator over `repo`.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        repo: Arc<dyn ItemRepository>,
        generator: Arc<dyn CandidateGenerator>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        let synthesizer = Synthesizer::new(
            generator,
            Arc::clone(&repo),
            config.pool,
            rng,
            config.window_clock,
            config.call_timeout,
        );
        Self {
            engine: Engine {
                repo,
                clock,
                synthesizer: Arc::new(synthesizer),
                window_clock: config.window_clock,
                call_timeout: config.call_timeout,
                stage_next: config.stage_next,
                rotation: CoordinationToken::new(config.grace),
                staging: CoordinationToken::new(config.grace),
                staging_tasks: Arc::new(Mutex::new(Vec::new())),
            },
            pregenerate_lead: config.pregenerate_lead,
            last_known: Mutex::new(None),
        }
    }

    /// The window arithmetic in use.
    #[must_use]
    pub fn window_clock(&self) -> &WindowClock {
        &self.engine.window_clock
    }

    /// Returns the current item, rotating first if the stored one is stale.
    ///
    /// # Errors
    ///
    /// Returns `ReadFailure` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn get_current(&self) -> Result<CurrentView, ReadFailure> {
        let now = self.engine.clock.now();
        let convergence = self
            .engine
            .current_or_converge(now)
            .await
            .map_err(|source| self.read_failure(now, source))?;
        Ok(self.remember(&convergence.record, now))
    }

    /// Returns the current item and the staged next item.
    ///
    /// # Errors
    ///
    /// Returns `ReadFailure` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn get_current_and_next(&self) -> Result<CurrentAndNextView, ReadFailure> {
        let now = self.engine.clock.now();
        let convergence = self
            .engine
            .current_or_converge(now)
            .await
            .map_err(|source| self.read_failure(now, source))?;
        let current = self.remember(&convergence.record, now);
        let next = self
            .engine
            .find(ItemFlag::Next)
            .await
            .map_err(|source| self.read_failure(now, source))?;
        Ok(CurrentAndNextView {
            current,
            next: next.as_ref().map(NextView::from),
        })
    }

    /// Ensures a current item exists and, when staging is on, a next item.
    /// Safe to call any number of times.
    ///
    /// # Errors
    ///
    /// Returns `ReadFailure` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<CurrentAndNextView, ReadFailure> {
        let now = self.engine.clock.now();
        let convergence = self
            .engine
            .current_or_converge(now)
            .await
            .map_err(|source| self.read_failure(now, source))?;
        let current = self.remember(&convergence.record, now);
        let next = if self.engine.stage_next {
            match self.engine.stage(now).await {
                Ok(staging) => Some(NextView::from(staging.record())),
                Err(e) => {
                    warn!(error = %e, "could not stage next item");
                    None
                }
            }
        } else {
            None
        };
        Ok(CurrentAndNextView { current, next })
    }

    /// Runs the rotation step without a staleness pre-check. Within the
    /// pre-generation lead before a boundary it only stages the next item,
    /// so the handover at the boundary is warm.
    ///
    /// # Errors
    ///
    /// Returns `ReadFailure` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn force_rotate(&self) -> Result<RotateView, ReadFailure> {
        let now = self.engine.clock.now();
        let warm = self.engine.stage_next
            && self.engine.window_clock.time_until_next_window(now) <= self.pregenerate_lead;

        let result = if warm {
            self.engine.current_or_converge(now).await
        } else {
            self.engine.converge_once(now).await
        };
        let convergence = result.map_err(|source| self.read_failure(now, source))?;

        if warm {
            if let Err(e) = self.engine.stage(now).await {
                warn!(error = %e, "could not stage next item");
            }
        }
        let view = self.remember(&convergence.record, now);
        Ok(RotateView {
            text: view.text,
            window_start: view.window_start,
            outcome: convergence.outcome,
            warmed: warm,
        })
    }

    /// Stages the next item if the boundary is within the pre-generation
    /// lead.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the store cannot be read or written.
    #[instrument(skip(self))]
    pub async fn pre_generate(&self) -> Result<PreGenerateView, DomainError> {
        if !self.engine.stage_next {
            return Ok(PreGenerateView::Disabled);
        }
        let now = self.engine.clock.now();
        let until = self.engine.window_clock.time_until_next_window(now);
        if until > self.pregenerate_lead {
            return Ok(PreGenerateView::NotNeeded {
                minutes_until_boundary: until.num_minutes(),
            });
        }
        Ok(match self.engine.stage(now).await? {
            Staging::Staged(record) => PreGenerateView::Staged { text: record.text },
            Staging::AlreadyStaged(record) => PreGenerateView::AlreadyStaged { text: record.text },
        })
    }

    /// Past items, newest window first, one per window.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn list_history(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>, DomainError> {
        let limit = history_limit(limit);
        let records = self
            .engine
            .bounded("list_history", self.engine.repo.list_history(limit))
            .await?;
        Ok(history_entries(records))
    }

    /// Waits for background staging started by earlier rotations.
    pub async fn settle(&self) {
        loop {
            let tasks = std::mem::take(
                &mut *self
                    .engine
                    .staging_tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if tasks.is_empty() {
                return;
            }
            for result in join_all(tasks).await {
                if let Err(e) = result {
                    warn!(error = %e, "staging task did not complete");
                }
            }
        }
    }

    fn remember(&self, record: &ItemRecord, now: DateTime<Utc>) -> CurrentView {
        let view = CurrentView::of(record, &self.engine.window_clock, now);
        *self
            .last_known
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(view.clone());
        view
    }

    fn read_failure(&self, now: DateTime<Utc>, source: DomainError) -> ReadFailure {
        let last_known = self
            .last_known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let fallback = last_known.unwrap_or_else(|| {
            let window = self.engine.window_clock.current_window_start(now);
            CurrentView::from_text(
                self.engine.synthesizer.fallback_for_window(window),
                window,
                &self.engine.window_clock,
            )
        });
        error!(error = %source, fallback = %fallback.text, "store read failed; serving fallback");
        ReadFailure { fallback, source }
    }
}
