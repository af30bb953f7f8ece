//! Reminder scheduler.
//!
//! A [`ReminderScheduler`] owns one periodic sweep task and a registry of
//! per-reservation retry timers. Each sweep:
//!
//! 1. walks the confirmed reservations starting within the reminder horizon
//!    and dispatches the tightest applicable reminder that has not been
//!    delivered yet,
//! 2. expires confirmed reservations whose window ended and cancels pending
//!    ones whose window ended or whose payment window elapsed, releasing
//!    their slots.
//!
//! A failed dispatch schedules a one-shot retry timer for that reservation;
//! the chain stops on success, on exhaustion, once the reservation is no
//! longer confirmed or has started, and on [`ReminderScheduler::stop`].
//!
//! Sweep, retry and manual dispatch for the same reservation and reminder
//! are serialized by an in-flight claim, and every dispatch re-reads the
//! attempt log first, so no path repeats a reminder another path delivered.

pub mod plan;

use crate::config::SchedulerConfig;
use crate::directory::UserDirectory;
use crate::error::{BookingError, ErrorKind, StoreError};
use crate::ledger::SlotLedger;
use crate::metrics::{self, ACTIVE_RETRY_TIMERS};
use crate::notify::{DispatchReport, NotificationDispatcher};
use crate::store::ReservationStore;
use crate::types::{Reservation, ReservationId, ReservationStatus, ReminderKey, User};
use futures::StreamExt;
use futures::future::BoxFuture;
use plan::{Housekeeping, ReminderPlan};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tablebook_core::environment::Clock;
use tablebook_runtime::{RetryPolicy, TimerRegistry};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

/// Collaborators the scheduler drives.
#[derive(Clone)]
pub struct SchedulerEnvironment {
    /// Reservation records and status transitions
    pub store: Arc<dyn ReservationStore>,
    /// Slot availability
    pub ledger: Arc<dyn SlotLedger>,
    /// Contact details
    pub users: Arc<dyn UserDirectory>,
    /// Push and email delivery
    pub dispatcher: NotificationDispatcher,
    /// Wall clock
    pub clock: Arc<dyn Clock>,
}

/// What happened to one reminder dispatch request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderOutcome {
    /// At least one channel delivered
    Delivered {
        /// Reminder sent
        key: ReminderKey,
        /// Dispatch round
        round: u32,
    },
    /// Every channel failed
    Failed {
        /// Reminder attempted
        key: ReminderKey,
        /// Dispatch round
        round: u32,
    },
    /// Already delivered by an earlier dispatch
    AlreadyDelivered,
    /// Another dispatch for the same reminder is running
    InFlight,
    /// Reservation is not confirmed or has already started
    NotApplicable,
    /// Every allowed round failed
    Exhausted,
}

/// Counters for one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Reservations inside the reminder horizon
    pub due: usize,
    /// Reminders delivered
    pub delivered: usize,
    /// Reminder rounds that failed on every channel
    pub failed: usize,
    /// Due reservations needing no dispatch this sweep
    pub skipped: usize,
    /// Confirmed reservations expired
    pub expired: usize,
    /// Pending reservations canceled
    pub canceled: usize,
    /// Reservations whose processing hit a storage error
    pub errors: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Sweep,
    Retry,
    Manual,
}

type ClaimSet = Mutex<HashSet<(ReservationId, ReminderKey)>>;

/// Exclusive right to dispatch one reminder; released on drop.
struct Claim<'a> {
    set: &'a ClaimSet,
    key: (ReservationId, ReminderKey),
}

impl<'a> Claim<'a> {
    fn acquire(set: &'a ClaimSet, id: ReservationId, key: ReminderKey) -> Option<Self> {
        let claimed = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((id, key));
        claimed.then_some(Self { set, key: (id, key) })
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

struct Inner {
    env: SchedulerEnvironment,
    config: SchedulerConfig,
    plan: ReminderPlan,
    policy: RetryPolicy,
    retries: TimerRegistry<ReservationId>,
    in_flight: ClaimSet,
    shutdown: CancellationToken,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    follow_ups: TaskTracker,
}

/// Periodic reminder and expiry scheduler.
///
/// Cheap to clone; clones share the same sweep task and timers.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

impl ReminderScheduler {
    /// Create a stopped scheduler.
    #[must_use]
    pub fn new(env: SchedulerEnvironment, config: SchedulerConfig) -> Self {
        let plan = ReminderPlan::new(config.reminder_thresholds.iter().copied());
        let policy = config.retry_policy();
        Self {
            inner: Arc::new(Inner {
                env,
                plan,
                policy,
                config,
                retries: TimerRegistry::new(ACTIVE_RETRY_TIMERS),
                in_flight: Mutex::new(HashSet::new()),
                shutdown: CancellationToken::new(),
                sweep_task: Mutex::new(None),
                follow_ups: TaskTracker::new(),
            }),
        }
    }

    /// Spawn the periodic sweep. The first sweep runs immediately.
    ///
    /// Returns `false` if the sweep is already running or the scheduler was
    /// stopped.
    pub fn start(&self) -> bool {
        let mut task = self
            .inner
            .sweep_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.is_some() || self.inner.shutdown.is_cancelled() {
            return false;
        }

        let inner = Arc::clone(&self.inner);
        let period = self.inner.config.sweep_interval();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                sweep(&inner).await;
            }
            debug!("Sweep loop exited");
        }));

        info!(interval_secs = period.as_secs(), "Reminder scheduler started");
        true
    }

    /// Whether the periodic sweep is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inner.shutdown.is_cancelled()
            && self
                .inner
                .sweep_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }

    /// Stop the sweep, cancel every retry timer and wait for follow-ups.
    ///
    /// Each stage gets the configured shutdown timeout.
    pub async fn stop(&self) {
        let timeout = self.inner.config.shutdown_timeout();
        self.inner.shutdown.cancel();

        let task = self
            .inner
            .sweep_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = task {
            let abort = handle.abort_handle();
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => debug!("Sweep task stopped"),
                Ok(Err(e)) => warn!(error = %e, "Sweep task failed"),
                Err(_) => {
                    warn!("Sweep shutdown timed out, aborting");
                    abort.abort();
                }
            }
        }

        let canceled = self.inner.retries.shutdown(timeout).await;

        self.inner.follow_ups.close();
        if tokio::time::timeout(timeout, self.inner.follow_ups.wait())
            .await
            .is_err()
        {
            warn!(
                outstanding = self.inner.follow_ups.len(),
                "Follow-up messages still running at shutdown"
            );
        }

        info!(retry_timers_canceled = canceled, "Reminder scheduler stopped");
    }

    /// Run one sweep now.
    pub async fn sweep(&self) -> SweepReport {
        sweep(&self.inner).await
    }

    /// Operator-forced reminder for one reservation.
    ///
    /// Uses the tightest applicable threshold as the idempotence key, or
    /// [`ReminderKey::Manual`] outside every threshold. Never repeats a
    /// delivered reminder; ignores the retry budget and schedules no retry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown reservation.
    #[instrument(skip(self))]
    pub async fn trigger(&self, id: ReservationId) -> Result<ReminderOutcome, StoreError> {
        let reservation = self.inner.env.store.get(id).await?;
        let now = self.inner.env.clock.now();
        let key = self
            .inner
            .plan
            .applicable(reservation.time_to_start(now))
            .map_or(ReminderKey::Manual, |minutes| ReminderKey::Threshold { minutes });
        deliver(&self.inner, id, key, Origin::Manual).await
    }

    /// Whether a retry timer is pending for `id`.
    #[must_use]
    pub fn has_pending_retry(&self, id: ReservationId) -> bool {
        self.inner.retries.is_scheduled(&id)
    }

    /// Drop the pending retry of a reservation closed outside the sweep.
    ///
    /// Returns `true` if a retry timer was pending.
    pub fn forget(&self, id: ReservationId) -> bool {
        let canceled = self.inner.retries.cancel(&id);
        if canceled {
            debug!(reservation_id = %id, "Reminder retry canceled");
        }
        canceled
    }

    /// Number of pending retry timers.
    #[must_use]
    pub fn pending_retries(&self) -> usize {
        self.inner.retries.len()
    }
}

#[instrument(skip_all)]
async fn sweep(inner: &Arc<Inner>) -> SweepReport {
    let now = inner.env.clock.now();
    let mut report = SweepReport::default();

    let mut due = inner.env.store.find_due(now, inner.plan.horizon());
    while let Some(reservation) = due.next().await {
        report.due += 1;
        let Some(key) = inner
            .plan
            .next_reminder(&reservation, now, inner.policy.max_attempts)
        else {
            report.skipped += 1;
            continue;
        };
        if inner.retries.is_scheduled(&reservation.id) {
            report.skipped += 1;
            continue;
        }

        match deliver(inner, reservation.id, key, Origin::Sweep).await {
            Ok(ReminderOutcome::Delivered { .. }) => report.delivered += 1,
            Ok(ReminderOutcome::Failed { .. }) => report.failed += 1,
            Ok(_) => report.skipped += 1,
            Err(e) => {
                warn!(reservation_id = %reservation.id, error = %e, "Reminder dispatch aborted");
                report.errors += 1;
            }
        }
    }
    drop(due);

    let payment_timeout = inner.config.payment_timeout();
    let mut seen = HashSet::new();
    let ended = inner.env.store.find_ended(now).await;
    let stale = inner.env.store.find_stale_pending(now - payment_timeout).await;

    for reservation in ended.into_iter().chain(stale) {
        if !seen.insert(reservation.id) {
            continue;
        }
        let Some(action) = plan::housekeeping(&reservation, now, payment_timeout) else {
            continue;
        };
        match close(inner, &reservation, action).await {
            Ok(true) => match action {
                Housekeeping::Expire => report.expired += 1,
                Housekeeping::CancelUnpaid => report.canceled += 1,
            },
            Ok(false) => {}
            Err(e) => {
                warn!(reservation_id = %reservation.id, ?action, error = %e, "Housekeeping failed");
                report.errors += 1;
            }
        }
    }

    metrics::record_sweep();
    info!(
        due = report.due,
        delivered = report.delivered,
        failed = report.failed,
        expired = report.expired,
        canceled = report.canceled,
        errors = report.errors,
        "Sweep complete"
    );
    report
}

/// Apply a housekeeping transition and release the slot.
///
/// `Ok(false)` when another caller already moved the reservation.
async fn close(
    inner: &Inner,
    reservation: &Reservation,
    action: Housekeeping,
) -> Result<bool, BookingError> {
    let (from, to) = action.edge();
    match inner.env.store.transition(reservation.id, from, to).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::InvalidTransition => {
            debug!(reservation_id = %reservation.id, %from, %to, "Already moved, skipping");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    }

    inner.retries.cancel(&reservation.id);
    inner
        .env
        .ledger
        .release_hold(reservation.venue_id, reservation.slot_id, reservation.hold)
        .await?;
    Ok(true)
}

/// Dispatch `key` for `id` unless another path already did or is doing it.
async fn deliver(
    inner: &Arc<Inner>,
    id: ReservationId,
    key: ReminderKey,
    origin: Origin,
) -> Result<ReminderOutcome, StoreError> {
    let Some(claim) = Claim::acquire(&inner.in_flight, id, key) else {
        debug!(reservation_id = %id, %key, "Reminder already in flight");
        return Ok(ReminderOutcome::InFlight);
    };

    let reservation = inner.env.store.get(id).await?;
    let now = inner.env.clock.now();

    if reservation.status != ReservationStatus::Confirmed || reservation.start <= now {
        debug!(reservation_id = %id, status = %reservation.status, "Reminder no longer applicable");
        return Ok(ReminderOutcome::NotApplicable);
    }
    if plan::already_reminded(&reservation, key) {
        return Ok(ReminderOutcome::AlreadyDelivered);
    }
    let rounds = reservation.rounds(key);
    if origin != Origin::Manual && !inner.policy.allows_another(rounds) {
        return Ok(ReminderOutcome::Exhausted);
    }

    let venue_name = inner
        .env
        .ledger
        .venue(reservation.venue_id)
        .await
        .map_or_else(|_| "your venue".to_string(), |venue| venue.name);
    let user = inner.env.users.user(reservation.user_id).await;
    let report = match &user {
        Some(user) => {
            inner
                .env
                .dispatcher
                .remind(&reservation, user, &venue_name, now)
                .await
        }
        None => {
            warn!(reservation_id = %id, user_id = %reservation.user_id, "Unknown user");
            DispatchReport::undeliverable("unknown user")
        }
    };

    let round = rounds + 1;
    let delivered = report.delivered();
    let failure = report.first_error().map(ErrorKind::of_transport);
    inner
        .env
        .store
        .record_attempts(id, report.into_attempts(now, key, round))
        .await?;
    drop(claim);

    if delivered {
        info!(reservation_id = %id, %key, round, ?origin, "Reminder delivered");
        metrics::record_reminder("delivered");
        if origin != Origin::Retry {
            inner.retries.cancel(&id);
        }
        if let Some(user) = user {
            spawn_follow_up(inner, id, user, venue_name);
        }
        return Ok(ReminderOutcome::Delivered { key, round });
    }

    warn!(reservation_id = %id, %key, round, ?origin, kind = ?failure, "Reminder failed on every channel");
    metrics::record_reminder("failed");
    if origin != Origin::Manual {
        schedule_retry(inner, id, key, round);
    }
    Ok(ReminderOutcome::Failed { key, round })
}

fn schedule_retry(inner: &Arc<Inner>, id: ReservationId, key: ReminderKey, round: u32) {
    let Some(delay) = inner.policy.next_delay(round) else {
        error!(reservation_id = %id, %key, attempts = round, "Reminder retries exhausted");
        metrics::record_reminder("exhausted");
        return;
    };

    if inner
        .retries
        .schedule(id, delay, retry(Arc::clone(inner), id, key))
    {
        metrics::record_retry_scheduled();
        debug!(reservation_id = %id, %key, delay_secs = delay.as_secs(), "Reminder retry scheduled");
    }
}

// Boxed so the retry future's type does not contain itself.
fn retry(inner: Arc<Inner>, id: ReservationId, key: ReminderKey) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = deliver(&inner, id, key, Origin::Retry).await {
            warn!(reservation_id = %id, error = %e, "Reminder retry aborted");
        }
    })
}

fn spawn_follow_up(inner: &Arc<Inner>, id: ReservationId, user: User, venue_name: String) {
    let task_inner = Arc::clone(inner);
    inner.follow_ups.spawn(async move {
        let inner = task_inner;
        let Some(_claim) = Claim::acquire(&inner.in_flight, id, ReminderKey::FollowUp) else {
            return;
        };
        let reservation = match inner.env.store.get(id).await {
            Ok(reservation) => reservation,
            Err(e) => {
                warn!(reservation_id = %id, error = %e, "Follow-up skipped");
                return;
            }
        };
        if reservation.has_delivered(ReminderKey::FollowUp) {
            return;
        }

        let report = inner
            .env
            .dispatcher
            .follow_up(&reservation, &user, &venue_name)
            .await;
        let round = reservation.rounds(ReminderKey::FollowUp) + 1;
        let now = inner.env.clock.now();
        if let Err(e) = inner
            .env
            .store
            .record_attempts(id, report.into_attempts(now, ReminderKey::FollowUp, round))
            .await
        {
            warn!(reservation_id = %id, error = %e, "Follow-up not recorded");
        }
    });
}
