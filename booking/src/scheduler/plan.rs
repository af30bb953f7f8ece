//! Pure sweep decisions: which reminder is due and which reservations to close.

use crate::types::{Reservation, ReservationStatus, ReminderKey};
use chrono::{DateTime, Duration, Utc};

/// Reminder lead times, in minutes before start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderPlan {
    thresholds: Vec<u32>,
}

impl ReminderPlan {
    /// Build a plan; zero and duplicate thresholds are dropped.
    #[must_use]
    pub fn new(thresholds: impl IntoIterator<Item = u32>) -> Self {
        let mut thresholds: Vec<u32> = thresholds.into_iter().filter(|m| *m > 0).collect();
        thresholds.sort_unstable();
        thresholds.dedup();
        Self { thresholds }
    }

    /// Thresholds in ascending order
    #[must_use]
    pub fn thresholds(&self) -> &[u32] {
        &self.thresholds
    }

    /// How far ahead a sweep has to look.
    #[must_use]
    pub fn horizon(&self) -> Duration {
        self.thresholds
            .last()
            .map_or_else(Duration::zero, |m| Duration::minutes(i64::from(*m)))
    }

    /// Tightest threshold `T` with `0 < time_to_start <= T`.
    #[must_use]
    pub fn applicable(&self, time_to_start: Duration) -> Option<u32> {
        if time_to_start <= Duration::zero() {
            return None;
        }
        self.thresholds
            .iter()
            .copied()
            .find(|m| time_to_start <= Duration::minutes(i64::from(*m)))
    }

    /// Reminder the sweep should send for `reservation`, if any.
    ///
    /// `None` when the reservation is not confirmed, is outside every
    /// threshold, was already reminded for this or a tighter threshold, or
    /// has used up `max_rounds` dispatch rounds for the threshold.
    #[must_use]
    pub fn next_reminder(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
        max_rounds: u32,
    ) -> Option<ReminderKey> {
        if reservation.status != ReservationStatus::Confirmed {
            return None;
        }
        let minutes = self.applicable(reservation.time_to_start(now))?;
        if reservation.reminder_covered(minutes) {
            return None;
        }
        let key = ReminderKey::Threshold { minutes };
        (reservation.rounds(key) < max_rounds).then_some(key)
    }
}

/// Whether `key` was already delivered, directly or through a tighter reminder.
#[must_use]
pub fn already_reminded(reservation: &Reservation, key: ReminderKey) -> bool {
    match key {
        ReminderKey::Threshold { minutes } => reservation.reminder_covered(minutes),
        ReminderKey::Manual => reservation.attempts.iter().any(|attempt| {
            attempt.outcome.is_delivered()
                && matches!(attempt.key, ReminderKey::Manual | ReminderKey::Threshold { .. })
        }),
        ReminderKey::FollowUp => reservation.has_delivered(ReminderKey::FollowUp),
    }
}

/// Lifecycle action a sweep takes on a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Housekeeping {
    /// `confirmed → expired` and release the slot
    Expire,
    /// `pending → canceled` and release the slot
    CancelUnpaid,
}

impl Housekeeping {
    /// `(from, to)` edge this action applies
    #[must_use]
    pub const fn edge(self) -> (ReservationStatus, ReservationStatus) {
        match self {
            Self::Expire => (ReservationStatus::Confirmed, ReservationStatus::Expired),
            Self::CancelUnpaid => (ReservationStatus::Pending, ReservationStatus::Canceled),
        }
    }
}

/// Close out a reservation whose window ended or whose payment never came.
#[must_use]
pub fn housekeeping(
    reservation: &Reservation,
    now: DateTime<Utc>,
    payment_timeout: Duration,
) -> Option<Housekeeping> {
    let ended = reservation.end <= now;
    match reservation.status {
        ReservationStatus::Confirmed if ended => Some(Housekeeping::Expire),
        ReservationStatus::Pending if ended || reservation.created_at + payment_timeout <= now => {
            Some(Housekeeping::CancelUnpaid)
        }
        _ => None,
    }
}
