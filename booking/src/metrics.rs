//! Business metrics for tablebook.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `tablebook_reservations_total{status}` - Reservations entering each status
//! - `tablebook_slot_conflicts_total` - Reserve calls that lost the slot race
//! - `tablebook_reminders_total{outcome}` - Reminder dispatch rounds by outcome
//! - `tablebook_reminder_retries_total` - Retries scheduled after a failed round
//! - `tablebook_sweeps_total` - Completed sweeps
//!
//! ## Gauges
//! - `tablebook_active_retry_timers` - Pending retry timers

use crate::types::ReservationStatus;
use metrics::{describe_counter, describe_gauge};

/// Gauge tracking pending retry timers.
pub const ACTIVE_RETRY_TIMERS: &str = "tablebook_active_retry_timers";

/// Initialize and register all booking metric descriptions.
///
/// Call once at startup, before any metric is recorded.
pub fn register_booking_metrics() {
    describe_counter!(
        "tablebook_reservations_total",
        "Reservations entering each status (pending, confirmed, arrived, expired, canceled)"
    );
    describe_counter!(
        "tablebook_slot_conflicts_total",
        "Reserve attempts rejected because the slot was already taken"
    );
    describe_counter!(
        "tablebook_reminders_total",
        "Reminder dispatch rounds by outcome (delivered, failed, exhausted)"
    );
    describe_counter!(
        "tablebook_reminder_retries_total",
        "Reminder retries scheduled after a failed dispatch round"
    );
    describe_counter!("tablebook_sweeps_total", "Completed scheduler sweeps");
    describe_gauge!(ACTIVE_RETRY_TIMERS, "Pending reminder retry timers");

    tracing::info!("Booking metrics registered");
}

/// Record a reservation entering `status`.
pub fn record_status(status: ReservationStatus) {
    metrics::counter!("tablebook_reservations_total", "status" => status.as_str()).increment(1);
}

/// Record a lost slot race.
pub fn record_slot_conflict() {
    metrics::counter!("tablebook_slot_conflicts_total").increment(1);
}

/// Record a reminder round outcome (`delivered`, `failed`, `exhausted`).
pub fn record_reminder(outcome: &'static str) {
    metrics::counter!("tablebook_reminders_total", "outcome" => outcome).increment(1);
}

/// Record a scheduled retry.
pub fn record_retry_scheduled() {
    metrics::counter!("tablebook_reminder_retries_total").increment(1);
}

/// Record a completed sweep.
pub fn record_sweep() {
    metrics::counter!("tablebook_sweeps_total").increment(1);
}
