//! Reminder dispatch, retry and idempotence.

#![allow(clippy::unwrap_used)]

mod common;

use common::{World, at};
use std::time::Duration;
use tablebook::config::Config;
use tablebook::notify::DeliveryMode;
use tablebook::payment::PaymentEvents;
use tablebook::types::{
    AttemptOutcome, Channel, Reservation, ReservationStatus, ReminderKey, TableType, User,
};
use tablebook::{ReminderOutcome, SweepReport};
use tablebook_core::transport::TransportError;
use tablebook_testing::{ScriptedEmailTransport, ScriptedPushTransport};

async fn confirmed(world: &World, user: User) -> Reservation {
    let venue = world.morning_venue().await;
    let user = world.user(user).await;
    let reservation = world
        .tablebook
        .bookings
        .reserve(user.id, venue.id, at(10, 0), at(11, 0), 2, TableType::Regular)
        .await
        .unwrap();
    world
        .tablebook
        .payments
        .on_payment_confirmed(reservation.id)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_three_failures_five_minutes_apart_then_stop() {
    let world = World::new(
        ScriptedPushTransport::succeeding(),
        ScriptedEmailTransport::failing(),
    );
    let reservation = confirmed(&world, User::new("guest@example.com", "Guest")).await;
    let scheduler = &world.tablebook.scheduler;

    world.clock.set(at(9, 31));
    assert_eq!(scheduler.sweep().await.failed, 1);
    assert!(scheduler.has_pending_retry(reservation.id));

    tokio::time::sleep(Duration::from_secs(301)).await;
    tokio::time::sleep(Duration::from_secs(300)).await;
    tokio::time::sleep(Duration::from_secs(3600)).await;

    let sent = world.email.sent();
    assert_eq!(sent.len(), 3);
    for pair in sent.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= Duration::from_secs(300) && gap < Duration::from_secs(301));
    }
    assert_eq!(scheduler.pending_retries(), 0);

    let stored = world.tablebook.bookings.reservation(reservation.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Confirmed);
    assert_eq!(stored.attempts.len(), 3);
    assert!(stored
        .attempts
        .iter()
        .all(|a| matches!(a.outcome, AttemptOutcome::Failed { .. })));
    assert_eq!(
        stored.failed_rounds(ReminderKey::Threshold { minutes: 30 }),
        3
    );

    // Exhausted reminders are not restarted by later sweeps.
    let report = scheduler.sweep().await;
    assert_eq!(report.skipped, 1);
    assert_eq!(world.email.calls(), 3);
}

#[tokio::test]
async fn test_back_to_back_sweeps_send_one_reminder() {
    let world = World::new(
        ScriptedPushTransport::succeeding(),
        ScriptedEmailTransport::succeeding(),
    );
    let reservation = confirmed(&world, User::new("guest@example.com", "Guest")).await;

    world.clock.set(at(9, 40));
    let first = world.tablebook.scheduler.sweep().await;
    let second = world.tablebook.scheduler.sweep().await;

    assert_eq!(first.delivered, 1);
    assert_eq!(
        second,
        SweepReport {
            due: 1,
            skipped: 1,
            ..SweepReport::default()
        }
    );

    let stored = world.tablebook.bookings.reservation(reservation.id).await.unwrap();
    let reminders = stored
        .attempts
        .iter()
        .filter(|a| a.key == ReminderKey::Threshold { minutes: 30 })
        .count();
    assert_eq!(reminders, 1);
}

#[tokio::test]
async fn test_push_failure_falls_back_to_email() {
    let mut config = Config::default();
    config.notification.delivery_mode = DeliveryMode::Fallback;
    let push = ScriptedPushTransport::failing();
    let world = World::with_config(push, ScriptedEmailTransport::succeeding(), &config);
    let reservation = confirmed(
        &world,
        User::new("guest@example.com", "Guest").with_device_token("device"),
    )
    .await;

    world.clock.set(at(9, 50));
    assert_eq!(world.tablebook.scheduler.sweep().await.delivered, 1);

    let stored = world.tablebook.bookings.reservation(reservation.id).await.unwrap();
    let channels: Vec<_> = stored
        .attempts
        .iter()
        .filter(|a| a.key == ReminderKey::Threshold { minutes: 30 })
        .map(|a| (a.channel, a.outcome.is_delivered()))
        .collect();
    assert_eq!(channels, vec![(Channel::Push, false), (Channel::Email, true)]);
}

#[tokio::test(start_paused = true)]
async fn test_manual_trigger_preempts_pending_retry() {
    let email = ScriptedEmailTransport::succeeding();
    email.then(Err(TransportError::Unreachable("smtp down".to_string())));
    let world = World::new(ScriptedPushTransport::succeeding(), email);
    let reservation = confirmed(&world, User::new("guest@example.com", "Guest")).await;
    let scheduler = &world.tablebook.scheduler;

    world.clock.set(at(9, 45));
    assert_eq!(scheduler.sweep().await.failed, 1);
    assert!(scheduler.has_pending_retry(reservation.id));

    let outcome = scheduler.trigger(reservation.id).await.unwrap();
    assert_eq!(
        outcome,
        ReminderOutcome::Delivered {
            key: ReminderKey::Threshold { minutes: 30 },
            round: 2
        }
    );
    assert!(!scheduler.has_pending_retry(reservation.id));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(world.email.sent_with_subject("Reservation Reminder").len(), 2);
}

#[tokio::test]
async fn test_unknown_reservation_trigger_is_not_found() {
    let world = World::new(
        ScriptedPushTransport::succeeding(),
        ScriptedEmailTransport::succeeding(),
    );
    let error = world
        .tablebook
        .scheduler
        .trigger(tablebook::types::ReservationId::new())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), tablebook::ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_drops_pending_retry() {
    let world = World::new(
        ScriptedPushTransport::succeeding(),
        ScriptedEmailTransport::failing(),
    );
    let reservation = confirmed(&world, User::new("guest@example.com", "Guest")).await;
    let scheduler = &world.tablebook.scheduler;

    world.clock.set(at(9, 31));
    assert_eq!(scheduler.sweep().await.failed, 1);
    assert!(scheduler.has_pending_retry(reservation.id));

    world.tablebook.bookings.cancel(reservation.id).await.unwrap();
    assert!(!scheduler.has_pending_retry(reservation.id));

    tokio::time::sleep(Duration::from_secs(900)).await;
    assert_eq!(world.email.calls(), 1);
    assert_eq!(scheduler.pending_retries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_grows_with_multiplier() {
    let mut config = Config::default();
    config.scheduler.retry_multiplier = 2.0;
    let world = World::with_config(
        ScriptedPushTransport::succeeding(),
        ScriptedEmailTransport::failing(),
        &config,
    );
    confirmed(&world, User::new("guest@example.com", "Guest")).await;

    world.clock.set(at(9, 31));
    world.tablebook.scheduler.sweep().await;
    tokio::time::sleep(Duration::from_secs(3600)).await;

    let sent = world.email.sent();
    assert_eq!(sent.len(), 3);
    let first = sent[1].at - sent[0].at;
    let second = sent[2].at - sent[1].at;
    assert!(first >= Duration::from_secs(300) && first < Duration::from_secs(301));
    assert!(second >= Duration::from_secs(600) && second < Duration::from_secs(601));
}
