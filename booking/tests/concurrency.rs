//! Races between bookers and between overlapping sweeps.

#![allow(clippy::unwrap_used)]

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{World, at};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tablebook::config::{Config, NotificationConfig, PricingConfig};
use tablebook::directory::InMemoryUserDirectory;
use tablebook::ledger::{InMemorySlotLedger, SlotLedger};
use tablebook::notify::NotificationDispatcher;
use tablebook::payment::PaymentEvents;
use tablebook::scheduler::{ReminderScheduler, SchedulerEnvironment};
use tablebook::store::{InMemoryReservationStore, ReservationStore};
use tablebook::types::{
    HoldToken, Money, ReservationStatus, Slot, SlotHandle, SlotId, SlotSpec, TableType, User,
    Venue, VenueId, VenueInfo,
};
use tablebook::{ErrorKind, LedgerError};
use tablebook_testing::{ScriptedEmailTransport, ScriptedPushTransport, test_clock};

/// Ledger that counts hold releases that actually freed a slot.
struct CountingLedger {
    inner: InMemorySlotLedger,
    released: AtomicUsize,
}

#[async_trait]
impl SlotLedger for CountingLedger {
    async fn register_venue(
        &self,
        name: &str,
        base_price: Money,
        slots: Vec<SlotSpec>,
    ) -> Result<Venue, LedgerError> {
        self.inner.register_venue(name, base_price, slots).await
    }

    async fn update_slots(
        &self,
        venue_id: VenueId,
        slots: Vec<SlotSpec>,
    ) -> Result<Venue, LedgerError> {
        self.inner.update_slots(venue_id, slots).await
    }

    async fn venue(&self, venue_id: VenueId) -> Result<VenueInfo, LedgerError> {
        self.inner.venue(venue_id).await
    }

    async fn reserve(
        &self,
        venue_id: VenueId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SlotHandle, LedgerError> {
        self.inner.reserve(venue_id, start, end).await
    }

    async fn release(&self, venue_id: VenueId, slot_id: SlotId) -> Result<(), LedgerError> {
        self.inner.release(venue_id, slot_id).await
    }

    async fn release_hold(
        &self,
        venue_id: VenueId,
        slot_id: SlotId,
        hold: HoldToken,
    ) -> Result<bool, LedgerError> {
        let released = self.inner.release_hold(venue_id, slot_id, hold).await?;
        if released {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
        Ok(released)
    }

    async fn holds(&self, handle: &SlotHandle) -> Result<bool, LedgerError> {
        self.inner.holds(handle).await
    }

    async fn availability(&self, venue_id: VenueId) -> Result<Vec<Slot>, LedgerError> {
        self.inner.availability(venue_id).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookers_get_one_slot() {
    let world = World::new(
        ScriptedPushTransport::succeeding(),
        ScriptedEmailTransport::succeeding(),
    );
    let venue = world.morning_venue().await;

    let mut tasks = Vec::new();
    for n in 0..16 {
        let user = world
            .user(User::new(format!("guest{n}@example.com"), format!("Guest {n}")))
            .await;
        let bookings = world.tablebook.bookings.clone();
        tasks.push(tokio::spawn(async move {
            bookings
                .reserve(user.id, venue.id, at(10, 0), at(11, 0), 2, TableType::Regular)
                .await
        }));
    }

    let mut won = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(won, 1);
    assert!(!world.tablebook.bookings.availability(venue.id).await.unwrap()[0].available);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_sweeps_release_slot_once() {
    let clock = test_clock();
    let ledger = Arc::new(CountingLedger {
        inner: InMemorySlotLedger::new(),
        released: AtomicUsize::new(0),
    });
    let store = Arc::new(InMemoryReservationStore::new(
        ledger.clone(),
        PricingConfig::default(),
        Arc::new(clock.clone()),
    ));
    let users = Arc::new(InMemoryUserDirectory::new());
    let user = User::new("guest@example.com", "Guest");
    users.upsert(user.clone()).await;

    let venue = ledger
        .register_venue(
            "Chez Rust",
            Money::from_dollars(20),
            vec![SlotSpec::new(at(10, 0), at(11, 0))],
        )
        .await
        .unwrap();
    let handle = ledger.reserve(venue.id, at(10, 0), at(11, 0)).await.unwrap();
    let created = store
        .create(user.id, &handle, 2, TableType::Regular)
        .await
        .unwrap();
    store
        .transition(created.id, ReservationStatus::Pending, ReservationStatus::Confirmed)
        .await
        .unwrap();

    let scheduler = ReminderScheduler::new(
        SchedulerEnvironment {
            store: store.clone(),
            ledger: ledger.clone(),
            users,
            dispatcher: NotificationDispatcher::new(
                Arc::new(ScriptedPushTransport::succeeding()),
                Arc::new(ScriptedEmailTransport::succeeding()),
                &NotificationConfig::default(),
            ),
            clock: Arc::new(clock.clone()),
        },
        Config::default().scheduler,
    );

    clock.set(at(11, 0));
    let sweeps: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.sweep().await })
        })
        .collect();

    let mut expired = 0;
    for sweep in sweeps {
        let report = sweep.await.unwrap();
        assert_eq!(report.errors, 0);
        expired += report.expired;
    }

    assert_eq!(expired, 1);
    assert_eq!(ledger.released.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.get(created.id).await.unwrap().status,
        ReservationStatus::Expired
    );
}

#[tokio::test]
async fn test_cancel_frees_slot_for_next_booker() {
    let world = World::new(
        ScriptedPushTransport::succeeding(),
        ScriptedEmailTransport::succeeding(),
    );
    let venue = world.morning_venue().await;
    let alice = world.user(User::new("alice@example.com", "Alice")).await;
    let bob = world.user(User::new("bob@example.com", "Bob")).await;
    let bookings = &world.tablebook.bookings;

    let first = bookings
        .reserve(alice.id, venue.id, at(10, 0), at(11, 0), 2, TableType::Outdoor)
        .await
        .unwrap();
    world
        .tablebook
        .payments
        .on_payment_confirmed(first.id)
        .await
        .unwrap();

    let taken = bookings
        .reserve(bob.id, venue.id, at(10, 0), at(11, 0), 2, TableType::Regular)
        .await
        .unwrap_err();
    assert_eq!(taken.kind(), ErrorKind::Conflict);

    let canceled = bookings.cancel(first.id).await.unwrap();
    assert_eq!(canceled.status, ReservationStatus::Canceled);

    let second = bookings
        .reserve(bob.id, venue.id, at(10, 0), at(11, 0), 2, TableType::Regular)
        .await
        .unwrap();
    assert_eq!(second.slot_id, first.slot_id);

    // Canceling twice is a rejected transition and leaves Bob's hold alone.
    let again = bookings.cancel(first.id).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidTransition);
    assert!(!bookings.availability(venue.id).await.unwrap()[0].available);
}
