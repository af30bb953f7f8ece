//! Wiring of the in-memory booking system.
//!
//! [`Tablebook::in_memory`] assembles ledger, store, user directory,
//! dispatcher, scheduler, booking service and payment adapter over the
//! supplied transports and clock.

use crate::config::Config;
use crate::directory::InMemoryUserDirectory;
use crate::error::BookingError;
use crate::ledger::{InMemorySlotLedger, SlotLedger};
use crate::notify::NotificationDispatcher;
use crate::payment::PaymentAdapter;
use crate::scheduler::{ReminderScheduler, SchedulerEnvironment};
use crate::service::BookingService;
use crate::store::{InMemoryReservationStore, ReservationStore};
use crate::types::{Money, SlotSpec, Venue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tablebook_core::environment::Clock;
use tablebook_core::transport::{EmailTransport, PushTransport};
use tracing::info;

/// A fully wired booking system.
pub struct Tablebook {
    /// Reserve, check in, cancel
    pub bookings: BookingService,
    /// Payment provider callbacks
    pub payments: PaymentAdapter,
    /// Reminder and expiry sweeps
    pub scheduler: ReminderScheduler,
    /// Contact details for notifications
    pub users: Arc<InMemoryUserDirectory>,
    /// Slot availability
    pub ledger: Arc<dyn SlotLedger>,
    /// Reservation records
    pub store: Arc<dyn ReservationStore>,
}

impl Tablebook {
    /// Assemble the system over in-memory storage.
    ///
    /// The scheduler is created stopped; call
    /// [`ReminderScheduler::start`] to begin sweeping.
    #[must_use]
    pub fn in_memory(
        config: &Config,
        push: Arc<dyn PushTransport>,
        email: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger: Arc<dyn SlotLedger> = Arc::new(InMemorySlotLedger::new());
        let store: Arc<dyn ReservationStore> = Arc::new(InMemoryReservationStore::new(
            Arc::clone(&ledger),
            config.pricing.clone(),
            Arc::clone(&clock),
        ));
        let users = Arc::new(InMemoryUserDirectory::new());

        let scheduler = ReminderScheduler::new(
            SchedulerEnvironment {
                store: Arc::clone(&store),
                ledger: Arc::clone(&ledger),
                users: users.clone(),
                dispatcher: NotificationDispatcher::new(push, email, &config.notification),
                clock,
            },
            config.scheduler.clone(),
        );

        Self {
            bookings: BookingService::new(Arc::clone(&ledger), Arc::clone(&store))
                .with_scheduler(scheduler.clone()),
            payments: PaymentAdapter::new(Arc::clone(&store), Arc::clone(&ledger)),
            scheduler,
            users,
            ledger,
            store,
        }
    }
}

/// Venue definition accepted as JSON, e.g. from the `DEMO_VENUE` variable.
///
/// ```json
/// {"name": "Chez Rust", "base_price_cents": 2000,
///  "slots": [{"start": "2025-01-01T18:00:00Z", "end": "2025-01-01T19:00:00Z"}]}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueSeed {
    /// Display name
    pub name: String,
    /// Per-guest price in cents
    pub base_price_cents: u64,
    /// Bookable windows
    pub slots: Vec<SlotSpec>,
}

impl VenueSeed {
    /// Parse a seed from JSON.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the document does not match the schema.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Register the venue.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty or overlapping slots.
    pub async fn register(self, bookings: &BookingService) -> Result<Venue, BookingError> {
        let venue = bookings
            .register_venue(&self.name, Money::from_cents(self.base_price_cents), self.slots)
            .await?;
        info!(venue_id = %venue.id, slots = venue.slots.len(), "Demo venue seeded");
        Ok(venue)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::notify::{ConsoleEmailTransport, ConsolePushTransport};
    use tablebook_testing::test_clock;

    fn system() -> Tablebook {
        Tablebook::in_memory(
            &Config::default(),
            Arc::new(ConsolePushTransport::new()),
            Arc::new(ConsoleEmailTransport::new()),
            Arc::new(test_clock()),
        )
    }

    #[tokio::test]
    async fn test_seed_registers_venue() {
        let seed = VenueSeed::from_json(
            r#"{"name": "Chez Rust", "base_price_cents": 2000,
                "slots": [{"start": "2025-01-01T19:00:00Z", "end": "2025-01-01T20:00:00Z"},
                          {"start": "2025-01-01T18:00:00Z", "end": "2025-01-01T19:00:00Z"}]}"#,
        )
        .unwrap();

        let tablebook = system();
        let venue = seed.register(&tablebook.bookings).await.unwrap();
        assert_eq!(venue.slots.len(), 2);
        assert!(venue.slots[0].start < venue.slots[1].start);
        assert_eq!(
            tablebook.ledger.venue(venue.id).await.unwrap().base_price,
            Money::from_dollars(20)
        );
    }

    #[tokio::test]
    async fn test_overlapping_seed_is_rejected() {
        let seed = VenueSeed::from_json(
            r#"{"name": "Tight", "base_price_cents": 2000,
                "slots": [{"start": "2025-01-01T18:00:00Z", "end": "2025-01-01T19:00:00Z"},
                          {"start": "2025-01-01T18:30:00Z", "end": "2025-01-01T19:30:00Z"}]}"#,
        )
        .unwrap();

        let error = seed.register(&system().bookings).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(VenueSeed::from_json("{}").is_err());
    }
}
