//! Booking facade: reserve, check in and cancel.
//!
//! Reserving is a two-step saga. The ledger hold is taken first, then the
//! reservation record is created; if creation fails the hold is released so
//! the slot does not leak.

use crate::error::{BookingError, StoreError};
use crate::ledger::SlotLedger;
use crate::scheduler::ReminderScheduler;
use crate::store::ReservationStore;
use crate::types::{
    Money, Reservation, ReservationId, ReservationStatus, Slot, SlotSpec, TableType, UserId, Venue,
    VenueId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Entry point for user-facing booking operations.
#[derive(Clone)]
pub struct BookingService {
    ledger: Arc<dyn SlotLedger>,
    store: Arc<dyn ReservationStore>,
    scheduler: Option<ReminderScheduler>,
}

impl BookingService {
    /// Create a service over a ledger and store.
    #[must_use]
    pub fn new(ledger: Arc<dyn SlotLedger>, store: Arc<dyn ReservationStore>) -> Self {
        Self {
            ledger,
            store,
            scheduler: None,
        }
    }

    /// Drop pending reminder retries of reservations this service closes.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: ReminderScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Register a venue with its bookable slots.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any slot is empty or overlaps another.
    pub async fn register_venue(
        &self,
        name: &str,
        base_price: Money,
        slots: Vec<SlotSpec>,
    ) -> Result<Venue, BookingError> {
        Ok(self.ledger.register_venue(name, base_price, slots).await?)
    }

    /// Replace a venue's slots. Held slots must keep their exact window.
    ///
    /// # Errors
    ///
    /// - `Ledger(NoSuchVenue)`: unknown venue
    /// - `Ledger(Validation)`: a slot is empty or overlaps another
    /// - `Ledger(SlotInUse)`: a held slot would be dropped or moved
    pub async fn update_slots(
        &self,
        venue_id: VenueId,
        slots: Vec<SlotSpec>,
    ) -> Result<Venue, BookingError> {
        Ok(self.ledger.update_slots(venue_id, slots).await?)
    }

    /// Hold the slot `[start, end)` and create a pending reservation.
    ///
    /// # Errors
    ///
    /// - `Store(InvalidWindow)`: `start >= end`
    /// - `Ledger(NoSuchVenue | SlotNotFound)`: unknown venue or window
    /// - `Ledger(SlotAlreadyTaken)`: someone else holds the slot
    /// - `Store(InvalidGuestCount)`: party size out of range
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        user_id: UserId,
        venue_id: VenueId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        guest_count: u32,
        table_type: TableType,
    ) -> Result<Reservation, BookingError> {
        if start >= end {
            return Err(StoreError::InvalidWindow.into());
        }

        let handle = self.ledger.reserve(venue_id, start, end).await?;

        match self.store.create(user_id, &handle, guest_count, table_type).await {
            Ok(reservation) => Ok(reservation),
            Err(e) => {
                warn!(slot_id = %handle.slot_id, error = %e, "Reservation rejected, releasing hold");
                if let Err(release) = self
                    .ledger
                    .release_hold(handle.venue_id, handle.slot_id, handle.hold)
                    .await
                {
                    warn!(slot_id = %handle.slot_id, error = %release, "Hold release failed");
                }
                Err(e.into())
            }
        }
    }

    /// Mark a confirmed reservation as arrived.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `InvalidTransition` unless confirmed.
    pub async fn check_in(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        let reservation = self
            .store
            .transition(id, ReservationStatus::Confirmed, ReservationStatus::Arrived)
            .await?;
        info!(reservation_id = %id, "Guest checked in");
        Ok(reservation)
    }

    /// Cancel a pending or confirmed reservation and free its slot.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `InvalidTransition` from a terminal
    /// status.
    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        let current = self.store.get(id).await?;
        let reservation = self
            .store
            .transition(id, current.status, ReservationStatus::Canceled)
            .await?;
        if let Some(scheduler) = &self.scheduler {
            scheduler.forget(id);
        }
        release_slot(self.ledger.as_ref(), &reservation).await?;
        Ok(reservation)
    }

    /// Load a reservation.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn reservation(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        Ok(self.store.get(id).await?)
    }

    /// Slots of a venue with their availability.
    ///
    /// # Errors
    ///
    /// `NoSuchVenue` for an unknown venue.
    pub async fn availability(&self, venue_id: VenueId) -> Result<Vec<Slot>, BookingError> {
        Ok(self.ledger.availability(venue_id).await?)
    }
}

/// Give back the slot a closed reservation held.
pub(crate) async fn release_slot(
    ledger: &dyn SlotLedger,
    reservation: &Reservation,
) -> Result<(), BookingError> {
    ledger
        .release_hold(reservation.venue_id, reservation.slot_id, reservation.hold)
        .await?;
    Ok(())
}
