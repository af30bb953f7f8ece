//! Reservation store: the only writer of reservation status and amount.
//!
//! Status changes go through [`ReservationStore::transition`], which applies a
//! conditional `from → to` update atomically. A caller that lost a race (the
//! record already left `from`) gets [`StoreError::InvalidTransition`] and the
//! record is left as it is.

use crate::config::PricingConfig;
use crate::error::StoreError;
use crate::ledger::SlotLedger;
use crate::metrics;
use crate::types::{
    Money, NotificationAttempt, Reservation, ReservationId, ReservationStatus, SlotHandle,
    TableType, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, BoxStream};
use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::sync::Arc;
use tablebook_core::environment::Clock;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Reservation persistence with conditional status updates.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Create a `pending` reservation for a slot the caller holds.
    ///
    /// # Errors
    ///
    /// - `InvalidGuestCount`: party size outside the configured range
    /// - `InvalidWindow`: `slot.start >= slot.end`
    /// - `InvalidSlot`: the hold no longer owns the slot, or already backs
    ///   another reservation
    /// - `Ledger`: venue or slot unknown
    async fn create(
        &self,
        user_id: UserId,
        slot: &SlotHandle,
        guest_count: u32,
        table_type: TableType,
    ) -> Result<Reservation, StoreError>;

    /// Load a reservation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id.
    async fn get(&self, id: ReservationId) -> Result<Reservation, StoreError>;

    /// Move a reservation from `from` to `to`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown id
    /// - `InvalidTransition`: the edge is not part of the lifecycle or the
    ///   reservation is no longer in `from`; the record is unchanged
    async fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<Reservation, StoreError>;

    /// Append to a reservation's notification log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id.
    async fn record_attempts(
        &self,
        id: ReservationId,
        attempts: Vec<NotificationAttempt>,
    ) -> Result<Reservation, StoreError>;

    /// Confirmed reservations starting in `(now, now + horizon]`.
    ///
    /// The candidate set is fixed on first poll; each record is re-read as it
    /// is yielded and skipped if it is no longer confirmed. The stream ends
    /// after one pass.
    fn find_due(&self, now: DateTime<Utc>, horizon: Duration) -> BoxStream<'_, Reservation>;

    /// Confirmed or pending reservations whose window ended at or before `now`.
    async fn find_ended(&self, now: DateTime<Utc>) -> Vec<Reservation>;

    /// Pending reservations created at or before `created_before`.
    async fn find_stale_pending(&self, created_before: DateTime<Utc>) -> Vec<Reservation>;

    /// Reservations in `status` whose start falls in `start_range`.
    async fn find_by_status(
        &self,
        status: ReservationStatus,
        start_range: Range<DateTime<Utc>>,
    ) -> Vec<Reservation>;
}

/// Price of a reservation: base × table multiplier × guests.
#[must_use]
pub const fn price(
    base_price: Money,
    pricing: &PricingConfig,
    table_type: TableType,
    guest_count: u32,
) -> Money {
    base_price
        .multiply_percent(pricing.percent_for(table_type))
        .multiply(guest_count)
}

/// In-memory [`ReservationStore`].
pub struct InMemoryReservationStore {
    ledger: Arc<dyn SlotLedger>,
    pricing: PricingConfig,
    clock: Arc<dyn Clock>,
    records: RwLock<HashMap<ReservationId, Reservation>>,
}

impl InMemoryReservationStore {
    /// Create an empty store validating holds against `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn SlotLedger>, pricing: PricingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            pricing,
            clock,
            records: RwLock::new(HashMap::new()),
        }
    }

    async fn due_ids(&self, now: DateTime<Utc>, horizon: Duration) -> VecDeque<ReservationId> {
        let until = now + horizon;
        let mut due: Vec<(DateTime<Utc>, ReservationId)> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.status == ReservationStatus::Confirmed && r.start > now && r.start <= until)
            .map(|r| (r.start, r.id))
            .collect();
        due.sort_unstable();
        due.into_iter().map(|(_, id)| id).collect()
    }

    async fn confirmed(&self, id: ReservationId) -> Option<Reservation> {
        self.records
            .read()
            .await
            .get(&id)
            .filter(|r| r.status == ReservationStatus::Confirmed)
            .cloned()
    }

    async fn select(&self, predicate: impl Fn(&Reservation) -> bool + Send) -> Vec<Reservation> {
        let mut found: Vec<Reservation> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.start, r.id));
        found
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn create(
        &self,
        user_id: UserId,
        slot: &SlotHandle,
        guest_count: u32,
        table_type: TableType,
    ) -> Result<Reservation, StoreError> {
        let max = self.pricing.max_party_size;
        if guest_count == 0 || guest_count > max {
            return Err(StoreError::InvalidGuestCount {
                count: guest_count,
                max,
            });
        }
        if slot.start >= slot.end {
            return Err(StoreError::InvalidWindow);
        }

        let venue = self.ledger.venue(slot.venue_id).await?;

        let reservation = Reservation {
            id: ReservationId::new(),
            user_id,
            venue_id: slot.venue_id,
            slot_id: slot.slot_id,
            hold: slot.hold,
            start: slot.start,
            end: slot.end,
            guest_count,
            table_type,
            amount: price(venue.base_price, &self.pricing, table_type, guest_count),
            status: ReservationStatus::Pending,
            created_at: self.clock.now(),
            attempts: Vec::new(),
        };

        // Checked under the write lock so the record and the hold agree.
        let mut records = self.records.write().await;
        if records.values().any(|r| r.hold == slot.hold) || !self.ledger.holds(slot).await? {
            return Err(StoreError::InvalidSlot(slot.slot_id));
        }
        records.insert(reservation.id, reservation.clone());
        drop(records);

        metrics::record_status(ReservationStatus::Pending);
        info!(
            reservation_id = %reservation.id,
            venue_id = %reservation.venue_id,
            amount = %reservation.amount,
            "Reservation created"
        );
        Ok(reservation)
    }

    async fn get(&self, id: ReservationId) -> Result<Reservation, StoreError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<Reservation, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if record.status != from || !from.can_transition_to(to) {
            debug!(reservation_id = %id, current = %record.status, %from, %to, "Transition rejected");
            return Err(StoreError::InvalidTransition { from, to });
        }

        record.status = to;
        let updated = record.clone();
        drop(records);

        metrics::record_status(to);
        info!(reservation_id = %id, %from, %to, "Reservation status changed");
        Ok(updated)
    }

    async fn record_attempts(
        &self,
        id: ReservationId,
        attempts: Vec<NotificationAttempt>,
    ) -> Result<Reservation, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.attempts.extend(attempts);
        Ok(record.clone())
    }

    fn find_due(&self, now: DateTime<Utc>, horizon: Duration) -> BoxStream<'_, Reservation> {
        Box::pin(stream::unfold(None, move |pending: Option<VecDeque<ReservationId>>| async move {
            let mut queue = match pending {
                Some(queue) => queue,
                None => self.due_ids(now, horizon).await,
            };
            while let Some(id) = queue.pop_front() {
                if let Some(reservation) = self.confirmed(id).await {
                    return Some((reservation, Some(queue)));
                }
            }
            None
        }))
    }

    async fn find_ended(&self, now: DateTime<Utc>) -> Vec<Reservation> {
        self.select(|r| {
            r.end <= now
                && matches!(r.status, ReservationStatus::Confirmed | ReservationStatus::Pending)
        })
        .await
    }

    async fn find_stale_pending(&self, created_before: DateTime<Utc>) -> Vec<Reservation> {
        self.select(|r| r.status == ReservationStatus::Pending && r.created_at <= created_before)
            .await
    }

    async fn find_by_status(
        &self,
        status: ReservationStatus,
        start_range: Range<DateTime<Utc>>,
    ) -> Vec<Reservation> {
        self.select(|r| r.status == status && start_range.contains(&r.start))
            .await
    }
}
