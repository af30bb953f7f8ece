//! Payment gateway adapter.
//!
//! The payment provider reports outcomes keyed by reservation id; this
//! adapter turns them into reservation transitions. Provider protocol
//! details live outside the crate.

use crate::error::BookingError;
use crate::ledger::SlotLedger;
use crate::service::release_slot;
use crate::store::ReservationStore;
use crate::types::{Money, Reservation, ReservationId, ReservationStatus};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Inbound payment callbacks.
#[async_trait]
pub trait PaymentEvents: Send + Sync {
    /// Payment succeeded: `pending → confirmed`.
    ///
    /// # Errors
    ///
    /// `NotFound` or `InvalidTransition` when the reservation is not pending.
    async fn on_payment_confirmed(&self, id: ReservationId) -> Result<Reservation, BookingError>;

    /// Payment captured for `amount_paid`; confirms only on an exact match.
    ///
    /// # Errors
    ///
    /// `AmountMismatch` when the amount differs from the reservation's, and
    /// the errors of [`on_payment_confirmed`](Self::on_payment_confirmed).
    async fn on_payment_captured(
        &self,
        id: ReservationId,
        amount_paid: Money,
    ) -> Result<Reservation, BookingError>;

    /// Payment failed or was abandoned: `pending → canceled`, then the slot
    /// is released.
    ///
    /// # Errors
    ///
    /// `NotFound` or `InvalidTransition` when the reservation is not pending.
    async fn on_payment_canceled(&self, id: ReservationId) -> Result<Reservation, BookingError>;
}

/// [`PaymentEvents`] backed by the reservation store and slot ledger.
#[derive(Clone)]
pub struct PaymentAdapter {
    store: Arc<dyn ReservationStore>,
    ledger: Arc<dyn SlotLedger>,
}

impl PaymentAdapter {
    /// Create an adapter.
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>, ledger: Arc<dyn SlotLedger>) -> Self {
        Self { store, ledger }
    }
}

#[async_trait]
impl PaymentEvents for PaymentAdapter {
    async fn on_payment_confirmed(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        let reservation = self
            .store
            .transition(id, ReservationStatus::Pending, ReservationStatus::Confirmed)
            .await?;
        info!(reservation_id = %id, amount = %reservation.amount, "Payment confirmed");
        Ok(reservation)
    }

    async fn on_payment_captured(
        &self,
        id: ReservationId,
        amount_paid: Money,
    ) -> Result<Reservation, BookingError> {
        let reservation = self.store.get(id).await?;
        if reservation.amount != amount_paid {
            warn!(
                reservation_id = %id,
                expected = %reservation.amount,
                received = %amount_paid,
                "Payment amount mismatch"
            );
            return Err(BookingError::AmountMismatch {
                expected: reservation.amount,
                received: amount_paid,
            });
        }
        self.on_payment_confirmed(id).await
    }

    async fn on_payment_canceled(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        let reservation = self
            .store
            .transition(id, ReservationStatus::Pending, ReservationStatus::Canceled)
            .await?;
        release_slot(self.ledger.as_ref(), &reservation).await?;
        info!(reservation_id = %id, "Payment canceled, slot released");
        Ok(reservation)
    }
}
