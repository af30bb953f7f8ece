//! Typed errors for every booking boundary.
//!
//! Each error maps onto one [`ErrorKind`], the closed taxonomy callers match on.

use crate::types::{Money, ReservationId, ReservationStatus, SlotId, VenueId};
use tablebook_core::transport::TransportError;
use thiserror::Error;

/// Closed error taxonomy shared by every booking error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Slot already taken; expected under concurrency
    Conflict,
    /// State-machine violation
    InvalidTransition,
    /// Referenced entity does not exist
    NotFound,
    /// Bad input (overlapping slots, bad windows, bad amounts)
    Validation,
    /// Notification channel failure
    Transport,
}

impl ErrorKind {
    /// Classify a transport failure.
    #[must_use]
    pub const fn of_transport(_: &TransportError) -> Self {
        Self::Transport
    }
}

/// Why a venue's slot list was rejected.
///
/// `index` refers to the submitted list for `EmptyWindow` and to the
/// start-sorted list for `Overlap`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotValidationError {
    /// A slot whose start is not before its end
    #[error("slot {index} does not start before it ends")]
    EmptyWindow {
        /// Position in the submitted list
        index: usize,
    },

    /// A slot that starts before its predecessor ends
    #[error("slot {index} overlaps the slot before it")]
    Overlap {
        /// Position in the start-sorted list
        index: usize,
    },
}

/// Slot ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Venue not registered
    #[error("Venue not found: {0}")]
    NoSuchVenue(VenueId),

    /// No slot matches the requested window or id
    #[error("Slot not found in venue {venue_id}")]
    SlotNotFound {
        /// Venue searched
        venue_id: VenueId,
    },

    /// Someone else holds the slot
    #[error("Slot {0} is already taken")]
    SlotAlreadyTaken(SlotId),

    /// Slot update would drop or move a held slot
    #[error("Slot {0} is held and cannot be removed or moved")]
    SlotInUse(SlotId),

    /// Venue slot list rejected
    #[error("Invalid slot configuration: {0}")]
    Validation(#[from] SlotValidationError),
}

impl LedgerError {
    /// Taxonomy kind
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchVenue(_) | Self::SlotNotFound { .. } => ErrorKind::NotFound,
            Self::SlotAlreadyTaken(_) | Self::SlotInUse(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }
}

/// Reservation store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Reservation does not exist
    #[error("Reservation not found: {0}")]
    NotFound(ReservationId),

    /// The slot is not held by the hold presented
    #[error("Slot {0} is not held by this reservation")]
    InvalidSlot(SlotId),

    /// Start is not before end
    #[error("Reservation window is empty")]
    InvalidWindow,

    /// Party size outside `1..=max`
    #[error("Guest count {count} is outside 1..={max}")]
    InvalidGuestCount {
        /// Requested guests
        count: u32,
        /// Configured maximum
        max: u32,
    },

    /// Edge not in the lifecycle, or the current status differs from `from`
    #[error("Invalid transition {from} -> {to}")]
    InvalidTransition {
        /// Expected current status
        from: ReservationStatus,
        /// Requested status
        to: ReservationStatus,
    },

    /// Ledger lookup failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StoreError {
    /// Taxonomy kind
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidSlot(_) | Self::InvalidWindow | Self::InvalidGuestCount { .. } => {
                ErrorKind::Validation
            }
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Ledger(e) => e.kind(),
        }
    }
}

/// Errors surfaced by the booking facade and payment adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Slot ledger failure
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Reservation store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Payment amount differs from the reservation amount
    #[error("Payment amount mismatch: expected {expected}, received {received}")]
    AmountMismatch {
        /// Reservation amount
        expected: Money,
        /// Amount reported by the provider
        received: Money,
    },
}

impl BookingError {
    /// Taxonomy kind
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::AmountMismatch { .. } => ErrorKind::Validation,
        }
    }
}
