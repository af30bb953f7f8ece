//! Domain types for venue booking.
//!
//! Identifiers, value objects, and the reservation record with its status
//! state machine and append-only notification log.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tablebook_core::transport::PushTarget;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a venue
    VenueId
);
uuid_id!(
    /// Unique identifier for a slot within a venue
    SlotId
);
uuid_id!(
    /// Unique identifier for a reservation
    ReservationId
);
uuid_id!(
    /// Unique identifier for a user
    UserId
);

/// Proof that a caller holds a slot.
///
/// Issued by the ledger on a successful reserve; never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldToken(u64);

impl HoldToken {
    /// Wrap a raw token value. Zero is reserved for "not held".
    #[must_use]
    pub const fn new(value: u64) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    /// Raw token value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HoldToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hold-{}", self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Money amount in cents
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates money from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates money from whole dollars
    #[must_use]
    pub const fn from_dollars(dollars: u64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    /// Amount in cents
    #[must_use]
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Multiply by a count (guests, units)
    #[must_use]
    pub const fn multiply(self, count: u32) -> Self {
        Self(self.0.saturating_mul(count as u64))
    }

    /// Scale by a percentage (150 = one and a half times)
    #[must_use]
    pub const fn multiply_percent(self, percent: u32) -> Self {
        Self(self.0.saturating_mul(percent as u64) / 100)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Kind of table booked; drives the price multiplier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    /// Standard indoor table
    #[default]
    Regular,
    /// Terrace or garden table
    Outdoor,
    /// Premium table
    Vip,
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Outdoor => write!(f, "outdoor"),
            Self::Vip => write!(f, "vip"),
        }
    }
}

// ============================================================================
// Venues and Slots
// ============================================================================

/// A bookable window submitted during venue setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    /// Window start
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
}

impl SlotSpec {
    /// Creates a slot window
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Public venue data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueInfo {
    /// Venue ID
    pub id: VenueId,
    /// Display name
    pub name: String,
    /// Per-guest price before the table multiplier
    pub base_price: Money,
}

/// A registered venue with its slots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    /// Venue ID
    pub id: VenueId,
    /// Display name
    pub name: String,
    /// Per-guest price before the table multiplier
    pub base_price: Money,
    /// Slots, sorted by start
    pub slots: Vec<Slot>,
}

impl Venue {
    /// Venue data without the slots
    #[must_use]
    pub fn info(&self) -> VenueInfo {
        VenueInfo {
            id: self.id,
            name: self.name.clone(),
            base_price: self.base_price,
        }
    }
}

/// Snapshot of a slot and its availability flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot ID
    pub id: SlotId,
    /// Owning venue
    pub venue_id: VenueId,
    /// Window start
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
    /// Whether the slot can be reserved
    pub available: bool,
}

/// A slot successfully reserved in the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotHandle {
    /// Venue the slot belongs to
    pub venue_id: VenueId,
    /// Reserved slot
    pub slot_id: SlotId,
    /// Window start
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
    /// Token proving this caller holds the slot
    pub hold: HoldToken,
}

// ============================================================================
// Users
// ============================================================================

/// Browser web-push subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    /// Push service endpoint
    pub endpoint: String,
    /// Client public key
    pub p256dh: String,
    /// Client auth secret
    pub auth: String,
}

/// A user who can be notified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: UserId,
    /// Email address
    pub email: String,
    /// Full name
    pub full_name: String,
    /// Mobile device registration token
    pub device_token: Option<String>,
    /// Browser push subscription
    pub push_subscription: Option<PushSubscription>,
}

impl User {
    /// Creates a user reachable by email only
    #[must_use]
    pub fn new(email: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            full_name: full_name.into(),
            device_token: None,
            push_subscription: None,
        }
    }

    /// Adds a mobile device token
    #[must_use]
    pub fn with_device_token(mut self, token: impl Into<String>) -> Self {
        self.device_token = Some(token.into());
        self
    }

    /// Adds a browser push subscription
    #[must_use]
    pub fn with_push_subscription(mut self, subscription: PushSubscription) -> Self {
        self.push_subscription = Some(subscription);
        self
    }

    /// Where to send push notifications, device token first.
    #[must_use]
    pub fn push_target(&self) -> Option<PushTarget> {
        if let Some(token) = &self.device_token {
            return Some(PushTarget::DeviceToken(token.clone()));
        }
        self.push_subscription
            .as_ref()
            .map(|sub| PushTarget::WebSubscription {
                endpoint: sub.endpoint.clone(),
                p256dh: sub.p256dh.clone(),
                auth: sub.auth.clone(),
            })
    }
}

// ============================================================================
// Reservations
// ============================================================================

/// Reservation lifecycle.
///
/// ```text
/// pending ──► confirmed ──► expired
///    │            ├──────► canceled
///    │            └──────► arrived
///    └──────────────────► canceled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Slot held, awaiting payment
    Pending,
    /// Paid
    Confirmed,
    /// Guest checked in
    Arrived,
    /// Window ended without check-in
    Expired,
    /// Payment failed, timed out, or the guest canceled
    Canceled,
}

impl ReservationStatus {
    /// Whether `self → to` is an edge of the lifecycle.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Confirmed | Self::Canceled)
                | (Self::Confirmed, Self::Expired | Self::Canceled | Self::Arrived)
        )
    }

    /// Whether no transition leaves this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Arrived | Self::Expired | Self::Canceled)
    }

    /// Stable lowercase label (logs, metrics)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Arrived => "arrived",
            Self::Expired => "expired",
            Self::Canceled => "canceled",
        }
    }

    /// Every status, in lifecycle order
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::Arrived,
        Self::Expired,
        Self::Canceled,
    ];
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Mobile or browser push
    Push,
    /// Email
    Email,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// What a notification attempt was for; the idempotence key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderKey {
    /// Reminder for a lead-time threshold, in minutes before start
    Threshold {
        /// Minutes before start
        minutes: u32,
    },
    /// Operator-forced reminder outside every threshold
    Manual,
    /// "Did you arrive" message sent after a delivered reminder
    FollowUp,
}

impl fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threshold { minutes } => write!(f, "{minutes}m"),
            Self::Manual => write!(f, "manual"),
            Self::FollowUp => write!(f, "follow-up"),
        }
    }
}

/// Result of one channel attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// Provider accepted the message
    Delivered,
    /// Provider unreachable or message rejected
    Failed {
        /// Transport error text
        reason: String,
    },
}

impl AttemptOutcome {
    /// Whether the attempt succeeded
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// One channel attempt in a reservation's notification log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    /// When the attempt was made
    pub at: DateTime<Utc>,
    /// Channel tried
    pub channel: Channel,
    /// What the notification was for
    pub key: ReminderKey,
    /// Dispatch round for `key`, starting at 1
    pub round: u32,
    /// Outcome
    pub outcome: AttemptOutcome,
}

/// A user's claim on a slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation ID
    pub id: ReservationId,
    /// Who booked
    pub user_id: UserId,
    /// Venue booked
    pub venue_id: VenueId,
    /// Slot held
    pub slot_id: SlotId,
    /// Hold token issued by the ledger
    pub hold: HoldToken,
    /// Start of the reserved window
    pub start: DateTime<Utc>,
    /// End of the reserved window (exclusive)
    pub end: DateTime<Utc>,
    /// Party size
    pub guest_count: u32,
    /// Table type
    pub table_type: TableType,
    /// Price, fixed at creation
    pub amount: Money,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// When the reservation was created
    pub created_at: DateTime<Utc>,
    /// Append-only notification log
    pub attempts: Vec<NotificationAttempt>,
}

impl Reservation {
    /// Time left until the reserved window starts (negative once started).
    #[must_use]
    pub fn time_to_start(&self, now: DateTime<Utc>) -> Duration {
        self.start - now
    }

    /// Whether any attempt for `key` was delivered.
    #[must_use]
    pub fn has_delivered(&self, key: ReminderKey) -> bool {
        self.attempts
            .iter()
            .any(|attempt| attempt.key == key && attempt.outcome.is_delivered())
    }

    /// Whether a reminder for `minutes`, or a tighter threshold, was delivered.
    #[must_use]
    pub fn reminder_covered(&self, minutes: u32) -> bool {
        self.attempts.iter().any(|attempt| {
            attempt.outcome.is_delivered()
                && matches!(attempt.key, ReminderKey::Threshold { minutes: m } if m <= minutes)
        })
    }

    /// Number of dispatch rounds already made for `key`.
    #[must_use]
    pub fn rounds(&self, key: ReminderKey) -> u32 {
        self.attempts
            .iter()
            .filter(|attempt| attempt.key == key)
            .map(|attempt| attempt.round)
            .max()
            .unwrap_or(0)
    }

    /// Number of dispatch rounds for `key` in which no channel delivered.
    #[must_use]
    pub fn failed_rounds(&self, key: ReminderKey) -> u32 {
        (1..=self.rounds(key))
            .filter(|round| {
                !self.attempts.iter().any(|attempt| {
                    attempt.key == key && attempt.round == *round && attempt.outcome.is_delivered()
                })
            })
            .fold(0, |count, _| count + 1)
    }
}
