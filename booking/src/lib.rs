//! # Tablebook
//!
//! Venue slot booking with reminder and expiry scheduling.
//!
//! ## Components
//!
//! - [`ledger`]: slot availability with atomic per-slot reservation
//! - [`store`]: reservation records and the status state machine
//! - [`notify`]: push and email dispatch with channel fallback
//! - [`scheduler`]: periodic reminder/expiry sweep with bounded retries
//! - [`payment`]: payment outcome callbacks
//! - [`service`]: the booking facade
//!
//! ## Lifecycle
//!
//! ```text
//! reserve ──► pending ──payment──► confirmed ──sweep──► expired
//!               │                     ├──check-in──► arrived
//!               └──cancel/timeout──► canceled ◄──cancel──┘
//! ```
//!
//! Every path that closes a reservation releases its slot back to the
//! ledger, where it is immediately reservable again.

pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod payment;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;

pub use bootstrap::{Tablebook, VenueSeed};
pub use config::Config;
pub use error::{BookingError, ErrorKind, LedgerError, SlotValidationError, StoreError};
pub use scheduler::{ReminderOutcome, ReminderScheduler, SweepReport};
pub use service::BookingService;
