//! # Tablebook Runtime
//!
//! Scheduling primitives used by the reminder scheduler.
//!
//! ## Core Components
//!
//! - **`RetryPolicy`**: how many attempts a chain may make and how far apart
//! - **`TimerRegistry`**: keyed one-shot timers, individually cancelable and
//!   torn down together on shutdown
//!
//! ## Example
//!
//! ```ignore
//! use tablebook_runtime::{retry::RetryPolicy, timers::TimerRegistry};
//!
//! let policy = RetryPolicy::default();
//! let timers = TimerRegistry::new("retry_timers");
//!
//! if let Some(delay) = policy.next_delay(1) {
//!     timers.schedule(reservation_id, delay, retry_reminder(reservation_id));
//! }
//!
//! // On shutdown
//! timers.shutdown(Duration::from_secs(10)).await;
//! ```

/// Bounded retry policy
pub mod retry;

/// Keyed cancelable timers
pub mod timers;

pub use retry::RetryPolicy;
pub use timers::TimerRegistry;
