//! # Tablebook Core
//!
//! Environment abstractions shared by every tablebook crate.
//!
//! Anything that touches the outside world (the wall clock, push and email
//! providers) is expressed as a trait and injected, so the booking logic can be
//! driven by a deterministic clock and scripted providers in tests.
//!
//! ## Example
//!
//! ```
//! use tablebook_core::environment::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let now = clock.now();
//! assert!(now.timestamp() > 0);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// into the components that need them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the operating system.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    pub use super::transport::{EmailMessage, EmailTransport, PushTarget, PushTransport, TransportError};
}

/// Notification transports - outbound push and email delivery
///
/// Transports report success or failure as a value. They never panic and
/// never hide a failure behind a successful return, so callers can fall back
/// to another channel or schedule a retry.
pub mod transport {
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    /// Why a transport could not deliver a message.
    #[derive(Debug, Error, Clone, PartialEq, Eq)]
    pub enum TransportError {
        /// The channel could not be reached (network, provider outage).
        #[error("channel unreachable: {0}")]
        Unreachable(String),

        /// The provider refused the message (invalid token, bad address).
        #[error("message rejected: {0}")]
        Rejected(String),
    }

    /// Where a push notification is delivered.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum PushTarget {
        /// Mobile device registration token
        DeviceToken(String),
        /// Browser web-push subscription
        WebSubscription {
            /// Push service endpoint URL
            endpoint: String,
            /// Client public key
            p256dh: String,
            /// Client auth secret
            auth: String,
        },
    }

    /// An email ready to hand to a provider.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EmailMessage {
        /// Recipient address
        pub to: String,
        /// Subject line
        pub subject: String,
        /// Plain-text body
        pub text: String,
        /// HTML body
        pub html: String,
    }

    /// Push notification provider (FCM, web push, ...).
    #[async_trait]
    pub trait PushTransport: Send + Sync {
        /// Send a push notification.
        ///
        /// # Errors
        ///
        /// Returns [`TransportError`] if the provider is unreachable or
        /// rejects the target.
        async fn send_push(
            &self,
            target: &PushTarget,
            title: &str,
            body: &str,
        ) -> Result<(), TransportError>;
    }

    /// Email provider (SMTP, SES, ...).
    #[async_trait]
    pub trait EmailTransport: Send + Sync {
        /// Send an email.
        ///
        /// # Errors
        ///
        /// Returns [`TransportError`] if the provider is unreachable or
        /// rejects the message.
        async fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError>;
    }
}
