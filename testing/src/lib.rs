//! # Tablebook Testing
//!
//! Testing utilities for the tablebook crates.
//!
//! This crate provides:
//! - A settable clock for stepping through a reservation's lifetime
//! - Scripted push and email transports that record every call
//!
//! ## Example
//!
//! ```ignore
//! use tablebook_testing::{test_clock, ScriptedEmailTransport};
//!
//! #[tokio::test]
//! async fn reminder_is_sent() {
//!     let clock = test_clock();
//!     let email = ScriptedEmailTransport::succeeding();
//!     // ... build the scheduler with `clock` and `email`
//!     clock.advance(chrono::Duration::minutes(31));
//!     scheduler.sweep().await;
//!     assert_eq!(email.sent().len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use tablebook_core::environment::Clock;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, PoisonError, RwLock};
    use tablebook_core::transport::{
        EmailMessage, EmailTransport, PushTarget, PushTransport, TransportError,
    };
    use tokio::time::Instant;

    /// Clock whose time only moves when a test moves it.
    ///
    /// Clones share the same time, so a test can keep a handle while the
    /// system under test holds another.
    ///
    /// # Example
    ///
    /// ```
    /// use tablebook_testing::mocks::ManualClock;
    /// use tablebook_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let start = Utc::now();
    /// let clock = ManualClock::new(start);
    /// clock.advance(Duration::minutes(5));
    /// assert_eq!(clock.now(), start + Duration::minutes(5));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move forward by `by`.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> ManualClock {
        ManualClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Queue of outcomes a scripted transport hands out, one per call.
    #[derive(Debug)]
    struct Script {
        queued: VecDeque<Result<(), TransportError>>,
        otherwise: Result<(), TransportError>,
    }

    impl Script {
        fn new(otherwise: Result<(), TransportError>) -> Arc<Mutex<Self>> {
            Arc::new(Mutex::new(Self {
                queued: VecDeque::new(),
                otherwise,
            }))
        }

        fn next(script: &Mutex<Self>) -> Result<(), TransportError> {
            let mut script = script.lock().unwrap_or_else(PoisonError::into_inner);
            match script.queued.pop_front() {
                Some(outcome) => outcome,
                None => script.otherwise.clone(),
            }
        }
    }

    fn outage() -> Result<(), TransportError> {
        Err(TransportError::Unreachable("scripted outage".to_string()))
    }

    /// A push notification captured by [`ScriptedPushTransport`].
    #[derive(Debug, Clone)]
    pub struct SentPush {
        /// Delivery target
        pub target: PushTarget,
        /// Notification title
        pub title: String,
        /// Notification body
        pub body: String,
        /// Whether the scripted outcome was success
        pub delivered: bool,
        /// Tokio time of the call (advances with paused test time)
        pub at: Instant,
    }

    /// Push transport returning scripted outcomes and recording every call.
    #[derive(Debug, Clone)]
    pub struct ScriptedPushTransport {
        script: Arc<Mutex<Script>>,
        sent: Arc<Mutex<Vec<SentPush>>>,
    }

    impl ScriptedPushTransport {
        /// Transport whose calls succeed unless scripted otherwise.
        #[must_use]
        pub fn succeeding() -> Self {
            Self::with_default(Ok(()))
        }

        /// Transport whose calls fail unless scripted otherwise.
        #[must_use]
        pub fn failing() -> Self {
            Self::with_default(outage())
        }

        fn with_default(otherwise: Result<(), TransportError>) -> Self {
            Self {
                script: Script::new(otherwise),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Queue the outcome of the next unscripted call.
        pub fn then(&self, outcome: Result<(), TransportError>) -> &Self {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .queued
                .push_back(outcome);
            self
        }

        /// Every call made so far.
        #[must_use]
        pub fn sent(&self) -> Vec<SentPush> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of calls made so far.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedPushTransport {
        async fn send_push(
            &self,
            target: &PushTarget,
            title: &str,
            body: &str,
        ) -> Result<(), TransportError> {
            let outcome = Script::next(&self.script);
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(SentPush {
                    target: target.clone(),
                    title: title.to_string(),
                    body: body.to_string(),
                    delivered: outcome.is_ok(),
                    at: Instant::now(),
                });
            outcome
        }
    }

    /// An email captured by [`ScriptedEmailTransport`].
    #[derive(Debug, Clone)]
    pub struct SentEmail {
        /// The message as handed to the transport
        pub message: EmailMessage,
        /// Whether the scripted outcome was success
        pub delivered: bool,
        /// Tokio time of the call (advances with paused test time)
        pub at: Instant,
    }

    /// Email transport returning scripted outcomes and recording every call.
    #[derive(Debug, Clone)]
    pub struct ScriptedEmailTransport {
        script: Arc<Mutex<Script>>,
        sent: Arc<Mutex<Vec<SentEmail>>>,
    }

    impl ScriptedEmailTransport {
        /// Transport whose calls succeed unless scripted otherwise.
        #[must_use]
        pub fn succeeding() -> Self {
            Self::with_default(Ok(()))
        }

        /// Transport whose calls fail unless scripted otherwise.
        #[must_use]
        pub fn failing() -> Self {
            Self::with_default(outage())
        }

        fn with_default(otherwise: Result<(), TransportError>) -> Self {
            Self {
                script: Script::new(otherwise),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Queue the outcome of the next unscripted call.
        pub fn then(&self, outcome: Result<(), TransportError>) -> &Self {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .queued
                .push_back(outcome);
            self
        }

        /// Every call made so far.
        #[must_use]
        pub fn sent(&self) -> Vec<SentEmail> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Calls whose subject starts with `prefix`.
        #[must_use]
        pub fn sent_with_subject(&self, prefix: &str) -> Vec<SentEmail> {
            self.sent()
                .into_iter()
                .filter(|email| email.message.subject.starts_with(prefix))
                .collect()
        }

        /// Number of calls made so far.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
    }

    #[async_trait]
    impl EmailTransport for ScriptedEmailTransport {
        async fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError> {
            let outcome = Script::next(&self.script);
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(SentEmail {
                    message: message.clone(),
                    delivered: outcome.is_ok(),
                    at: Instant::now(),
                });
            outcome
        }
    }
}

// Re-export commonly used items
pub use mocks::{
    ManualClock, ScriptedEmailTransport, ScriptedPushTransport, SentEmail, SentPush, test_clock,
};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tablebook_core::transport::{
        EmailMessage, EmailTransport, PushTarget, PushTransport, TransportError,
    };

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let clock = test_clock();
        let handle = clock.clone();
        handle.advance(chrono::Duration::minutes(30));
        assert_eq!(clock.now(), handle.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:30:00+00:00");
    }

    #[tokio::test]
    async fn test_scripted_push_follows_script_then_default() {
        let push = ScriptedPushTransport::succeeding();
        push.then(Err(TransportError::Rejected("bad token".to_string())));
        let target = PushTarget::DeviceToken("device".to_string());

        assert!(push.send_push(&target, "t", "b").await.is_err());
        assert!(push.send_push(&target, "t", "b").await.is_ok());

        let sent = push.sent();
        assert_eq!(sent.len(), 2);
        assert!(!sent[0].delivered);
        assert!(sent[1].delivered);
    }

    #[tokio::test]
    async fn test_failing_email_records_attempt() {
        let email = ScriptedEmailTransport::failing();
        let message = EmailMessage {
            to: "guest@example.com".to_string(),
            subject: "Reservation Reminder".to_string(),
            text: "soon".to_string(),
            html: "<p>soon</p>".to_string(),
        };

        assert!(email.send_email(&message).await.is_err());
        assert_eq!(email.sent_with_subject("Reservation").len(), 1);
    }
}
