//! Notification dispatcher.
//!
//! Sends a message through push and email in canonical order (push first)
//! and reports what happened on each channel. The dispatcher keeps no state:
//! the caller decides how to record the report in the reservation's log.

pub mod console;
pub mod messages;

use crate::config::NotificationConfig;
use crate::types::{
    AttemptOutcome, Channel, NotificationAttempt, ReminderKey, Reservation, User,
};
use chrono::{DateTime, Utc};
use messages::Message;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tablebook_core::transport::{EmailMessage, EmailTransport, PushTransport, TransportError};
use tracing::{debug, instrument, warn};

pub use console::{ConsoleEmailTransport, ConsolePushTransport};

/// Which channels a dispatch tries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Push when available, and email as well
    #[default]
    Redundant,
    /// Push when available; email only if push is absent or failed
    Fallback,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redundant" => Ok(Self::Redundant),
            "fallback" => Ok(Self::Fallback),
            other => Err(format!("unknown delivery mode: {other}")),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redundant => write!(f, "redundant"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Result of trying one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelAttempt {
    /// Channel tried
    pub channel: Channel,
    /// Transport result
    pub result: Result<(), TransportError>,
}

/// Per-channel results of one dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    attempts: SmallVec<[ChannelAttempt; 2]>,
}

impl DispatchReport {
    /// A dispatch that could not reach any channel.
    #[must_use]
    pub fn undeliverable(reason: impl Into<String>) -> Self {
        let mut report = Self::default();
        report.push(Channel::Email, Err(TransportError::Rejected(reason.into())));
        report
    }

    fn push(&mut self, channel: Channel, result: Result<(), TransportError>) {
        self.attempts.push(ChannelAttempt { channel, result });
    }

    /// Whether at least one channel delivered.
    #[must_use]
    pub fn delivered(&self) -> bool {
        self.attempts.iter().any(|attempt| attempt.result.is_ok())
    }

    /// First channel failure, in the order tried.
    #[must_use]
    pub fn first_error(&self) -> Option<&TransportError> {
        self.attempts
            .iter()
            .find_map(|attempt| attempt.result.as_ref().err())
    }

    /// Channel results in the order tried.
    #[must_use]
    pub fn attempts(&self) -> &[ChannelAttempt] {
        &self.attempts
    }

    /// Convert into log entries for `key`'s dispatch `round`.
    #[must_use]
    pub fn into_attempts(
        self,
        at: DateTime<Utc>,
        key: ReminderKey,
        round: u32,
    ) -> Vec<NotificationAttempt> {
        self.attempts
            .into_iter()
            .map(|attempt| NotificationAttempt {
                at,
                channel: attempt.channel,
                key,
                round,
                outcome: match attempt.result {
                    Ok(()) => AttemptOutcome::Delivered,
                    Err(e) => AttemptOutcome::Failed {
                        reason: e.to_string(),
                    },
                },
            })
            .collect()
    }
}

/// Sends reminders and follow-ups over push and email.
#[derive(Clone)]
pub struct NotificationDispatcher {
    push: Arc<dyn PushTransport>,
    email: Arc<dyn EmailTransport>,
    mode: DeliveryMode,
    check_in_base_url: String,
}

impl NotificationDispatcher {
    /// Create a dispatcher over the given transports.
    #[must_use]
    pub fn new(
        push: Arc<dyn PushTransport>,
        email: Arc<dyn EmailTransport>,
        config: &NotificationConfig,
    ) -> Self {
        Self {
            push,
            email,
            mode: config.delivery_mode,
            check_in_base_url: config.check_in_base_url.clone(),
        }
    }

    /// Delivery mode in use
    #[must_use]
    pub const fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Remind `user` of an upcoming reservation.
    #[instrument(skip_all, fields(reservation_id = %reservation.id))]
    pub async fn remind(
        &self,
        reservation: &Reservation,
        user: &User,
        venue_name: &str,
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let minutes = reservation.time_to_start(now).num_minutes();
        self.send(user, &messages::reminder(venue_name, minutes)).await
    }

    /// Ask `user` to confirm arrival through the check-in link.
    #[instrument(skip_all, fields(reservation_id = %reservation.id))]
    pub async fn follow_up(
        &self,
        reservation: &Reservation,
        user: &User,
        venue_name: &str,
    ) -> DispatchReport {
        let url = messages::check_in_url(&self.check_in_base_url, reservation.id);
        self.send(user, &messages::follow_up(venue_name, &url)).await
    }

    /// Send `message` to `user`, push first.
    pub async fn send(&self, user: &User, message: &Message) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut push_delivered = false;

        if let Some(target) = user.push_target() {
            let result = self.push.send_push(&target, &message.title, &message.text).await;
            match &result {
                Ok(()) => push_delivered = true,
                Err(e) => warn!(user_id = %user.id, error = %e, "Push delivery failed"),
            }
            report.push(Channel::Push, result);
        }

        let want_email = match self.mode {
            DeliveryMode::Redundant => true,
            DeliveryMode::Fallback => !push_delivered,
        };

        if want_email && !user.email.is_empty() {
            let email = EmailMessage {
                to: user.email.clone(),
                subject: message.title.clone(),
                text: message.text.clone(),
                html: message.html.clone(),
            };
            let result = self.email.send_email(&email).await;
            if let Err(e) = &result {
                warn!(user_id = %user.id, error = %e, "Email delivery failed");
            }
            report.push(Channel::Email, result);
        }

        if report.attempts.is_empty() {
            debug!(user_id = %user.id, "User has no reachable channel");
            return DispatchReport::undeliverable("no push target or email address");
        }

        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{HoldToken, Money, ReservationId, ReservationStatus, SlotId, TableType, UserId, VenueId};
    use chrono::Duration;
    use tablebook_testing::{ScriptedEmailTransport, ScriptedPushTransport};

    fn dispatcher(
        mode: DeliveryMode,
        push: &ScriptedPushTransport,
        email: &ScriptedEmailTransport,
    ) -> NotificationDispatcher {
        let config = NotificationConfig {
            delivery_mode: mode,
            check_in_base_url: "https://book.example/arrived".to_string(),
        };
        NotificationDispatcher::new(Arc::new(push.clone()), Arc::new(email.clone()), &config)
    }

    fn reservation(now: DateTime<Utc>) -> Reservation {
        Reservation {
            id: ReservationId::new(),
            user_id: UserId::new(),
            venue_id: VenueId::new(),
            slot_id: SlotId::new(),
            hold: HoldToken::new(1).unwrap(),
            start: now + Duration::minutes(29),
            end: now + Duration::minutes(89),
            guest_count: 2,
            table_type: TableType::Regular,
            amount: Money::from_dollars(40),
            status: ReservationStatus::Confirmed,
            created_at: now,
            attempts: Vec::new(),
        }
    }

    fn push_user() -> User {
        User::new("guest@example.com", "Guest").with_device_token("device-1")
    }

    #[tokio::test]
    async fn test_redundant_mode_tries_both_channels() {
        let push = ScriptedPushTransport::succeeding();
        let email = ScriptedEmailTransport::succeeding();
        let now = Utc::now();

        let report = dispatcher(DeliveryMode::Redundant, &push, &email)
            .remind(&reservation(now), &push_user(), "Chez Rust", now)
            .await;

        assert!(report.delivered());
        let channels: Vec<_> = report.attempts().iter().map(|a| a.channel).collect();
        assert_eq!(channels, vec![Channel::Push, Channel::Email]);
        assert!(push.sent()[0].body.contains("in 29 minutes"));
    }

    #[tokio::test]
    async fn test_fallback_mode_uses_email_only_after_push_fails() {
        let push = ScriptedPushTransport::succeeding();
        let email = ScriptedEmailTransport::succeeding();
        let now = Utc::now();
        let dispatcher = dispatcher(DeliveryMode::Fallback, &push, &email);

        dispatcher.remind(&reservation(now), &push_user(), "Chez Rust", now).await;
        assert_eq!(email.calls(), 0);

        push.then(Err(TransportError::Unreachable("fcm down".to_string())));
        let report = dispatcher.remind(&reservation(now), &push_user(), "Chez Rust", now).await;
        assert!(report.delivered());
        assert_eq!(email.calls(), 1);
    }

    #[tokio::test]
    async fn test_email_only_user_and_total_failure() {
        let push = ScriptedPushTransport::succeeding();
        let email = ScriptedEmailTransport::failing();
        let now = Utc::now();
        let user = User::new("guest@example.com", "Guest");

        let report = dispatcher(DeliveryMode::Redundant, &push, &email)
            .remind(&reservation(now), &user, "Chez Rust", now)
            .await;

        assert!(!report.delivered());
        assert_eq!(push.calls(), 0);
        assert_eq!(
            report.first_error().map(crate::error::ErrorKind::of_transport),
            Some(crate::error::ErrorKind::Transport)
        );
        let attempts = report.into_attempts(now, ReminderKey::Threshold { minutes: 30 }, 1);
        assert_eq!(attempts.len(), 1);
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_user_yields_failed_report() {
        let push = ScriptedPushTransport::succeeding();
        let email = ScriptedEmailTransport::succeeding();
        let user = User::new("", "Nobody");

        let report = dispatcher(DeliveryMode::Redundant, &push, &email)
            .send(&user, &messages::reminder("Chez Rust", 10))
            .await;

        assert!(!report.delivered());
        assert_eq!(report.attempts().len(), 1);
        assert_eq!(push.calls() + email.calls(), 0);
    }

    #[tokio::test]
    async fn test_follow_up_carries_check_in_link() {
        let push = ScriptedPushTransport::succeeding();
        let email = ScriptedEmailTransport::succeeding();
        let now = Utc::now();
        let reservation = reservation(now);

        dispatcher(DeliveryMode::Redundant, &push, &email)
            .follow_up(&reservation, &User::new("guest@example.com", "Guest"), "Chez Rust")
            .await;

        let sent = email.sent_with_subject("Did you arrive");
        assert_eq!(sent.len(), 1);
        assert!(sent[0]
            .message
            .html
            .contains(&format!("https://book.example/arrived?reservationId={}", reservation.id)));
    }

    #[test]
    fn test_delivery_mode_parses() {
        assert_eq!("Fallback".parse::<DeliveryMode>(), Ok(DeliveryMode::Fallback));
        assert!("sms".parse::<DeliveryMode>().is_err());
    }
}
