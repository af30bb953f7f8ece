//! Shared fixtures for the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tablebook::config::Config;
use tablebook::types::{Money, SlotSpec, User, Venue};
use tablebook::{Tablebook, VenueSeed};
use tablebook_testing::{ManualClock, ScriptedEmailTransport, ScriptedPushTransport, test_clock};

/// 2025-01-01 at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, hour, minute, 0).unwrap()
}

/// A wired system with scripted transports and a manual clock.
pub struct World {
    pub tablebook: Tablebook,
    pub clock: ManualClock,
    pub push: ScriptedPushTransport,
    pub email: ScriptedEmailTransport,
}

impl World {
    pub fn new(push: ScriptedPushTransport, email: ScriptedEmailTransport) -> Self {
        Self::with_config(push, email, &Config::default())
    }

    pub fn with_config(
        push: ScriptedPushTransport,
        email: ScriptedEmailTransport,
        config: &Config,
    ) -> Self {
        let clock = test_clock();
        let tablebook = Tablebook::in_memory(
            config,
            Arc::new(push.clone()),
            Arc::new(email.clone()),
            Arc::new(clock.clone()),
        );
        Self {
            tablebook,
            clock,
            push,
            email,
        }
    }

    /// Venue with the single slot `[10:00, 11:00)`.
    pub async fn morning_venue(&self) -> Venue {
        VenueSeed {
            name: "Chez Rust".to_string(),
            base_price_cents: Money::from_dollars(20).cents(),
            slots: vec![SlotSpec::new(at(10, 0), at(11, 0))],
        }
        .register(&self.tablebook.bookings)
        .await
        .unwrap()
    }

    pub async fn user(&self, user: User) -> User {
        self.tablebook.users.upsert(user.clone()).await;
        user
    }
}
