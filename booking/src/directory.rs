//! User lookup for notification addressing.

use crate::types::{User, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Source of user contact details.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user; `None` if unknown.
    async fn user(&self, id: UserId) -> Option<User>;
}

/// In-memory [`UserDirectory`].
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user
    pub async fn upsert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn user(&self, id: UserId) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }
}
