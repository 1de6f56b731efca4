//! In-memory user directory backing author display lookups.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use domains::{AuthorDisplay, DisplayNameLookup, Identity, LookupError, UserId};

#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    entries: Arc<DashMap<UserId, AuthorDisplay>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user: UserId, display: AuthorDisplay) {
        self.entries.insert(user, display);
    }
}

#[async_trait]
impl DisplayNameLookup for InMemoryDirectory {
    async fn display_for(&self, user: &UserId) -> Result<AuthorDisplay, LookupError> {
        self.entries
            .get(user)
            .map(|entry| entry.value().clone())
            .ok_or(LookupError::NotFound)
    }

    /// Fields the identity leaves empty keep whatever was known before.
    async fn remember(&self, identity: &Identity) -> Result<(), LookupError> {
        let fresh = AuthorDisplay::from(identity);
        self.entries
            .entry(identity.user_id.clone())
            .and_modify(|known| {
                if fresh.display_name.is_some() {
                    known.display_name = fresh.display_name.clone();
                }
                if fresh.email.is_some() {
                    known.email = fresh.email.clone();
                }
            })
            .or_insert(fresh);
        Ok(())
    }
}
