use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use super::{CachedToken, TokenStore};
use crate::error::{StsError, StsResult};

enum Slot {
    Live(CachedToken),
    /// Removed or swept id. Never reused.
    Removed,
}

/// [`TokenStore`] on a sharded concurrent map. Live entries and tombstones
/// share one map so every check-and-set happens under a single shard lock.
#[derive(Default)]
pub struct InMemoryTokenStore {
    slots: DashMap<String, Slot>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Live(_)))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for InMemoryTokenStore {
    fn put(&self, token: CachedToken) -> StsResult<()> {
        match self.slots.entry(token.id.clone()) {
            Entry::Occupied(occupied) => {
                let reason = match occupied.get() {
                    Slot::Live(_) => "is already cached",
                    Slot::Removed => "was removed and cannot be reused",
                };
                tracing::warn!(id = %token.id, reason, "Rejected token store insert");
                Err(StsError::request_failed(format!("token id {} {reason}", token.id)))
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(id = %token.id, token_type = %token.token_type, "Token cached");
                vacant.insert(Slot::Live(token));
                Ok(())
            }
        }
    }

    fn update(&self, token: CachedToken) -> StsResult<()> {
        match self.slots.get_mut(&token.id) {
            Some(mut slot) if matches!(slot.value(), Slot::Live(_)) => {
                tracing::debug!(id = %token.id, "Cached token updated");
                *slot = Slot::Live(token);
                Ok(())
            }
            _ => Err(StsError::token_not_found(token.id)),
        }
    }

    fn get(&self, id: &str) -> Option<CachedToken> {
        self.slots.get(id).and_then(|slot| match slot.value() {
            Slot::Live(token) => Some(token.clone()),
            Slot::Removed => None,
        })
    }

    fn remove(&self, id: &str) -> Option<CachedToken> {
        let mut slot = self.slots.get_mut(id)?;
        match std::mem::replace(slot.value_mut(), Slot::Removed) {
            Slot::Live(token) => {
                tracing::debug!(id, "Token removed from store");
                Some(token)
            }
            Slot::Removed => None,
        }
    }

    fn ids(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Live(_)))
            .map(|slot| slot.key().clone())
            .collect()
    }

    fn remove_expired(&self, cutoff: OffsetDateTime) -> usize {
        let mut dropped = 0;
        for mut slot in self.slots.iter_mut() {
            let expired = match slot.value() {
                Slot::Live(token) => token.expires.is_some_and(|e| e < cutoff),
                Slot::Removed => false,
            };
            if expired {
                *slot.value_mut() = Slot::Removed;
                dropped += 1;
            }
        }
        dropped
    }
}
