//! Referrer tracking for alternate-exchange links.
//!
//! Membership only: a referrer entry never keeps the referrer alive and never
//! controls the lifetime of the exchange it points at. Deletion policy reads
//! [`ReferenceTracker::has_referrers`] and decides for itself.

use dashmap::DashMap;
use std::fmt;
use uuid::Uuid;

/// Identity of an entity that points at an exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferrerId {
    /// Another exchange using this one as its alternate
    Exchange(Uuid),
    /// A queue configured with this exchange as its alternate
    Queue(String),
}

impl fmt::Display for ReferrerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferrerId::Exchange(id) => write!(f, "exchange-{}", id.simple()),
            ReferrerId::Queue(name) => write!(f, "queue:{}", name),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReferenceTracker {
    /// Referrer identity to a display name used in logs
    referrers: DashMap<ReferrerId, String>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the referrer was not already tracked
    pub fn add(&self, referrer: ReferrerId, display_name: impl Into<String>) -> bool {
        self.referrers
            .insert(referrer, display_name.into())
            .is_none()
    }

    /// Returns `true` when the referrer was tracked
    pub fn remove(&self, referrer: &ReferrerId) -> bool {
        self.referrers.remove(referrer).is_some()
    }

    pub fn contains(&self, referrer: &ReferrerId) -> bool {
        self.referrers.contains_key(referrer)
    }

    pub fn has_referrers(&self) -> bool {
        !self.referrers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.referrers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.referrers.is_empty()
    }

    pub fn referrers(&self) -> Vec<ReferrerId> {
        self.referrers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Display names of current referrers, for diagnostics
    pub fn referrer_names(&self) -> Vec<String> {
        self.referrers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
