//! Copy-on-write binding collection owned by one exchange.
//!
//! Readers pin an `Arc<Vec<_>>` snapshot and iterate it without locks; a
//! concurrent writer publishes a replacement vector and never invalidates a
//! pinned snapshot. Writers publish through `ArcSwap::rcu`, which retries
//! against the latest vector, so concurrent adds are never lost.

use crate::binding::Binding;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Immutable, insertion-ordered view of the bindings at one instant
pub type BindingSnapshot = Arc<Vec<Arc<Binding>>>;

#[derive(Debug)]
pub struct BindingRegistry {
    bindings: ArcSwap<Vec<Arc<Binding>>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self {
            bindings: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append a binding, duplicates allowed.
    ///
    /// Returns the length of the snapshot this add published, which always
    /// includes the binding just added.
    pub fn add(&self, binding: Arc<Binding>) -> usize {
        let previous = self.bindings.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(binding.clone());
            next
        });
        previous.len() + 1
    }

    /// Append unless a structurally equal binding is already present.
    ///
    /// `None` means a duplicate was found and nothing was published.
    pub fn add_if_absent(&self, binding: Arc<Binding>) -> Option<usize> {
        let previous = self.bindings.rcu(|current| {
            if current.iter().any(|existing| **existing == *binding) {
                return Arc::clone(current);
            }
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(binding.clone());
            Arc::new(next)
        });

        if previous.iter().any(|existing| **existing == *binding) {
            None
        } else {
            Some(previous.len() + 1)
        }
    }

    /// Remove the first structurally equal binding
    pub fn remove(&self, binding: &Binding) -> bool {
        let previous = self.bindings.rcu(|current| {
            match current.iter().position(|existing| **existing == *binding) {
                Some(index) => {
                    let mut next = Vec::with_capacity(current.len() - 1);
                    next.extend(current[..index].iter().cloned());
                    next.extend(current[index + 1..].iter().cloned());
                    Arc::new(next)
                }
                None => Arc::clone(current),
            }
        });
        previous.iter().any(|existing| **existing == *binding)
    }

    /// Pin the current bindings for lock-free iteration
    pub fn snapshot(&self) -> BindingSnapshot {
        self.bindings.load_full()
    }

    pub fn contains(&self, binding: &Binding) -> bool {
        self.bindings
            .load()
            .iter()
            .any(|existing| **existing == *binding)
    }

    pub fn len(&self) -> usize {
        self.bindings.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.load().is_empty()
    }
}

impl Default for BindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
