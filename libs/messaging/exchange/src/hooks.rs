//! Close tasks and binding listeners.
//!
//! Both are kept in a [`CallbackList`], a copy-on-write list so that invoking
//! callbacks never races with registration from another thread.

use crate::binding::Binding;
use crate::exchange::Exchange;
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;

/// Work run exactly once when an exchange closes
pub trait CloseTask: Send + Sync {
    fn on_close(&self, exchange: &Exchange);
}

impl<F> CloseTask for F
where
    F: Fn(&Exchange) + Send + Sync,
{
    fn on_close(&self, exchange: &Exchange) {
        self(exchange)
    }
}

/// Observer of binding changes.
///
/// `binding_added` fires after the binding is visible in the registry,
/// `binding_removed` fires while it is still visible.
pub trait BindingListener: Send + Sync {
    fn binding_added(&self, exchange: &Exchange, binding: &Binding);

    fn binding_removed(&self, exchange: &Exchange, binding: &Binding);
}

/// Ordered, snapshot-iterable list of shared callbacks
pub struct CallbackList<T: ?Sized> {
    entries: ArcSwap<Vec<Arc<T>>>,
}

impl<T: ?Sized> CallbackList<T> {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn add(&self, entry: Arc<T>) {
        self.entries.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(entry.clone());
            next
        });
    }

    /// Remove the first entry that is the same allocation as `entry`
    pub fn remove(&self, entry: &Arc<T>) -> bool {
        let previous = self.entries.rcu(|current| {
            match current.iter().position(|existing| Arc::ptr_eq(existing, entry)) {
                Some(index) => {
                    let mut next: Vec<Arc<T>> = current.iter().cloned().collect();
                    next.remove(index);
                    Arc::new(next)
                }
                None => Arc::clone(current),
            }
        });
        previous.iter().any(|existing| Arc::ptr_eq(existing, entry))
    }

    /// Registration-ordered view, unaffected by later changes
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.entries.load_full()
    }

    /// Atomically empty the list, returning what it held
    pub fn take(&self) -> Arc<Vec<Arc<T>>> {
        self.entries.swap(Arc::new(Vec::new()))
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}

impl<T: ?Sized> Default for CallbackList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for CallbackList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackList")
            .field("len", &self.len())
            .finish()
    }
}
