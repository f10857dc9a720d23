//! Test doubles for exercising exchanges without a broker around them.

use crate::binding::Binding;
use crate::error::{ExchangeError, Result};
use crate::events::{ExchangeEvent, ExchangeEventSink};
use crate::exchange::Exchange;
use crate::hooks::BindingListener;
use crate::{Destination, DestinationRef};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory stand-in for a queue
#[derive(Debug)]
pub struct TestQueue {
    name: String,
    deleted: AtomicBool,
}

impl TestQueue {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            deleted: AtomicBool::new(false),
        })
    }

    /// New queue already erased to a [`DestinationRef`]
    pub fn shared(name: impl Into<String>) -> DestinationRef {
        Self::new(name)
    }

    pub fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }
}

impl Destination for TestQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }
}

/// Listener that records `key->queue` for every notification
#[derive(Debug, Default)]
pub struct RecordingListener {
    added: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added(&self) -> Vec<String> {
        self.added.lock().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }

    fn describe(binding: &Binding) -> String {
        format!("{}->{}", binding.binding_key(), binding.destination_name())
    }
}

impl BindingListener for RecordingListener {
    fn binding_added(&self, _exchange: &Exchange, binding: &Binding) {
        self.added.lock().push(Self::describe(binding));
    }

    fn binding_removed(&self, _exchange: &Exchange, binding: &Binding) {
        self.removed.lock().push(Self::describe(binding));
    }
}

/// Event sink that keeps every event it receives
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<ExchangeEvent>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExchangeEvent> {
        self.events.lock().clone()
    }
}

impl ExchangeEventSink for CollectingEventSink {
    fn emit(&self, event: &ExchangeEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Event sink whose every emission fails
#[derive(Debug, Default)]
pub struct FailingEventSink;

impl ExchangeEventSink for FailingEventSink {
    fn emit(&self, event: &ExchangeEvent) -> Result<()> {
        Err(ExchangeError::EventSink(format!(
            "audit log unavailable for {}",
            event.name()
        )))
    }
}

/// Event sink counting emissions per kind
#[derive(Debug, Default)]
pub struct CountingEventSink {
    created: AtomicU64,
    deleted: AtomicU64,
}

impl CountingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }
}

impl ExchangeEventSink for CountingEventSink {
    fn emit(&self, event: &ExchangeEvent) -> Result<()> {
        let counter = match event {
            ExchangeEvent::Created { .. } => &self.created,
            ExchangeEvent::Deleted { .. } => &self.deleted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
