//! Virtual host context handed to exchanges at initialisation.
//!
//! Exchanges never reach for process-wide state; whatever they need from the
//! surrounding broker (its name, where lifecycle events go) arrives here.

use crate::events::{ExchangeEventSink, TracingEventSink};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct VirtualHost {
    name: String,
    event_sink: Arc<dyn ExchangeEventSink>,
}

impl VirtualHost {
    /// Virtual host that logs lifecycle events through `tracing`
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_event_sink(name, Arc::new(TracingEventSink))
    }

    pub fn with_event_sink(name: impl Into<String>, event_sink: Arc<dyn ExchangeEventSink>) -> Self {
        Self {
            name: name.into(),
            event_sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_sink(&self) -> &Arc<dyn ExchangeEventSink> {
        &self.event_sink
    }
}
