//! Exchange lifecycle events (audit trail).
//!
//! Emission is best effort: an [`crate::Exchange`] logs a sink failure and
//! carries on, it never fails `initialize` or `close` because of it.

use crate::error::Result;
use std::fmt;
use std::fmt::Debug;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    Created {
        exchange_type: String,
        name: String,
        durable: bool,
    },
    Deleted {
        name: String,
    },
}

impl ExchangeEvent {
    pub fn name(&self) -> &str {
        match self {
            ExchangeEvent::Created { name, .. } | ExchangeEvent::Deleted { name } => name,
        }
    }
}

impl fmt::Display for ExchangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeEvent::Created {
                exchange_type,
                name,
                durable,
            } => {
                if *durable {
                    write!(f, "Create: Type: {} Name: {} Durable", exchange_type, name)
                } else {
                    write!(f, "Create: Type: {} Name: {}", exchange_type, name)
                }
            }
            ExchangeEvent::Deleted { name } => write!(f, "Deleted: Name: {}", name),
        }
    }
}

/// Receiver of exchange lifecycle events
pub trait ExchangeEventSink: Send + Sync + Debug {
    fn emit(&self, event: &ExchangeEvent) -> Result<()>;
}

/// Default sink: writes events to the `tracing` log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl ExchangeEventSink for TracingEventSink {
    fn emit(&self, event: &ExchangeEvent) -> Result<()> {
        info!("[exchange] {}", event);
        Ok(())
    }
}
