//! # Exchange Core
//!
//! Routing core of an AMQP-style broker: exchanges receive published
//! messages and pick the bound destination queues that should get a copy.
//!
//! ## Architecture
//!
//! ```text
//! publisher ──route()──▶ Exchange ──snapshot──▶ BindingRegistry
//!                           │                        │
//!                           ▼                        ▼
//!                    RoutingStrategy ◀── &[Arc<Binding>]
//!                 (direct/topic/fanout/headers)
//!                           │
//!                           ▼
//!                 Vec<DestinationRef> (deleted queues filtered out)
//! ```
//!
//! The publish path takes no locks: bindings live in a copy-on-write
//! snapshot, statistics are atomics. Binding mutations, alternate-exchange
//! changes and `close` may run concurrently with routing from any thread.
//!
//! ## Usage
//!
//! ```rust
//! use exchange_core::{Exchange, ExchangeType, FieldTable, Message, VirtualHost};
//! use exchange_core::test_utils::TestQueue;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! let host = Arc::new(VirtualHost::new("default"));
//! let exchange = Exchange::of_type(&ExchangeType::Topic)?;
//! exchange.initialize(Uuid::new_v4(), host, "orders", true, false)?;
//!
//! exchange.bind("orders.*.created", TestQueue::shared("created"), FieldTable::new())?;
//! exchange.bind("orders.#", TestQueue::shared("audit"), FieldTable::new())?;
//!
//! let routed = exchange.route(&Message::new("orders.eu.created", b"{}".to_vec()))?;
//! assert_eq!(routed.len(), 2);
//! assert_eq!(exchange.msg_routes(), 1);
//! # Ok::<(), exchange_core::ExchangeError>(())
//! ```

pub mod binding;
pub mod binding_registry;
pub mod config;
pub mod error;
pub mod events;
pub mod exchange;
pub mod hooks;
pub mod host;
pub mod message;
pub mod references;
pub mod registry;
pub mod stats;
pub mod strategy;
pub mod test_utils;

use std::fmt::Debug;
use std::sync::Arc;

pub use binding::Binding;
pub use binding_registry::{BindingRegistry, BindingSnapshot};
pub use config::{ExchangeConfig, ExchangesConfig};
pub use error::{ExchangeError, Result};
pub use events::{ExchangeEvent, ExchangeEventSink, TracingEventSink};
pub use exchange::{Exchange, ExchangeIdentity};
pub use hooks::{BindingListener, CallbackList, CloseTask};
pub use host::VirtualHost;
pub use message::{FieldTable, FieldValue, InboundMessage, Message};
pub use references::{ReferenceTracker, ReferrerId};
pub use registry::{ExchangeRegistry, DEFAULT_EXCHANGE_NAME};
pub use stats::{RoutingStatistics, StatisticsSnapshot};
pub use strategy::{
    DirectStrategy, ExchangeType, FanoutStrategy, HeadersStrategy, MatchMode, RoutingStrategy,
    TopicPattern, TopicStrategy, MAX_BINDING_KEY_LENGTH,
};

/// A queue as seen by the routing core
///
/// The core never enqueues; it only names destinations and skips the ones
/// that report themselves deleted.
pub trait Destination: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn is_deleted(&self) -> bool;
}

/// Shared handle to a destination
pub type DestinationRef = Arc<dyn Destination>;
