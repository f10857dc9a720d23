//! # Routing Strategies
//!
//! An [`crate::Exchange`] owns exactly one [`RoutingStrategy`], chosen at
//! construction and never switched. The exchange owns the bindings, the
//! statistics and the deleted-destination filter; the strategy only answers
//! "which destinations do these bindings select for this message".
//!
//! | Type | Match rule |
//! |---|---|
//! | direct | binding key == routing key |
//! | topic | dotted pattern, `*` one word, `#` zero or more words |
//! | fanout | every binding |
//! | headers | `x-match` all/any over header criteria |
//!
//! Strategies must tolerate bind/unbind running concurrently with
//! `match_bindings`: they only ever see an immutable binding snapshot, and any
//! index they keep through `on_bind`/`on_unbind` is advisory.

pub mod direct;
pub mod fanout;
pub mod headers;
pub mod topic;

pub use direct::DirectStrategy;
pub use fanout::FanoutStrategy;
pub use headers::{HeadersStrategy, MatchMode};
pub use topic::{TopicPattern, TopicStrategy};

use crate::binding::Binding;
use crate::error::{ExchangeError, Result};
use crate::message::InboundMessage;
use crate::DestinationRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// AMQP short-string limit applied to binding keys
pub const MAX_BINDING_KEY_LENGTH: usize = 255;

/// Exchange type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExchangeType {
    Direct,
    Topic,
    Fanout,
    Headers,
    /// Externally supplied strategy, identified by its type name
    Custom(String),
}

impl ExchangeType {
    /// Types every virtual host pre-declares an `amq.*` exchange for
    pub const BUILTIN: [ExchangeType; 4] = [
        ExchangeType::Direct,
        ExchangeType::Topic,
        ExchangeType::Fanout,
        ExchangeType::Headers,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ExchangeType::Direct => "direct",
            ExchangeType::Topic => "topic",
            ExchangeType::Fanout => "fanout",
            ExchangeType::Headers => "headers",
            ExchangeType::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, ExchangeType::Custom(_))
    }

    /// Name of the pre-declared `amq.*` exchange for built-in types
    pub fn default_exchange_name(&self) -> Option<&'static str> {
        match self {
            ExchangeType::Direct => Some("amq.direct"),
            ExchangeType::Topic => Some("amq.topic"),
            ExchangeType::Fanout => Some("amq.fanout"),
            ExchangeType::Headers => Some("amq.match"),
            ExchangeType::Custom(_) => None,
        }
    }

    /// Fresh strategy instance for built-in types
    pub fn strategy(&self) -> Result<Box<dyn RoutingStrategy>> {
        match self {
            ExchangeType::Direct => Ok(Box::new(DirectStrategy::new())),
            ExchangeType::Topic => Ok(Box::new(TopicStrategy::new())),
            ExchangeType::Fanout => Ok(Box::new(FanoutStrategy::new())),
            ExchangeType::Headers => Ok(Box::new(HeadersStrategy::new())),
            ExchangeType::Custom(name) => Err(ExchangeError::UnknownExchangeType(name.clone())),
        }
    }

    /// Capitalised prefix used in `Display` of an exchange, e.g. `Topic`
    pub(crate) fn display_prefix(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl From<String> for ExchangeType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "direct" => ExchangeType::Direct,
            "topic" => ExchangeType::Topic,
            "fanout" => ExchangeType::Fanout,
            "headers" => ExchangeType::Headers,
            _ => ExchangeType::Custom(name),
        }
    }
}

impl From<&str> for ExchangeType {
    fn from(name: &str) -> Self {
        ExchangeType::from(name.to_string())
    }
}

impl From<ExchangeType> for String {
    fn from(exchange_type: ExchangeType) -> Self {
        exchange_type.as_str().to_string()
    }
}

impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific matching of bindings against a message
pub trait RoutingStrategy: Send + Sync + Debug {
    fn exchange_type(&self) -> ExchangeType;

    /// Reject malformed bindings before they reach the registry
    fn validate_binding(&self, binding: &Binding) -> Result<()> {
        validate_key_length(&self.exchange_type(), binding.binding_key())
    }

    /// Called after a binding became visible in the registry
    fn on_bind(&self, _binding: &Binding) {}

    /// Called before a binding is withdrawn from the registry
    fn on_unbind(&self, _binding: &Binding) {}

    /// Destinations selected by `bindings` for `message`.
    ///
    /// Must be free of side effects on statistics and must not assume
    /// `bindings` reflects the latest registry state.
    fn match_bindings(
        &self,
        bindings: &[Arc<Binding>],
        message: &dyn InboundMessage,
    ) -> Vec<DestinationRef>;
}

pub(crate) fn validate_key_length(exchange_type: &ExchangeType, key: &str) -> Result<()> {
    if key.len() > MAX_BINDING_KEY_LENGTH {
        return Err(ExchangeError::invalid_binding_key(
            exchange_type.as_str(),
            key,
            format!(
                "binding key is {} bytes, limit is {}",
                key.len(),
                MAX_BINDING_KEY_LENGTH
            ),
        ));
    }
    Ok(())
}

/// Collect destinations of matching bindings, one entry per destination name.
///
/// The entry keeps the position of the first occurrence. A live destination
/// replaces a deleted one of the same name, so a queue recreated under an old
/// name is never shadowed by bindings still pointing at its predecessor.
pub fn unique_destinations<'a, I>(bindings: I) -> Vec<DestinationRef>
where
    I: IntoIterator<Item = &'a Arc<Binding>>,
{
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut destinations: Vec<DestinationRef> = Vec::new();
    for binding in bindings {
        let destination = binding.destination();
        match positions.get(binding.destination_name()) {
            Some(&index) => {
                if destinations[index].is_deleted() && !destination.is_deleted() {
                    destinations[index] = destination.clone();
                }
            }
            None => {
                positions.insert(binding.destination_name(), destinations.len());
                destinations.push(destination.clone());
            }
        }
    }
    destinations
}
