//! Immutable binding value: (exchange, binding key, destination, arguments).

use crate::message::{FieldTable, FieldValue};
use crate::DestinationRef;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Declared relationship between an exchange and a destination queue.
///
/// Equality and hashing are structural: two bindings are the same when they
/// name the same exchange, binding key, destination (by name) and arguments.
#[derive(Debug, Clone)]
pub struct Binding {
    exchange: String,
    binding_key: String,
    destination: DestinationRef,
    arguments: FieldTable,
}

impl Binding {
    pub fn new(
        exchange: impl Into<String>,
        binding_key: impl Into<String>,
        destination: DestinationRef,
        arguments: FieldTable,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            binding_key: binding_key.into(),
            destination,
            arguments,
        }
    }

    /// Binding without arguments
    pub fn simple(
        exchange: impl Into<String>,
        binding_key: impl Into<String>,
        destination: DestinationRef,
    ) -> Self {
        Self::new(exchange, binding_key, destination, FieldTable::new())
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn binding_key(&self) -> &str {
        &self.binding_key
    }

    pub fn destination(&self) -> &DestinationRef {
        &self.destination
    }

    pub fn destination_name(&self) -> &str {
        self.destination.name()
    }

    pub fn arguments(&self) -> &FieldTable {
        &self.arguments
    }

    pub fn argument(&self, key: &str) -> Option<&FieldValue> {
        self.arguments.get(key)
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.exchange == other.exchange
            && self.binding_key == other.binding_key
            && self.destination.name() == other.destination.name()
            && self.arguments == other.arguments
    }
}

impl Eq for Binding {}

impl Hash for Binding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.exchange.hash(state);
        self.binding_key.hash(state);
        self.destination.name().hash(state);
        self.arguments.hash(state);
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Binding[{} -[{}]-> {}]",
            self.exchange,
            self.binding_key,
            self.destination.name()
        )
    }
}
