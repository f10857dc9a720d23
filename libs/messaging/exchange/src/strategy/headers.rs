//! Headers routing: binding arguments are predicates over message headers.
//!
//! `x-match = "all"` (the default) needs every criterion to hold, `"any"`
//! needs at least one. Argument keys starting with `x-` are directives, not
//! criteria. A `Void` criterion only requires the header to be present.

use super::{unique_destinations, validate_key_length, ExchangeType, RoutingStrategy};
use crate::binding::Binding;
use crate::error::{ExchangeError, Result};
use crate::message::{FieldTable, FieldValue, InboundMessage};
use crate::DestinationRef;
use std::sync::Arc;

pub const X_MATCH: &str = "x-match";
const DIRECTIVE_PREFIX: &str = "x-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

impl MatchMode {
    /// Read `x-match` from binding arguments
    pub fn from_arguments(arguments: &FieldTable) -> std::result::Result<Self, String> {
        match arguments.get(X_MATCH) {
            None => Ok(MatchMode::All),
            Some(FieldValue::Str(mode)) if mode == "all" => Ok(MatchMode::All),
            Some(FieldValue::Str(mode)) if mode == "any" => Ok(MatchMode::Any),
            Some(other) => Err(format!(
                "{} must be \"all\" or \"any\", got '{}'",
                X_MATCH, other
            )),
        }
    }
}

/// True when `headers` satisfy the criteria in `arguments`
pub fn headers_match(arguments: &FieldTable, headers: &FieldTable) -> bool {
    let mode = match MatchMode::from_arguments(arguments) {
        Ok(mode) => mode,
        Err(_) => return false,
    };

    let mut criteria = arguments
        .iter()
        .filter(|(key, _)| !key.starts_with(DIRECTIVE_PREFIX))
        .peekable();

    let satisfied = |(key, expected): (&String, &FieldValue)| match (expected, headers.get(key)) {
        (_, None) => false,
        (FieldValue::Void, Some(_)) => true,
        (expected, Some(actual)) => expected == actual,
    };

    match mode {
        MatchMode::All => criteria.all(satisfied),
        MatchMode::Any => criteria.peek().is_some() && criteria.any(satisfied),
    }
}

#[derive(Debug, Default)]
pub struct HeadersStrategy;

impl HeadersStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl RoutingStrategy for HeadersStrategy {
    fn exchange_type(&self) -> ExchangeType {
        ExchangeType::Headers
    }

    fn validate_binding(&self, binding: &Binding) -> Result<()> {
        validate_key_length(&ExchangeType::Headers, binding.binding_key())?;
        MatchMode::from_arguments(binding.arguments())
            .map(|_| ())
            .map_err(|reason| ExchangeError::invalid_arguments("headers", reason))
    }

    fn match_bindings(
        &self,
        bindings: &[Arc<Binding>],
        message: &dyn InboundMessage,
    ) -> Vec<DestinationRef> {
        let headers = message.headers();
        unique_destinations(
            bindings
                .iter()
                .filter(|binding| headers_match(binding.arguments(), headers)),
        )
    }
}
