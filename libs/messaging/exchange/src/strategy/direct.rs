//! Direct routing: exact binding-key match.

use super::{unique_destinations, ExchangeType, RoutingStrategy};
use crate::binding::Binding;
use crate::message::InboundMessage;
use crate::DestinationRef;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct DirectStrategy;

impl DirectStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl RoutingStrategy for DirectStrategy {
    fn exchange_type(&self) -> ExchangeType {
        ExchangeType::Direct
    }

    fn match_bindings(
        &self,
        bindings: &[Arc<Binding>],
        message: &dyn InboundMessage,
    ) -> Vec<DestinationRef> {
        let routing_key = message.routing_key();
        unique_destinations(
            bindings
                .iter()
                .filter(|binding| binding.binding_key() == routing_key),
        )
    }
}
