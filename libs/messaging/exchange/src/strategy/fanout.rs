//! Fanout routing: every bound destination, routing key ignored.

use super::{unique_destinations, ExchangeType, RoutingStrategy};
use crate::binding::Binding;
use crate::message::InboundMessage;
use crate::DestinationRef;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct FanoutStrategy;

impl FanoutStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl RoutingStrategy for FanoutStrategy {
    fn exchange_type(&self) -> ExchangeType {
        ExchangeType::Fanout
    }

    fn match_bindings(
        &self,
        bindings: &[Arc<Binding>],
        _message: &dyn InboundMessage,
    ) -> Vec<DestinationRef> {
        unique_destinations(bindings)
    }
}
