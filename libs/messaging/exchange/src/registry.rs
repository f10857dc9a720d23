//! Exchange registry for one virtual host
//!
//! Name → exchange lookup used by whatever sits above the routing core
//! (channel handlers, the management layer). It also owns the deletion
//! policy the core leaves to its caller: an exchange that other exchanges or
//! queues still reference cannot be unregistered.

use crate::config::{is_builtin_name, ExchangesConfig};
use crate::error::{ExchangeError, Result};
use crate::exchange::Exchange;
use crate::host::VirtualHost;
use crate::strategy::ExchangeType;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Name of the nameless default exchange every virtual host carries
pub const DEFAULT_EXCHANGE_NAME: &str = "";

#[derive(Debug)]
pub struct ExchangeRegistry {
    host: Arc<VirtualHost>,
    exchanges: DashMap<String, Arc<Exchange>>,
}

impl ExchangeRegistry {
    /// Empty registry
    pub fn new(host: Arc<VirtualHost>) -> Self {
        Self {
            host,
            exchanges: DashMap::new(),
        }
    }

    /// Registry holding the default exchange and the `amq.*` exchanges
    pub fn with_defaults(host: Arc<VirtualHost>) -> Result<Self> {
        let registry = Self::new(host);
        registry.declare_builtin(DEFAULT_EXCHANGE_NAME, ExchangeType::Direct)?;
        for exchange_type in ExchangeType::BUILTIN {
            if let Some(name) = exchange_type.default_exchange_name() {
                registry.declare_builtin(name, exchange_type)?;
            }
        }
        Ok(registry)
    }

    /// Build from validated TOML declarations, then wire alternates
    pub fn from_config(host: Arc<VirtualHost>, config: &ExchangesConfig) -> Result<Self> {
        config.validate()?;
        let registry = Self::with_defaults(host)?;

        for name in config.names() {
            if let Some(declaration) = config.get(name) {
                registry.declare(
                    name,
                    declaration.exchange_type.clone(),
                    declaration.durable,
                    declaration.auto_delete,
                )?;
            }
        }

        for name in config.names() {
            let alternate = config
                .get(name)
                .and_then(|declaration| declaration.alternate_exchange.as_deref());
            if let Some(alternate) = alternate {
                registry.set_alternate(name, Some(alternate))?;
            }
        }

        info!(
            "Exchange registry for vhost {} loaded with {} exchanges",
            registry.host.name(),
            registry.len()
        );
        Ok(registry)
    }

    pub fn host(&self) -> &Arc<VirtualHost> {
        &self.host
    }

    /// Declare an exchange, or return the existing one when the type agrees.
    ///
    /// The created event is emitted after the registry entry is released, so
    /// an event sink may call back into the registry.
    pub fn declare(
        &self,
        name: &str,
        exchange_type: ExchangeType,
        durable: bool,
        auto_delete: bool,
    ) -> Result<Arc<Exchange>> {
        let exchange = match self.exchanges.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                let existing_type = existing.exchange_type();
                if existing_type != exchange_type {
                    warn!(
                        "Refusing to redeclare exchange '{}' as {} (declared {})",
                        name, exchange_type, existing_type
                    );
                    return Err(ExchangeError::TypeMismatch {
                        name: name.to_string(),
                        existing: existing_type.to_string(),
                        requested: exchange_type.to_string(),
                    });
                }
                return Ok(existing.clone());
            }
            Entry::Vacant(slot) => {
                let exchange = Exchange::of_type(&exchange_type)?;
                exchange.assign_identity(
                    Uuid::new_v4(),
                    self.host.clone(),
                    name,
                    durable,
                    auto_delete,
                )?;
                let exchange = Arc::new(exchange);
                slot.insert(exchange.clone());
                exchange
            }
        };

        exchange.announce_created();
        info!("Declared {} on vhost {}", exchange, self.host.name());
        Ok(exchange)
    }

    /// Register an already initialised exchange, e.g. one with a custom strategy
    pub fn register(&self, exchange: Arc<Exchange>) -> Result<()> {
        let name = exchange
            .name()
            .ok_or(ExchangeError::NotInitialized)?
            .to_string();
        match self.exchanges.entry(name) {
            Entry::Occupied(existing) => Err(ExchangeError::AlreadyExists(existing.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(exchange);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Exchange>> {
        self.exchanges.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.exchanges.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .exchanges
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Remove and close an exchange nothing refers to any more
    pub fn unregister(&self, name: &str) -> Result<Arc<Exchange>> {
        let removed = self
            .exchanges
            .remove_if(name, |_, exchange| !exchange.has_referrers());

        let (_, exchange) = match removed {
            Some(entry) => entry,
            None => {
                return match self.exchanges.get(name) {
                    Some(exchange) => {
                        let referrers = exchange.references().len();
                        warn!(
                            "Cannot delete exchange '{}': {} referrer(s) remain",
                            name, referrers
                        );
                        Err(ExchangeError::ExchangeInUse {
                            name: name.to_string(),
                            referrers,
                        })
                    }
                    None => Err(ExchangeError::NotFound(name.to_string())),
                };
            }
        };

        exchange.close()?;
        Ok(exchange)
    }

    /// Point `name` at `alternate` (or clear it with `None`)
    pub fn set_alternate(&self, name: &str, alternate: Option<&str>) -> Result<()> {
        let exchange = self
            .lookup(name)
            .ok_or_else(|| ExchangeError::NotFound(name.to_string()))?;
        let alternate = match alternate {
            Some(alternate_name) => Some(
                self.lookup(alternate_name)
                    .ok_or_else(|| ExchangeError::NotFound(alternate_name.to_string()))?,
            ),
            None => None,
        };
        exchange.set_alternate_exchange(alternate.as_ref())
    }

    fn declare_builtin(&self, name: &str, exchange_type: ExchangeType) -> Result<()> {
        debug_assert!(name.is_empty() || is_builtin_name(name));
        self.declare(name, exchange_type, true, false).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{FieldTable, Message};
    use crate::test_utils::{CollectingEventSink, TestQueue};
    use crate::events::ExchangeEvent;
    use crate::references::ReferrerId;

    fn host() -> Arc<VirtualHost> {
        Arc::new(VirtualHost::new("test"))
    }

    #[test]
    fn test_defaults_declared() {
        let registry = ExchangeRegistry::with_defaults(host()).unwrap();
        assert_eq!(
            registry.names(),
            vec!["", "amq.direct", "amq.fanout", "amq.match", "amq.topic"]
        );
        assert_eq!(
            registry.lookup("amq.match").unwrap().exchange_type(),
            ExchangeType::Headers
        );
        assert!(registry.lookup("").unwrap().is_durable());
    }

    #[test]
    fn test_declare_is_idempotent_for_same_type() {
        let registry = ExchangeRegistry::new(host());
        let first = registry
            .declare("orders", ExchangeType::Topic, true, false)
            .unwrap();
        let second = registry
            .declare("orders", ExchangeType::Topic, false, true)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.is_durable());

        let err = registry
            .declare("orders", ExchangeType::Fanout, true, false)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::TypeMismatch { .. }));
    }

    /// Sink that looks every created exchange up in the registry it serves
    #[derive(Debug, Default)]
    struct LookupOnCreateSink {
        registry: std::sync::OnceLock<std::sync::Weak<ExchangeRegistry>>,
        seen: parking_lot::Mutex<Vec<(String, bool)>>,
    }

    impl crate::events::ExchangeEventSink for LookupOnCreateSink {
        fn emit(&self, event: &ExchangeEvent) -> Result<()> {
            let Some(registry) = self.registry.get().and_then(|weak| weak.upgrade()) else {
                return Ok(());
            };
            if let ExchangeEvent::Created { name, .. } = event {
                let found = registry.lookup(name).is_some();
                self.seen.lock().push((name.clone(), found));
            }
            Ok(())
        }
    }

    #[test]
    fn test_created_sink_may_reenter_registry() {
        let sink = Arc::new(LookupOnCreateSink::default());
        let host = Arc::new(VirtualHost::with_event_sink("test", sink.clone()));
        let registry = Arc::new(ExchangeRegistry::with_defaults(host).unwrap());
        sink.registry.set(Arc::downgrade(&registry)).unwrap();

        let declared = registry
            .declare("orders", ExchangeType::Topic, false, false)
            .unwrap();
        assert_eq!(declared.name(), Some("orders"));
        assert_eq!(*sink.seen.lock(), vec![("orders".to_string(), true)]);

        // existing exchanges are returned without a second event
        registry
            .declare("orders", ExchangeType::Topic, false, false)
            .unwrap();
        assert_eq!(sink.seen.lock().len(), 1);
    }

    #[test]
    fn test_declare_unknown_type_fails() {
        let registry = ExchangeRegistry::new(host());
        let err = registry
            .declare("odd", ExchangeType::from("x-delayed"), false, false)
            .unwrap_err();
        assert_eq!(err, ExchangeError::UnknownExchangeType("x-delayed".to_string()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_vetoed_while_referenced() {
        let sink = Arc::new(CollectingEventSink::new());
        let host = Arc::new(VirtualHost::with_event_sink("test", sink.clone()));
        let registry = ExchangeRegistry::new(host);
        registry.declare("main", ExchangeType::Direct, false, false).unwrap();
        let alt = registry
            .declare("alt", ExchangeType::Fanout, false, false)
            .unwrap();
        registry.set_alternate("main", Some("alt")).unwrap();

        let err = registry.unregister("alt").unwrap_err();
        assert_eq!(
            err,
            ExchangeError::ExchangeInUse {
                name: "alt".to_string(),
                referrers: 1
            }
        );
        assert!(registry.contains("alt"));
        assert!(!alt.is_closed());

        registry.set_alternate("main", None).unwrap();
        let removed = registry.unregister("alt").unwrap();
        assert!(removed.is_closed());
        assert!(!registry.contains("alt"));
        assert!(sink.events().contains(&ExchangeEvent::Deleted {
            name: "alt".to_string()
        }));

        assert_eq!(
            registry.unregister("alt").unwrap_err(),
            ExchangeError::NotFound("alt".to_string())
        );
    }

    #[test]
    fn test_queue_referrer_blocks_deletion() {
        let registry = ExchangeRegistry::new(host());
        let exchange = registry
            .declare("dlx", ExchangeType::Fanout, false, false)
            .unwrap();
        let queue = ReferrerId::Queue("orders".to_string());
        exchange.add_reference(queue.clone(), "orders");

        assert!(registry.unregister("dlx").is_err());
        exchange.remove_reference(&queue);
        assert!(registry.unregister("dlx").is_ok());
    }

    #[test]
    fn test_register_prebuilt_exchange() {
        let registry = ExchangeRegistry::new(host());
        let exchange = Exchange::of_type(&ExchangeType::Direct).unwrap();
        assert!(registry.register(Arc::new(Exchange::of_type(&ExchangeType::Direct).unwrap())).is_err());

        exchange
            .initialize(Uuid::new_v4(), registry.host().clone(), "rpc", false, false)
            .unwrap();
        let exchange = Arc::new(exchange);
        registry.register(exchange.clone()).unwrap();
        assert!(Arc::ptr_eq(&registry.lookup("rpc").unwrap(), &exchange));
        assert_eq!(
            registry.register(exchange).unwrap_err(),
            ExchangeError::AlreadyExists("rpc".to_string())
        );
    }

    #[test]
    fn test_from_config_wires_alternates() {
        let config = ExchangesConfig::from_toml(
            r#"
            [exchanges.orders]
            type = "topic"
            durable = true
            alternate_exchange = "orders.unroutable"

            [exchanges."orders.unroutable"]
            type = "fanout"
            "#,
        )
        .unwrap();
        let registry = ExchangeRegistry::from_config(host(), &config).unwrap();
        assert_eq!(registry.len(), 7);

        let orders = registry.lookup("orders").unwrap();
        let unroutable = registry.lookup("orders.unroutable").unwrap();
        assert!(orders.is_durable());
        assert!(Arc::ptr_eq(&orders.alternate_exchange().unwrap(), &unroutable));
        assert!(unroutable.has_referrers());

        unroutable
            .bind("", TestQueue::shared("lost"), FieldTable::new())
            .unwrap();
        let routed = unroutable.route(&Message::new("anything", vec![])).unwrap();
        assert_eq!(routed.len(), 1);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = ExchangesConfig::from_toml(
            r#"
            [exchanges.a]
            type = "direct"
            alternate_exchange = "a"
            "#,
        )
        .unwrap();
        assert!(ExchangeRegistry::from_config(host(), &config).is_err());
    }
}
