//! # Exchange
//!
//! The routing entity: owns its bindings, statistics, referrer set, close
//! tasks and binding listeners, and delegates the matching decision to a
//! [`RoutingStrategy`].
//!
//! ## Lifecycle
//!
//! 1. `Exchange::new` / `Exchange::of_type` builds an uninitialised exchange
//! 2. `initialize` assigns identity exactly once and emits a Created event
//! 3. steady state: `route`, `add_binding`, `remove_binding` from any thread
//! 4. `close` runs once (first caller wins), detaches the alternate, emits
//!    Deleted and drains the close tasks
//!
//! ## Concurrency
//!
//! Nothing on the publish path takes a lock. Bindings and callback lists are
//! copy-on-write snapshots, counters are atomics, the close gate is a single
//! compare-and-swap. The only mutex guards the alternate-exchange pointer so
//! that the referrer bookkeeping on old and new alternates stays paired.
//!
//! ## Ordering of binding hooks
//!
//! - add: registry insert → high-water update → listeners → `on_bind`
//! - remove: `on_unbind` → listeners → registry removal

use crate::binding::Binding;
use crate::binding_registry::{BindingRegistry, BindingSnapshot};
use crate::error::{ExchangeError, Result};
use crate::events::ExchangeEvent;
use crate::hooks::{BindingListener, CallbackList, CloseTask};
use crate::host::VirtualHost;
use crate::message::{FieldTable, InboundMessage};
use crate::references::{ReferenceTracker, ReferrerId};
use crate::stats::{RoutingStatistics, StatisticsSnapshot};
use crate::strategy::{ExchangeType, RoutingStrategy};
use crate::DestinationRef;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::SystemTime;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identity fixed by `initialize`
#[derive(Debug, Clone)]
pub struct ExchangeIdentity {
    pub id: Uuid,
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub host: Arc<VirtualHost>,
}

pub struct Exchange {
    strategy: Box<dyn RoutingStrategy>,
    identity: OnceLock<ExchangeIdentity>,
    closed: AtomicBool,
    create_time: SystemTime,

    bindings: BindingRegistry,
    references: ReferenceTracker,
    stats: RoutingStatistics,
    close_tasks: CallbackList<dyn CloseTask>,
    listeners: CallbackList<dyn BindingListener>,

    /// Non-owning: the alternate's lifetime belongs to whoever registered it
    alternate: Mutex<Option<Weak<Exchange>>>,
}

impl Exchange {
    /// Uninitialised exchange using `strategy` for the rest of its life
    pub fn new(strategy: Box<dyn RoutingStrategy>) -> Self {
        Self {
            strategy,
            identity: OnceLock::new(),
            closed: AtomicBool::new(false),
            create_time: SystemTime::now(),
            bindings: BindingRegistry::new(),
            references: ReferenceTracker::new(),
            stats: RoutingStatistics::new(),
            close_tasks: CallbackList::new(),
            listeners: CallbackList::new(),
            alternate: Mutex::new(None),
        }
    }

    /// Uninitialised exchange with the built-in strategy for `exchange_type`
    pub fn of_type(exchange_type: &ExchangeType) -> Result<Self> {
        Ok(Self::new(exchange_type.strategy()?))
    }

    /// One-time setup. Emits an exchange-created event.
    pub fn initialize(
        &self,
        id: Uuid,
        host: Arc<VirtualHost>,
        name: impl Into<String>,
        durable: bool,
        auto_delete: bool,
    ) -> Result<()> {
        self.assign_identity(id, host, name, durable, auto_delete)?;
        self.announce_created();
        Ok(())
    }

    /// Set identity without emitting; callers holding locks the event sink
    /// may need emit later through `announce_created`
    pub(crate) fn assign_identity(
        &self,
        id: Uuid,
        host: Arc<VirtualHost>,
        name: impl Into<String>,
        durable: bool,
        auto_delete: bool,
    ) -> Result<()> {
        let identity = ExchangeIdentity {
            id,
            name: name.into(),
            durable,
            auto_delete,
            host,
        };

        if self.identity.set(identity).is_err() {
            return Err(ExchangeError::AlreadyInitialized {
                name: self.name().unwrap_or_default().to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn announce_created(&self) {
        let Some(identity) = self.identity.get() else {
            return;
        };
        self.emit(ExchangeEvent::Created {
            exchange_type: self.exchange_type().to_string(),
            name: identity.name.clone(),
            durable: identity.durable,
        });
    }

    pub fn identity(&self) -> Result<&ExchangeIdentity> {
        self.identity.get().ok_or(ExchangeError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.identity.get().is_some()
    }

    pub fn id(&self) -> Option<Uuid> {
        self.identity.get().map(|identity| identity.id)
    }

    pub fn name(&self) -> Option<&str> {
        self.identity.get().map(|identity| identity.name.as_str())
    }

    pub fn is_durable(&self) -> bool {
        self.identity.get().map_or(false, |identity| identity.durable)
    }

    pub fn is_auto_delete(&self) -> bool {
        self.identity
            .get()
            .map_or(false, |identity| identity.auto_delete)
    }

    pub fn virtual_host(&self) -> Option<&Arc<VirtualHost>> {
        self.identity.get().map(|identity| &identity.host)
    }

    pub fn exchange_type(&self) -> ExchangeType {
        self.strategy.exchange_type()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn create_time(&self) -> SystemTime {
        self.create_time
    }

    /// Identity of this exchange when it acts as a referrer of another
    pub fn referrer_id(&self) -> Result<ReferrerId> {
        Ok(ReferrerId::Exchange(self.identity()?.id))
    }

    /// Route one message.
    ///
    /// Counts the message as received, asks the strategy for candidates
    /// against the current binding snapshot, drops candidates that report
    /// themselves deleted, then counts the message as routed or dropped.
    /// Fails only when the exchange was never initialised.
    pub fn route(&self, message: &dyn InboundMessage) -> Result<Vec<DestinationRef>> {
        let identity = self.identity()?;
        let size = message.size();
        self.stats.record_received(size);

        let snapshot = self.bindings.snapshot();
        let mut destinations = self.strategy.match_bindings(&snapshot, message);

        destinations.retain(|destination| {
            if destination.is_deleted() {
                debug!(
                    "Exchange: {} - attempt to enqueue message onto deleted queue {}",
                    identity.name,
                    destination.name()
                );
                false
            } else {
                true
            }
        });

        if destinations.is_empty() {
            self.stats.record_dropped(size);
        } else {
            self.stats.record_routed(size);
        }
        Ok(destinations)
    }

    /// Add a binding.
    ///
    /// Returns `Ok(false)` when a structurally identical binding already
    /// exists; no listener or strategy hook runs in that case.
    pub fn add_binding(&self, binding: Binding) -> Result<bool> {
        let identity = self.identity()?;
        if self.is_closed() {
            return Err(ExchangeError::Closed {
                name: identity.name.clone(),
            });
        }
        if binding.exchange() != identity.name {
            return Err(ExchangeError::ExchangeMismatch {
                binding_exchange: binding.exchange().to_string(),
                exchange: identity.name.clone(),
            });
        }
        self.strategy.validate_binding(&binding)?;

        let binding = Arc::new(binding);
        let Some(size) = self.bindings.add_if_absent(binding.clone()) else {
            debug!("{} ignoring duplicate {}", self, binding);
            return Ok(false);
        };
        self.stats.observe_binding_count(size as u64);

        for listener in self.listeners.snapshot().iter() {
            listener.binding_added(self, &binding);
        }
        self.strategy.on_bind(&binding);
        Ok(true)
    }

    /// Remove a binding.
    ///
    /// Returns `Ok(false)` when no structurally identical binding exists.
    pub fn remove_binding(&self, binding: &Binding) -> Result<bool> {
        self.identity()?;
        if !self.bindings.contains(binding) {
            debug!("{} has no {} to remove", self, binding);
            return Ok(false);
        }

        self.strategy.on_unbind(binding);
        for listener in self.listeners.snapshot().iter() {
            listener.binding_removed(self, binding);
        }
        Ok(self.bindings.remove(binding))
    }

    /// Bind `destination` under `binding_key` on this exchange
    pub fn bind(
        &self,
        binding_key: impl Into<String>,
        destination: DestinationRef,
        arguments: FieldTable,
    ) -> Result<bool> {
        let name = self.identity()?.name.clone();
        self.add_binding(Binding::new(name, binding_key, destination, arguments))
    }

    pub fn unbind(
        &self,
        binding_key: impl Into<String>,
        destination: DestinationRef,
        arguments: FieldTable,
    ) -> Result<bool> {
        let name = self.identity()?.name.clone();
        self.remove_binding(&Binding::new(name, binding_key, destination, arguments))
    }

    /// Read-only, insertion-ordered view of the current bindings
    pub fn bindings(&self) -> BindingSnapshot {
        self.bindings.snapshot()
    }

    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }

    pub fn is_bound_with_arguments(
        &self,
        binding_key: &str,
        arguments: &FieldTable,
        destination_name: &str,
    ) -> bool {
        self.bindings.snapshot().iter().any(|binding| {
            binding.binding_key() == binding_key
                && binding.destination_name() == destination_name
                && binding.arguments() == arguments
        })
    }

    pub fn is_bound(&self, binding_key: &str, destination_name: &str) -> bool {
        self.bindings.snapshot().iter().any(|binding| {
            binding.binding_key() == binding_key && binding.destination_name() == destination_name
        })
    }

    pub fn is_key_bound(&self, binding_key: &str) -> bool {
        self.bindings
            .snapshot()
            .iter()
            .any(|binding| binding.binding_key() == binding_key)
    }

    pub fn is_queue_bound(&self, destination_name: &str) -> bool {
        self.bindings
            .snapshot()
            .iter()
            .any(|binding| binding.destination_name() == destination_name)
    }

    /// Close the exchange.
    ///
    /// Returns `Ok(true)` for the one caller that ran the close body and
    /// `Ok(false)` for everyone else.
    pub fn close(&self) -> Result<bool> {
        let identity = self.identity()?;
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }

        let previous = self.alternate.lock().take();
        if let Some(alternate) = previous.and_then(|weak| weak.upgrade()) {
            alternate.remove_reference(&ReferrerId::Exchange(identity.id));
        }

        self.emit(ExchangeEvent::Deleted {
            name: identity.name.clone(),
        });

        for task in self.close_tasks.take().iter() {
            task.on_close(self);
        }
        Ok(true)
    }

    pub fn alternate_exchange(&self) -> Option<Arc<Exchange>> {
        self.alternate
            .lock()
            .as_ref()
            .and_then(|weak| weak.upgrade())
    }

    /// Point this exchange at a new alternate (or none).
    ///
    /// Moves this exchange's referrer entry from the old alternate to the new
    /// one. Re-setting the current alternate is a no-op. Fails with `Closed`
    /// once the exchange is closed.
    pub fn set_alternate_exchange(&self, alternate: Option<&Arc<Exchange>>) -> Result<()> {
        let identity = self.identity()?;
        let me = ReferrerId::Exchange(identity.id);

        let mut slot = self.alternate.lock();
        // checked under the slot lock: close() flips the flag before taking it
        if self.is_closed() {
            return Err(ExchangeError::Closed {
                name: identity.name.clone(),
            });
        }
        let unchanged = match (slot.as_ref(), alternate) {
            (Some(current), Some(next)) => std::ptr::eq(current.as_ptr(), Arc::as_ptr(next)),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        if let Some(old) = slot.as_ref().and_then(|weak| weak.upgrade()) {
            old.remove_reference(&me);
        }
        if let Some(next) = alternate {
            next.add_reference(me, identity.name.clone());
        }
        *slot = alternate.map(Arc::downgrade);
        Ok(())
    }

    pub fn add_reference(&self, referrer: ReferrerId, display_name: impl Into<String>) -> bool {
        self.references.add(referrer, display_name)
    }

    pub fn remove_reference(&self, referrer: &ReferrerId) -> bool {
        self.references.remove(referrer)
    }

    pub fn has_referrers(&self) -> bool {
        self.references.has_referrers()
    }

    pub fn references(&self) -> &ReferenceTracker {
        &self.references
    }

    pub fn add_close_task(&self, task: Arc<dyn CloseTask>) {
        self.close_tasks.add(task);
    }

    pub fn remove_close_task(&self, task: &Arc<dyn CloseTask>) -> bool {
        self.close_tasks.remove(task)
    }

    pub fn add_binding_listener(&self, listener: Arc<dyn BindingListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_binding_listener(&self, listener: &Arc<dyn BindingListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn binding_count(&self) -> u64 {
        self.bindings.len() as u64
    }

    pub fn binding_count_high(&self) -> u64 {
        self.stats.binding_count_high()
    }

    pub fn msg_receives(&self) -> u64 {
        self.stats.msg_receives()
    }

    pub fn msg_routes(&self) -> u64 {
        self.stats.msg_routes()
    }

    pub fn msg_drops(&self) -> u64 {
        self.stats.msg_drops()
    }

    pub fn byte_receives(&self) -> u64 {
        self.stats.byte_receives()
    }

    pub fn byte_routes(&self) -> u64 {
        self.stats.byte_routes()
    }

    pub fn byte_drops(&self) -> u64 {
        self.stats.byte_drops()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot(self.binding_count())
    }

    pub fn strategy(&self) -> &dyn RoutingStrategy {
        self.strategy.as_ref()
    }

    fn emit(&self, event: ExchangeEvent) {
        let Some(host) = self.virtual_host() else {
            return;
        };
        if let Err(e) = host.event_sink().emit(&event) {
            warn!(
                "Failed to emit exchange event '{}' on vhost {}: {}",
                event,
                host.name(),
                e
            );
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Exchange[{}]",
            self.exchange_type().display_prefix(),
            self.name().unwrap_or("")
        )
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("type", &self.exchange_type())
            .field("name", &self.name())
            .field("closed", &self.is_closed())
            .field("bindings", &self.bindings.len())
            .field("referrers", &self.references.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::test_utils::{
        CollectingEventSink, FailingEventSink, RecordingListener, TestQueue,
    };
    use std::sync::atomic::AtomicUsize;

    fn host() -> Arc<VirtualHost> {
        Arc::new(VirtualHost::new("test"))
    }

    fn exchange(exchange_type: ExchangeType, name: &str) -> Arc<Exchange> {
        let exchange = Exchange::of_type(&exchange_type).unwrap();
        exchange
            .initialize(Uuid::new_v4(), host(), name, false, false)
            .unwrap();
        Arc::new(exchange)
    }

    #[test]
    fn test_operations_before_initialize_fail() {
        let exchange = Exchange::of_type(&ExchangeType::Direct).unwrap();
        let msg = Message::new("k", vec![1]);

        assert_eq!(exchange.route(&msg).unwrap_err(), ExchangeError::NotInitialized);
        assert_eq!(
            exchange
                .add_binding(Binding::simple("x", "k", TestQueue::shared("q")))
                .unwrap_err(),
            ExchangeError::NotInitialized
        );
        assert!(exchange.close().is_err());
        assert!(exchange.set_alternate_exchange(None).is_err());
        assert_eq!(exchange.msg_receives(), 0);
        assert_eq!(exchange.name(), None);
    }

    #[test]
    fn test_initialize_twice_fails() {
        let sink = Arc::new(CollectingEventSink::new());
        let host = Arc::new(VirtualHost::with_event_sink("test", sink.clone()));
        let exchange = Exchange::of_type(&ExchangeType::Topic).unwrap();

        exchange
            .initialize(Uuid::new_v4(), host.clone(), "orders", true, false)
            .unwrap();
        let err = exchange
            .initialize(Uuid::new_v4(), host, "other", false, false)
            .unwrap_err();

        assert!(matches!(err, ExchangeError::AlreadyInitialized { ref name } if name == "orders"));
        assert_eq!(exchange.name(), Some("orders"));
        assert!(exchange.is_durable());
        assert_eq!(
            sink.events(),
            vec![ExchangeEvent::Created {
                exchange_type: "topic".to_string(),
                name: "orders".to_string(),
                durable: true,
            }]
        );
    }

    #[test]
    fn test_direct_route_and_drop() {
        let exchange = exchange(ExchangeType::Direct, "rpc");
        let q1 = TestQueue::shared("q1");
        exchange.bind("ping", q1, FieldTable::new()).unwrap();

        let routed = exchange.route(&Message::new("ping", vec![0; 8])).unwrap();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].name(), "q1");

        let dropped = exchange.route(&Message::new("pong", vec![0; 3])).unwrap();
        assert!(dropped.is_empty());

        assert_eq!(exchange.msg_receives(), 2);
        assert_eq!(exchange.msg_routes(), 1);
        assert_eq!(exchange.msg_drops(), 1);
        assert_eq!(exchange.byte_receives(), 11);
        assert_eq!(exchange.byte_routes(), 8);
        assert_eq!(exchange.byte_drops(), 3);
    }

    #[test]
    fn test_deleted_destination_filtered() {
        let exchange = exchange(ExchangeType::Direct, "ex");
        let live = TestQueue::shared("Q1");
        let deleted = TestQueue::new("Q2");
        deleted.mark_deleted();

        exchange.bind("key", live, FieldTable::new()).unwrap();
        exchange.bind("key", deleted, FieldTable::new()).unwrap();

        let routed = exchange.route(&Message::new("key", vec![0; 5])).unwrap();
        let names: Vec<_> = routed.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Q1"]);
        assert_eq!(exchange.msg_receives(), 1);
        assert_eq!(exchange.msg_routes(), 1);
        assert_eq!(exchange.byte_routes(), 5);
        assert_eq!(exchange.msg_drops(), 0);
    }

    #[test]
    fn test_live_queue_not_shadowed_by_deleted_namesake() {
        let exchange = exchange(ExchangeType::Topic, "orders");
        let old = TestQueue::new("Q");
        exchange.bind("orders.#", old.clone(), FieldTable::new()).unwrap();
        old.mark_deleted();
        exchange
            .bind("orders.eu", TestQueue::shared("Q"), FieldTable::new())
            .unwrap();

        let routed = exchange.route(&Message::new("orders.eu", vec![0; 6])).unwrap();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].name(), "Q");
        assert!(!routed[0].is_deleted());
        assert_eq!(exchange.msg_routes(), 1);
        assert_eq!(exchange.msg_drops(), 0);
        assert_eq!(exchange.byte_routes(), 6);
    }

    #[test]
    fn test_all_destinations_deleted_counts_as_drop() {
        let exchange = exchange(ExchangeType::Fanout, "fan");
        let gone = TestQueue::new("gone");
        exchange.bind("", gone.clone(), FieldTable::new()).unwrap();
        gone.mark_deleted();

        assert!(exchange.route(&Message::new("", vec![1, 2])).unwrap().is_empty());
        assert_eq!(exchange.msg_drops(), 1);
        assert_eq!(exchange.byte_drops(), 2);
    }

    #[test]
    fn test_duplicate_binding_is_idempotent() {
        let exchange = exchange(ExchangeType::Direct, "ex");
        let listener = Arc::new(RecordingListener::new());
        exchange.add_binding_listener(listener.clone());

        let queue = TestQueue::shared("q");
        assert!(exchange.bind("k", queue.clone(), FieldTable::new()).unwrap());
        assert!(!exchange.bind("k", queue, FieldTable::new()).unwrap());

        assert_eq!(exchange.binding_count(), 1);
        assert_eq!(listener.added(), vec!["k->q".to_string()]);
    }

    #[test]
    fn test_binding_for_other_exchange_rejected() {
        let exchange = exchange(ExchangeType::Direct, "mine");
        let err = exchange
            .add_binding(Binding::simple("theirs", "k", TestQueue::shared("q")))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ExchangeMismatch { .. }));
        assert!(!exchange.has_bindings());
    }

    #[test]
    fn test_malformed_topic_binding_not_added() {
        let exchange = exchange(ExchangeType::Topic, "t");
        let err = exchange
            .bind("orders.*x", TestQueue::shared("q"), FieldTable::new())
            .unwrap_err();
        assert!(err.is_invalid_binding());
        assert_eq!(exchange.binding_count(), 0);
        assert_eq!(exchange.binding_count_high(), 0);
    }

    #[test]
    fn test_remove_binding_hook_order() {
        let exchange = exchange(ExchangeType::Direct, "ex");
        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));

        struct Probe(Arc<parking_lot::Mutex<Vec<(String, u64)>>>);
        impl BindingListener for Probe {
            fn binding_added(&self, exchange: &Exchange, binding: &Binding) {
                self.0.lock().push((
                    format!("added {}", binding.binding_key()),
                    exchange.binding_count(),
                ));
            }
            fn binding_removed(&self, exchange: &Exchange, binding: &Binding) {
                self.0.lock().push((
                    format!("removed {}", binding.binding_key()),
                    exchange.binding_count(),
                ));
            }
        }

        exchange.add_binding_listener(Arc::new(Probe(observed.clone())));
        let queue = TestQueue::shared("q");
        exchange.bind("k", queue.clone(), FieldTable::new()).unwrap();
        assert!(exchange.unbind("k", queue.clone(), FieldTable::new()).unwrap());
        assert!(!exchange.unbind("k", queue, FieldTable::new()).unwrap());

        // listener sees the binding in the registry on both add and remove
        assert_eq!(
            *observed.lock(),
            vec![("added k".to_string(), 1), ("removed k".to_string(), 1)]
        );
        assert_eq!(exchange.binding_count(), 0);
        assert_eq!(exchange.binding_count_high(), 1);
    }

    #[test]
    fn test_listener_removal() {
        let exchange = exchange(ExchangeType::Fanout, "fan");
        let recording = Arc::new(RecordingListener::new());
        let listener: Arc<dyn BindingListener> = recording.clone();
        exchange.add_binding_listener(listener.clone());
        assert!(exchange.remove_binding_listener(&listener));

        exchange
            .bind("", TestQueue::shared("q"), FieldTable::new())
            .unwrap();
        assert!(recording.added().is_empty());
    }

    #[test]
    fn test_is_bound_queries() {
        let exchange = exchange(ExchangeType::Headers, "h");
        let mut args = FieldTable::new();
        args.insert("format".to_string(), "pdf".into());
        exchange
            .bind("reports", TestQueue::shared("pdfs"), args.clone())
            .unwrap();

        assert!(exchange.is_bound("reports", "pdfs"));
        assert!(exchange.is_bound_with_arguments("reports", &args, "pdfs"));
        assert!(!exchange.is_bound_with_arguments("reports", &FieldTable::new(), "pdfs"));
        assert!(exchange.is_key_bound("reports"));
        assert!(!exchange.is_key_bound("other"));
        assert!(exchange.is_queue_bound("pdfs"));
        assert!(!exchange.is_queue_bound("zips"));
    }

    #[test]
    fn test_close_runs_tasks_once_in_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let host = Arc::new(VirtualHost::with_event_sink("test", sink.clone()));
        let exchange = Exchange::of_type(&ExchangeType::Direct).unwrap();
        exchange
            .initialize(Uuid::new_v4(), host, "ex", false, true)
            .unwrap();

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = order.clone();
            exchange.add_close_task(Arc::new(move |_: &Exchange| order.lock().push(label)));
        }
        let removed: Arc<dyn CloseTask> = Arc::new(|_: &Exchange| panic!("removed task ran"));
        exchange.add_close_task(removed.clone());
        assert!(exchange.remove_close_task(&removed));

        assert!(exchange.close().unwrap());
        assert!(!exchange.close().unwrap());
        assert!(exchange.is_closed());
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);

        let deletions = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, ExchangeEvent::Deleted { .. }))
            .count();
        assert_eq!(deletions, 1);
    }

    #[test]
    fn test_bind_after_close_rejected() {
        let exchange = exchange(ExchangeType::Direct, "ex");
        exchange.close().unwrap();
        let err = exchange
            .bind("k", TestQueue::shared("q"), FieldTable::new())
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Closed { .. }));
    }

    #[test]
    fn test_event_sink_failure_does_not_fail_operations() {
        let host = Arc::new(VirtualHost::with_event_sink(
            "test",
            Arc::new(FailingEventSink),
        ));
        let exchange = Exchange::of_type(&ExchangeType::Fanout).unwrap();
        assert!(exchange
            .initialize(Uuid::new_v4(), host, "fan", false, false)
            .is_ok());

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        exchange.add_close_task(Arc::new(move |_: &Exchange| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(exchange.close().unwrap());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_alternate_exchange_referrer_bookkeeping() {
        let a = exchange(ExchangeType::Fanout, "A");
        let b = exchange(ExchangeType::Fanout, "B");
        let c = exchange(ExchangeType::Fanout, "C");
        let source = exchange(ExchangeType::Direct, "source");

        source.set_alternate_exchange(Some(&a)).unwrap();
        assert!(a.has_referrers());

        source.set_alternate_exchange(Some(&b)).unwrap();
        source.set_alternate_exchange(Some(&c)).unwrap();

        assert!(!a.has_referrers());
        assert!(!b.has_referrers());
        assert!(c.has_referrers());
        assert!(c
            .references()
            .contains(&source.referrer_id().unwrap()));
        assert!(Arc::ptr_eq(&source.alternate_exchange().unwrap(), &c));
    }

    #[test]
    fn test_same_alternate_twice_is_stable() {
        let alt = exchange(ExchangeType::Fanout, "alt");
        let source = exchange(ExchangeType::Direct, "source");

        source.set_alternate_exchange(Some(&alt)).unwrap();
        source.set_alternate_exchange(Some(&alt)).unwrap();
        assert_eq!(alt.references().len(), 1);

        source.set_alternate_exchange(None).unwrap();
        assert!(!alt.has_referrers());
        assert!(source.alternate_exchange().is_none());
    }

    #[test]
    fn test_close_detaches_alternate() {
        let alt = exchange(ExchangeType::Fanout, "alt");
        let source = exchange(ExchangeType::Direct, "source");
        source.set_alternate_exchange(Some(&alt)).unwrap();

        source.close().unwrap();
        assert!(!alt.has_referrers());
        assert!(source.alternate_exchange().is_none());
    }

    #[test]
    fn test_closed_exchange_cannot_take_alternate() {
        let alt = exchange(ExchangeType::Fanout, "alt");
        let source = exchange(ExchangeType::Direct, "source");
        source.close().unwrap();

        let err = source.set_alternate_exchange(Some(&alt)).unwrap_err();
        assert!(matches!(err, ExchangeError::Closed { ref name } if name == "source"));
        assert!(!alt.has_referrers());
        assert!(source.alternate_exchange().is_none());
    }

    #[test]
    fn test_alternate_is_not_owned() {
        let source = exchange(ExchangeType::Direct, "source");
        {
            let alt = exchange(ExchangeType::Fanout, "alt");
            source.set_alternate_exchange(Some(&alt)).unwrap();
        }
        assert!(source.alternate_exchange().is_none());
        // replacing a vanished alternate must not fail
        source.set_alternate_exchange(None).unwrap();
    }

    #[test]
    fn test_display_and_statistics() {
        let exchange = exchange(ExchangeType::Topic, "orders");
        assert_eq!(exchange.to_string(), "TopicExchange[orders]");

        exchange
            .bind("orders.#", TestQueue::shared("audit"), FieldTable::new())
            .unwrap();
        exchange.route(&Message::new("orders.eu", vec![0; 4])).unwrap();

        let stats = exchange.statistics();
        assert_eq!(stats.binding_count, 1);
        assert_eq!(stats.binding_count_high, 1);
        assert_eq!(stats.msg_routes, 1);
        assert_eq!(stats.byte_routes, 4);
    }

    #[test]
    fn test_topic_cache_tracks_bindings() {
        let exchange = exchange(ExchangeType::Topic, "t");
        let queue = TestQueue::shared("q");
        exchange.bind("a.*", queue.clone(), FieldTable::new()).unwrap();
        exchange.bind("b.#", queue.clone(), FieldTable::new()).unwrap();

        let routed = exchange.route(&Message::new("b.c.d", vec![])).unwrap();
        assert_eq!(routed.len(), 1);

        exchange.unbind("b.#", queue, FieldTable::new()).unwrap();
        assert!(exchange.route(&Message::new("b.c.d", vec![])).unwrap().is_empty());
    }
}
