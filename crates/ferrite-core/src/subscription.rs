//! Subscriptions and their per-client storage.
//!
//! A [`Subscription`] is the accepted pairing of an extracted handler with
//! the subscription client that claimed it. Each client owns one
//! [`SubscriptionStorage`]: the live collection of its active subscriptions,
//! written only by the plugin registry and read-snapshotted by the client's
//! dispatcher.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::BoxError;
use crate::event::{BoxedEvent, Event};
use crate::extract::HandlerDescriptor;
use crate::plugin::{EventPredicate, HandlerFn, Plugin};

// ============================================================================
// Priority
// ============================================================================

/// Dispatch priority, declared per handler and per subscription client.
///
/// Between subscriptions of one dispatch call, `Higher` handlers are invoked
/// before `Default` ones, which precede `Lower`; ties keep registration
/// order. Between clients, priority decides who gets first refusal when a
/// handler descriptor is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Runs before default-priority handlers.
    Higher,
    /// The default.
    #[default]
    Default,
    /// Runs after default-priority handlers.
    Lower,
}

// ============================================================================
// Handler attributes
// ============================================================================

/// Family-specific metadata attached to a handler declaration.
///
/// Which attributes are meaningful depends on the claiming client: the loop
/// client requires `interval`, reactive clients may consult `filter`, and a
/// client is free to ignore attributes its family does not define.
#[derive(Clone, Default)]
pub struct HandlerAttrs {
    /// Fixed invocation interval, required by the loop family.
    pub interval: Option<Duration>,
    /// Event filter predicate evaluated during dispatch.
    pub filter: Option<EventPredicate>,
}

impl fmt::Debug for HandlerAttrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerAttrs")
            .field("interval", &self.interval)
            .field("filter", &self.filter.as_ref().map(|_| ".."))
            .finish()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// An active binding of one handler function to its owning client.
///
/// Created from a [`HandlerDescriptor`] when a client accepts it; immutable
/// thereafter. The plugin reference is a shared back-reference; the registry
/// remains the owner of the plugin's lifecycle.
pub struct Subscription {
    plugin: Arc<dyn Plugin>,
    function: &'static str,
    priority: Priority,
    attrs: HandlerAttrs,
    accepts: fn(&dyn Event) -> bool,
    invoke: HandlerFn,
}

impl Subscription {
    /// Builds a subscription from an accepted descriptor.
    pub fn of(descriptor: &HandlerDescriptor) -> Self {
        Self {
            plugin: Arc::clone(descriptor.plugin()),
            function: descriptor.name(),
            priority: descriptor.priority(),
            attrs: descriptor.attrs().clone(),
            accepts: descriptor.accepts_fn(),
            invoke: descriptor.invoker(),
        }
    }

    /// The plugin this subscription belongs to.
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    /// The owning plugin's qualified name.
    pub fn plugin_name(&self) -> &'static str {
        self.plugin.name()
    }

    /// The handler function's name.
    pub fn function(&self) -> &'static str {
        self.function
    }

    /// `"plugin#function"`, for logs.
    pub fn full_name(&self) -> String {
        format!("{}#{}", self.plugin.name(), self.function)
    }

    /// Declared dispatch priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Family-specific attributes.
    pub fn attrs(&self) -> &HandlerAttrs {
        &self.attrs
    }

    /// Fixed interval for loop subscriptions.
    pub fn interval(&self) -> Option<Duration> {
        self.attrs.interval
    }

    /// Whether this subscription should receive the given event: the declared
    /// parameter type must be assignable from the event's runtime type, and
    /// the filter predicate (if any) must accept it.
    pub fn matches(&self, event: &dyn Event) -> bool {
        (self.accepts)(event)
            && self
                .attrs
                .filter
                .as_ref()
                .is_none_or(|filter| filter(event))
    }

    /// Invokes the handler with the given event.
    pub async fn invoke(&self, event: BoxedEvent) -> Result<(), BoxError> {
        (self.invoke)(event).await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("plugin", &self.plugin.name())
            .field("function", &self.function)
            .field("priority", &self.priority)
            .field("attrs", &self.attrs)
            .finish()
    }
}

// ============================================================================
// SubscriptionStorage
// ============================================================================

/// The live subscription collection of one client.
///
/// Cheaply clonable (shared inner state) so a client and its dispatcher can
/// hold the same storage. Mutated only on plugin load/unload; dispatch reads
/// a snapshot, so readers and writers never hold each other up beyond the
/// brief lock window.
#[derive(Clone, Default)]
pub struct SubscriptionStorage {
    inner: Arc<RwLock<Vec<Arc<Subscription>>>>,
}

impl SubscriptionStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription, keeping registration order.
    ///
    /// Idempotent per (plugin, function): a duplicate is dropped and `None`
    /// is returned.
    pub fn register(&self, subscription: Subscription) -> Option<Arc<Subscription>> {
        let mut subs = self.inner.write();
        let duplicate = subs.iter().any(|s| {
            s.plugin_name() == subscription.plugin_name() && s.function() == subscription.function()
        });
        if duplicate {
            return None;
        }
        let subscription = Arc::new(subscription);
        subs.push(Arc::clone(&subscription));
        Some(subscription)
    }

    /// Removes and returns every subscription owned by the named plugin.
    pub fn unregister(&self, plugin_name: &str) -> Vec<Arc<Subscription>> {
        let mut subs = self.inner.write();
        let mut removed = Vec::new();
        subs.retain(|s| {
            if s.plugin_name() == plugin_name {
                removed.push(Arc::clone(s));
                false
            } else {
                true
            }
        });
        removed
    }

    /// Returns a copy-on-read snapshot in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.inner.read().clone()
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventFamily;
    use crate::extract::extract;
    use crate::plugin::RawHandler;

    struct TestFamily;

    impl EventFamily for TestFamily {
        const NAME: &'static str = "test";
    }

    #[derive(Debug, Clone)]
    struct TestEvent;

    crate::impl_event!(TestEvent, family: TestFamily);

    struct TwoHandlers;

    impl Plugin for TwoHandlers {
        fn name(&self) -> &'static str {
            "two_handlers"
        }

        fn manifest(&self) -> Vec<RawHandler> {
            vec![
                RawHandler::handler("first", |_: TestEvent| async {}),
                RawHandler::handler("second", |_: TestEvent| async {}),
            ]
        }
    }

    fn descriptors() -> Vec<HandlerDescriptor> {
        let plugin: Arc<dyn Plugin> = Arc::new(TwoHandlers);
        extract(&plugin).descriptors
    }

    #[test]
    fn register_keeps_order_and_dedups() {
        let storage = SubscriptionStorage::new();
        let descriptors = descriptors();

        assert!(storage.register(Subscription::of(&descriptors[0])).is_some());
        assert!(storage.register(Subscription::of(&descriptors[1])).is_some());
        // Same (plugin, function) pair again: dropped.
        assert!(storage.register(Subscription::of(&descriptors[0])).is_none());

        let snapshot = storage.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].function(), "first");
        assert_eq!(snapshot[1].function(), "second");
    }

    #[test]
    fn unregister_removes_all_of_a_plugin() {
        let storage = SubscriptionStorage::new();
        for descriptor in &descriptors() {
            storage.register(Subscription::of(descriptor));
        }

        let removed = storage.unregister("two_handlers");
        assert_eq!(removed.len(), 2);
        assert!(storage.is_empty());

        assert!(storage.unregister("two_handlers").is_empty());
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let storage = SubscriptionStorage::new();
        let descriptors = descriptors();
        storage.register(Subscription::of(&descriptors[0]));

        let snapshot = storage.snapshot();
        storage.register(Subscription::of(&descriptors[1]));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(storage.len(), 2);
    }
}
