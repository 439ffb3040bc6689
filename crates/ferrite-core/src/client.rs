//! The subscription client contract.
//!
//! A subscription client owns one event family: it decides which handler
//! descriptors belong to its family, keeps the live collection of accepted
//! subscriptions, and drives their start/stop lifecycle. Reactive clients
//! additionally expose their own typed ingress that translates an external
//! representation into the family's event and hands it to a
//! [`Dispatcher`](crate::dispatcher::Dispatcher); self-driving clients (the
//! loop scheduler) produce their events internally.

use std::sync::Arc;

use async_trait::async_trait;

use crate::extract::HandlerDescriptor;
use crate::subscription::{Priority, Subscription, SubscriptionStorage};

/// One event family's matching, registration, and lifecycle logic.
///
/// Registration and unregistration have default implementations over
/// [`storage`](Self::storage); most clients only implement `name`,
/// `try_accept`, and the lifecycle hooks their family needs.
#[async_trait]
pub trait SubscriptionClient: Send + Sync {
    /// The client's name, used in logs.
    fn name(&self) -> &'static str;

    /// Process-wide priority of this client.
    ///
    /// When several clients could claim the same handler descriptor, offers
    /// are made in ascending priority order ([`Priority::Higher`] first),
    /// stable across runs; the first acceptor wins.
    fn priority(&self) -> Priority {
        Priority::Default
    }

    /// The client's active-subscription storage.
    fn storage(&self) -> &SubscriptionStorage;

    /// Returns a subscription if the descriptor belongs to this client's
    /// family and passes family-specific validation, `None` otherwise.
    ///
    /// A descriptor of the right family that fails validation (e.g. a loop
    /// handler without an interval) is rejected with a warning, not silently.
    fn try_accept(&self, descriptor: &HandlerDescriptor) -> Option<Subscription>;

    /// Adds a subscription to the active set.
    ///
    /// Idempotent per (plugin, function); returns `None` for duplicates.
    fn register(&self, subscription: Subscription) -> Option<Arc<Subscription>> {
        self.storage().register(subscription)
    }

    /// Removes and returns every subscription owned by the named plugin.
    fn unregister(&self, plugin_name: &str) -> Vec<Arc<Subscription>> {
        self.storage().unregister(plugin_name)
    }

    /// Lifecycle hook invoked once at process start.
    async fn start(&self) {}

    /// Lifecycle hook invoked once at process shutdown.
    async fn stop(&self) {}

    /// Fired after the owning plugin finished loading, once per accepted
    /// subscription.
    async fn on_subscription_loaded(&self, _subscription: &Arc<Subscription>) {}

    /// Fired while the owning plugin unloads, once per removed subscription.
    async fn on_subscription_unloaded(&self, _subscription: &Arc<Subscription>) {}
}
