//! Plugin registry and loader.
//!
//! [`PluginRegistry`] is the central owner of all plugins. It:
//!
//! - Accepts [`PluginDescriptor`]s (from the statically linked [`PLUGINS`]
//!   slice or programmatic registration) and instantiates each exactly once.
//! - Drives the per-plugin state machine
//!   `Discovered → Instantiated → Registered → Active → Unloaded`.
//! - Extracts each plugin's handler descriptors and offers them to the
//!   registered subscription clients in client-priority order; the first
//!   accepting client claims a descriptor and the rest are not offered.
//! - Fires every owning client's `on_subscription_loaded` /
//!   `on_subscription_unloaded` hooks around a plugin's active lifetime.
//!
//! A plugin whose factory fails is logged and left in `Discovered`; this
//! never aborts loading of other plugins. Environment gating is evaluated
//! before instantiation and causes a clean skip.

use std::sync::Arc;

use linkme::distributed_slice;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use ferrite_core::{
    BoxError, Plugin, Subscription, SubscriptionClient, extract,
};

// ============================================================================
// Static plugin discovery
// ============================================================================

/// Statically linked plugin descriptors.
///
/// Register a plugin by adding its descriptor to this slice:
///
/// ```rust,ignore
/// #[distributed_slice(PLUGINS)]
/// static PING: PluginDescriptor = PluginDescriptor {
///     name: "ping",
///     gate: Gate::Always,
///     singleton: true,
///     create: || Ok(PING_INSTANCE.clone()),
/// };
/// ```
#[distributed_slice]
pub static PLUGINS: [PluginDescriptor];

// ============================================================================
// PluginDescriptor
// ============================================================================

/// Environment gate, evaluated before a plugin is instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gate {
    /// Production only: skipped when the runtime is in debug mode.
    #[default]
    Always,
    /// Loads in both debug and production mode.
    Testable,
    /// Debug mode only: skipped in production.
    TestOnly,
}

impl Gate {
    /// Whether a plugin gated by `self` may load under the given mode.
    pub fn permits(&self, debug_mode: bool) -> bool {
        match self {
            Gate::Always => !debug_mode,
            Gate::Testable => true,
            Gate::TestOnly => debug_mode,
        }
    }
}

/// A static, `Copy` descriptor that identifies and instantiates a plugin.
///
/// The factory returns a shared handle; process-wide singletons return a
/// clone of the same `Arc` on every call (a `LazyLock` works well). A
/// descriptor whose `singleton` flag is `false` is instantiated fresh on
/// every load, which raises a warning; shared singletons are recommended.
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    /// Qualified plugin name; must match the instance's `Plugin::name`.
    pub name: &'static str,
    /// Environment gate.
    pub gate: Gate,
    /// Whether the factory hands out a process-wide shared instance.
    pub singleton: bool,
    /// Factory creating (or sharing) the live plugin instance.
    pub create: fn() -> Result<Arc<dyn Plugin>, BoxError>,
}

impl PluginDescriptor {
    /// Runs the factory.
    #[inline]
    pub fn instantiate(&self) -> Result<Arc<dyn Plugin>, BoxError> {
        (self.create)()
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("gate", &self.gate)
            .field("singleton", &self.singleton)
            .finish()
    }
}

// ============================================================================
// Plugin state machine
// ============================================================================

/// Tracks the load state of a plugin known to the registry.
///
/// ```text
/// register_descriptor() ──▶ Discovered
///     load()  ──▶ Instantiated ──▶ Registered ──▶ Active
///             ──▶ (stays Discovered on gate skip or factory failure)
///     unload() ──▶ Unloaded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Descriptor known, no instance yet.
    Discovered,
    /// Exactly one instance created.
    Instantiated,
    /// Handler descriptors extracted and offered to all clients.
    Registered,
    /// Every accepted subscription's loaded hook has fired.
    Active,
    /// Instance discarded; subscriptions removed from every client.
    Unloaded,
}

struct PluginEntry {
    descriptor: PluginDescriptor,
    state: PluginState,
    instance: Option<Arc<dyn Plugin>>,
}

// ============================================================================
// PluginRegistry
// ============================================================================

/// Central owner of plugin discovery, instantiation, registration, and
/// teardown.
pub struct PluginRegistry {
    /// Clients in offer order: ascending priority, registration order within
    /// equal priorities. Stable across runs.
    clients: Vec<Arc<dyn SubscriptionClient>>,
    entries: RwLock<Vec<PluginEntry>>,
    debug_mode: bool,
}

impl PluginRegistry {
    /// Creates a registry over the given clients.
    ///
    /// The client list is sorted by process priority once; offer order never
    /// changes afterwards.
    pub fn new(mut clients: Vec<Arc<dyn SubscriptionClient>>, debug_mode: bool) -> Self {
        clients.sort_by_key(|client| client.priority());
        Self {
            clients,
            entries: RwLock::new(Vec::new()),
            debug_mode,
        }
    }

    /// The registered clients, in offer order.
    pub fn clients(&self) -> &[Arc<dyn SubscriptionClient>] {
        &self.clients
    }

    /// Adds every statically linked descriptor from [`PLUGINS`].
    pub async fn discover_static(&self) {
        for descriptor in PLUGINS.iter() {
            self.register_descriptor(*descriptor).await;
        }
    }

    /// Adds a plugin descriptor in state [`PluginState::Discovered`].
    ///
    /// A duplicate name is logged and ignored.
    pub async fn register_descriptor(&self, descriptor: PluginDescriptor) {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.descriptor.name == descriptor.name) {
            warn!(plugin = descriptor.name, "Duplicate plugin descriptor ignored");
            return;
        }
        info!(plugin = descriptor.name, "Plugin discovered");
        entries.push(PluginEntry {
            descriptor,
            state: PluginState::Discovered,
            instance: None,
        });
    }

    /// Number of known plugins, in any state.
    pub async fn plugin_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// The named plugin's state, or `None` if unknown.
    pub async fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.descriptor.name == name)
            .map(|e| e.state)
    }

    /// Loads every plugin currently in [`PluginState::Discovered`].
    pub async fn load_all(&self) {
        let names: Vec<&'static str> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|e| e.state == PluginState::Discovered)
                .map(|e| e.descriptor.name)
                .collect()
        };
        for name in names {
            self.load(name).await;
        }
    }

    /// Loads one plugin through the full state machine.
    ///
    /// Gate mismatches and factory failures leave the plugin in
    /// `Discovered`; both are logged and never affect other plugins.
    pub async fn load(&self, name: &str) {
        // Gate check and instantiation, under a brief write lock; the
        // factory is synchronous.
        let instance = {
            let mut entries = self.entries.write().await;
            let Some(entry) = entries.iter_mut().find(|e| e.descriptor.name == name) else {
                warn!(plugin = name, "Unknown plugin, cannot load");
                return;
            };
            if !matches!(entry.state, PluginState::Discovered | PluginState::Unloaded) {
                warn!(plugin = name, state = ?entry.state, "Plugin is already loaded");
                return;
            }

            let descriptor = entry.descriptor;
            if !descriptor.gate.permits(self.debug_mode) {
                if self.debug_mode {
                    info!(plugin = name, "Plugin is not testable, skipping");
                } else {
                    info!(plugin = name, "Plugin is test-only, skipping");
                }
                return;
            }

            let instance = match descriptor.instantiate() {
                Ok(instance) => instance,
                Err(e) => {
                    error!(plugin = name, error = %e, "Plugin instantiation failed");
                    return;
                }
            };
            if !descriptor.singleton {
                warn!(
                    plugin = name,
                    "Plugin is instantiated as a fresh object; a shared singleton is recommended"
                );
            }

            entry.instance = Some(Arc::clone(&instance));
            entry.state = PluginState::Instantiated;
            instance
        };
        info!(
            plugin = instance.name(),
            display_name = instance.display_name(),
            "Plugin instantiated"
        );

        // Extract and offer each descriptor; the first accepting client
        // claims it.
        let extraction = extract(&instance);
        let mut accepted: Vec<(Arc<dyn SubscriptionClient>, Arc<Subscription>)> = Vec::new();
        for descriptor in &extraction.descriptors {
            let mut claimed = false;
            for client in &self.clients {
                let Some(subscription) = client.try_accept(descriptor) else {
                    continue;
                };
                match client.register(subscription) {
                    Some(subscription) => {
                        debug!(
                            subscription = %subscription.full_name(),
                            client = client.name(),
                            "Subscription registered"
                        );
                        accepted.push((Arc::clone(client), subscription));
                    }
                    None => {
                        debug!(
                            function = %descriptor.full_name(),
                            client = client.name(),
                            "Duplicate subscription dropped"
                        );
                    }
                }
                claimed = true;
                break;
            }
            if !claimed {
                trace!(
                    function = %descriptor.full_name(),
                    family = %descriptor.family(),
                    "No client claimed handler"
                );
            }
        }
        self.set_state(name, PluginState::Registered).await;

        // Activation: every owning client's loaded hook, per subscription.
        for (client, subscription) in &accepted {
            client.on_subscription_loaded(subscription).await;
        }
        self.set_state(name, PluginState::Active).await;
        info!(
            plugin = name,
            handlers = extraction.descriptors.len(),
            rejected = extraction.diagnostics.len(),
            "Plugin active"
        );
    }

    /// Unloads one plugin: removes its subscriptions from every client, fires
    /// the unloaded hooks, and discards the instance.
    pub async fn unload(&self, name: &str) {
        {
            let mut entries = self.entries.write().await;
            let Some(entry) = entries.iter_mut().find(|e| e.descriptor.name == name) else {
                warn!(plugin = name, "Unknown plugin, cannot unload");
                return;
            };
            if !matches!(entry.state, PluginState::Registered | PluginState::Active) {
                return;
            }
            entry.instance = None;
        }

        for client in &self.clients {
            for subscription in client.unregister(name) {
                client.on_subscription_unloaded(&subscription).await;
            }
        }

        self.set_state(name, PluginState::Unloaded).await;
        info!(plugin = name, "Plugin unloaded");
    }

    /// Unloads every active plugin.
    pub async fn unload_all(&self) {
        let names: Vec<&'static str> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|e| {
                    matches!(e.state, PluginState::Registered | PluginState::Active)
                })
                .map(|e| e.descriptor.name)
                .collect()
        };
        for name in names {
            self.unload(name).await;
        }
    }

    async fn set_state(&self, name: &str, state: PluginState) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.descriptor.name == name) {
            entry.state = state;
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("clients", &self.clients.len())
            .field("debug_mode", &self.debug_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_core::{
        BoxedEvent, Dispatcher, EventFamily, FamilyId, HandlerDescriptor, Priority, RawHandler,
        SubscriptionStorage, impl_event,
    };
    use std::sync::LazyLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::task::TaskTracker;

    struct TestFamily;

    impl EventFamily for TestFamily {
        const NAME: &'static str = "test";
    }

    #[derive(Debug, Clone)]
    struct TestEvent;

    impl_event!(TestEvent, family: TestFamily);

    /// A reactive client owning the test family; its ingress translates a
    /// raw payload into the typed event and fans it out.
    struct TestClient {
        client_name: &'static str,
        client_priority: Priority,
        storage: SubscriptionStorage,
        dispatcher: Dispatcher,
    }

    impl TestClient {
        fn new(client_name: &'static str, client_priority: Priority) -> Arc<Self> {
            let storage = SubscriptionStorage::new();
            Arc::new(Self {
                client_name,
                client_priority,
                dispatcher: Dispatcher::new(client_name, storage.clone(), TaskTracker::new()),
                storage,
            })
        }

        fn erased(self: Arc<Self>) -> Arc<dyn SubscriptionClient> {
            self
        }

        fn on_raw_event(&self, _payload: &str) -> usize {
            self.dispatcher.dispatch(BoxedEvent::new(TestEvent))
        }
    }

    #[async_trait::async_trait]
    impl SubscriptionClient for TestClient {
        fn name(&self) -> &'static str {
            self.client_name
        }

        fn priority(&self) -> Priority {
            self.client_priority
        }

        fn storage(&self) -> &SubscriptionStorage {
            &self.storage
        }

        fn try_accept(&self, descriptor: &HandlerDescriptor) -> Option<Subscription> {
            (descriptor.family() == FamilyId::of::<TestFamily>())
                .then(|| Subscription::of(descriptor))
        }
    }

    struct CounterPlugin {
        name: &'static str,
        counter: Arc<AtomicUsize>,
    }

    impl Plugin for CounterPlugin {
        fn name(&self) -> &'static str {
            self.name
        }

        fn manifest(&self) -> Vec<RawHandler> {
            let counter = Arc::clone(&self.counter);
            vec![
                RawHandler::handler("on_test", move |_: TestEvent| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
                RawHandler::opaque("helper", 2),
            ]
        }
    }

    static SHARED_COUNTER: LazyLock<Arc<AtomicUsize>> =
        LazyLock::new(|| Arc::new(AtomicUsize::new(0)));
    static SINGLETON: LazyLock<Arc<dyn Plugin>> = LazyLock::new(|| {
        Arc::new(CounterPlugin {
            name: "counter",
            counter: Arc::clone(&SHARED_COUNTER),
        })
    });

    fn counter_descriptor() -> PluginDescriptor {
        PluginDescriptor {
            name: "counter",
            gate: Gate::Testable,
            singleton: true,
            create: || Ok(Arc::clone(&SINGLETON)),
        }
    }

    #[tokio::test]
    async fn load_walks_the_state_machine() {
        let client = TestClient::new("test", Priority::Default);
        let registry = PluginRegistry::new(vec![client.clone().erased()], false);

        registry.register_descriptor(counter_descriptor()).await;
        assert_eq!(
            registry.plugin_state("counter").await,
            Some(PluginState::Discovered)
        );

        registry.load_all().await;
        assert_eq!(
            registry.plugin_state("counter").await,
            Some(PluginState::Active)
        );
        assert_eq!(client.storage.len(), 1);
    }

    #[tokio::test]
    async fn first_acceptor_wins_by_client_priority() {
        let reactive = TestClient::new("reactive", Priority::Default);
        let lower = TestClient::new("lower", Priority::Lower);
        // Registration order deliberately reversed; priority decides.
        let registry = PluginRegistry::new(vec![lower.clone().erased(), reactive.clone().erased()], false);

        registry.register_descriptor(counter_descriptor()).await;
        registry.load_all().await;

        assert_eq!(reactive.storage.len(), 1);
        assert!(lower.storage.is_empty());
    }

    #[tokio::test]
    async fn equal_priority_clients_keep_registration_order() {
        let first = TestClient::new("first", Priority::Default);
        let second = TestClient::new("second", Priority::Default);
        let registry = PluginRegistry::new(vec![first.clone().erased(), second.clone().erased()], false);

        registry.register_descriptor(counter_descriptor()).await;
        registry.load_all().await;

        assert_eq!(first.storage.len(), 1);
        assert!(second.storage.is_empty());
    }

    #[tokio::test]
    async fn unload_removes_subscriptions_from_every_client() {
        let client = TestClient::new("test", Priority::Default);
        let registry = PluginRegistry::new(vec![client.clone().erased()], false);

        registry.register_descriptor(counter_descriptor()).await;
        registry.load_all().await;
        assert_eq!(client.storage.len(), 1);

        registry.unload("counter").await;
        assert_eq!(
            registry.plugin_state("counter").await,
            Some(PluginState::Unloaded)
        );
        assert!(client.storage.is_empty());
        assert_eq!(client.on_raw_event("payload"), 0);
    }

    #[tokio::test]
    async fn reload_produces_fresh_subscriptions() {
        let client = TestClient::new("test", Priority::Default);
        let registry = PluginRegistry::new(vec![client.clone().erased()], false);

        registry.register_descriptor(counter_descriptor()).await;
        registry.load_all().await;
        registry.unload("counter").await;
        registry.load("counter").await;

        assert_eq!(
            registry.plugin_state("counter").await,
            Some(PluginState::Active)
        );
        assert_eq!(client.storage.len(), 1);
    }

    #[tokio::test]
    async fn failed_instantiation_leaves_others_untouched() {
        let client = TestClient::new("test", Priority::Default);
        let registry = PluginRegistry::new(vec![client.clone().erased()], false);

        registry
            .register_descriptor(PluginDescriptor {
                name: "broken",
                gate: Gate::Testable,
                singleton: true,
                create: || Err("construction failed".into()),
            })
            .await;
        registry.register_descriptor(counter_descriptor()).await;
        registry.load_all().await;

        assert_eq!(
            registry.plugin_state("broken").await,
            Some(PluginState::Discovered)
        );
        assert_eq!(
            registry.plugin_state("counter").await,
            Some(PluginState::Active)
        );
    }

    #[tokio::test]
    async fn gating_skips_cleanly() {
        let client = TestClient::new("test", Priority::Default);

        // Production mode: test-only plugins are skipped.
        let registry = PluginRegistry::new(vec![client.clone().erased()], false);
        registry
            .register_descriptor(PluginDescriptor {
                name: "counter",
                gate: Gate::TestOnly,
                singleton: true,
                create: || Ok(Arc::clone(&SINGLETON)),
            })
            .await;
        registry.load_all().await;
        assert_eq!(
            registry.plugin_state("counter").await,
            Some(PluginState::Discovered)
        );
        assert!(client.storage.is_empty());

        // Debug mode: plugins without a test gate are skipped.
        let client = TestClient::new("test", Priority::Default);
        let registry = PluginRegistry::new(vec![client.clone().erased()], true);
        registry
            .register_descriptor(PluginDescriptor {
                name: "counter",
                gate: Gate::Always,
                singleton: true,
                create: || Ok(Arc::clone(&SINGLETON)),
            })
            .await;
        registry.load_all().await;
        assert_eq!(
            registry.plugin_state("counter").await,
            Some(PluginState::Discovered)
        );
    }

    #[tokio::test]
    async fn duplicate_descriptor_is_ignored() {
        let registry = PluginRegistry::new(vec![], false);
        registry.register_descriptor(counter_descriptor()).await;
        registry.register_descriptor(counter_descriptor()).await;
        assert_eq!(registry.plugin_count().await, 1);
    }

    #[tokio::test]
    async fn dispatch_reaches_loaded_handlers() {
        let client = TestClient::new("test", Priority::Default);
        let registry = PluginRegistry::new(vec![client.clone().erased()], false);

        registry.register_descriptor(counter_descriptor()).await;
        registry.load_all().await;

        let before = SHARED_COUNTER.load(Ordering::SeqCst);
        assert_eq!(client.on_raw_event("payload"), 1);
        client.dispatcher.tracker().close();
        client.dispatcher.tracker().wait().await;
        assert_eq!(SHARED_COUNTER.load(Ordering::SeqCst), before + 1);

        registry.unload("counter").await;
    }
}
