//! Main runtime orchestration.
//!
//! [`FerriteRuntime`] is the explicit context object tying the pieces
//! together: it owns the subscription clients, the plugin registry, and the
//! process-wide task tracker used as the shutdown drain barrier. There is no
//! ambient global state: everything is initialized at startup and torn down
//! at shutdown.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ferrite_runtime::FerriteRuntime;
//!
//! // Simplest way - auto-loads config from the current directory
//! let runtime = FerriteRuntime::new();
//!
//! // Custom configuration path
//! let runtime = FerriteRuntime::builder()
//!     .config_file("config/ferrite.yaml")
//!     .build()?;
//!
//! runtime.register_client(Arc::new(LoopClient::new(runtime.tracker().clone()))).await;
//! runtime.run().await?;
//! ```

use std::sync::Arc;

use tokio::signal;
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use ferrite_core::SubscriptionClient;

use crate::config::{ConfigLoader, ConfigResult, FerriteConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::registry::{PluginDescriptor, PluginRegistry};

/// The Ferrite runtime: client registration, plugin lifecycle, and shutdown.
///
/// # Lifecycle
///
/// 1. [`register_client`](Self::register_client) /
///    [`register_plugin`](Self::register_plugin) - collect clients and
///    plugin descriptors;
/// 2. [`init`](Self::init) - build the registry, discover statically linked
///    plugins, load everything;
/// 3. [`start`](Self::start) - fire every client's `start` hook;
/// 4. [`stop`](Self::stop) - stop clients, unload plugins, and drain
///    in-flight dispatch tasks.
///
/// [`run`](Self::run) drives all of this and blocks until Ctrl+C or SIGTERM.
pub struct FerriteRuntime {
    config: FerriteConfig,
    clients: RwLock<Vec<Arc<dyn SubscriptionClient>>>,
    pending_plugins: RwLock<Vec<PluginDescriptor>>,
    registry: RwLock<Option<Arc<PluginRegistry>>>,
    tracker: TaskTracker,
    running: RwLock<bool>,
}

impl FerriteRuntime {
    /// Creates a new runtime with automatic configuration loading.
    ///
    /// Searches for `ferrite.yaml` in the current directory and the user
    /// config directory; falls back to defaults when nothing is found.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                FerriteConfig::default()
            });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a new runtime from configuration.
    ///
    /// Initializes logging based on the configuration.
    pub fn from_config(config: &FerriteConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            debug = config.debug,
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            clients: RwLock::new(Vec::new()),
            pending_plugins: RwLock::new(Vec::new()),
            registry: RwLock::new(None),
            tracker: TaskTracker::new(),
            running: RwLock::new(false),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &FerriteConfig {
        &self.config
    }

    /// The process-wide task tracker.
    ///
    /// Clients spawn dispatch and timer tasks on a clone of this tracker so
    /// [`stop`](Self::stop) can wait for in-flight invocations to drain.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Registers a subscription client. Call before [`init`](Self::init).
    pub async fn register_client(&self, client: Arc<dyn SubscriptionClient>) {
        info!(client = client.name(), "Registered subscription client");
        self.clients.write().await.push(client);
    }

    /// Registers a plugin descriptor in addition to the statically linked
    /// ones. Call before [`init`](Self::init).
    pub async fn register_plugin(&self, descriptor: PluginDescriptor) {
        self.pending_plugins.write().await.push(descriptor);
    }

    /// Returns whether the runtime is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// The plugin registry, once [`init`](Self::init) has run.
    pub async fn registry(&self) -> Option<Arc<PluginRegistry>> {
        self.registry.read().await.clone()
    }

    /// Builds the registry, discovers plugins, and loads them all.
    pub async fn init(&self) -> RuntimeResult<()> {
        let clients = self.clients.read().await.clone();
        if clients.is_empty() {
            warn!("No subscription clients registered; no handler can be claimed");
        }

        let registry = Arc::new(PluginRegistry::new(clients, self.config.debug));
        registry.discover_static().await;
        for descriptor in self.pending_plugins.write().await.drain(..) {
            registry.register_descriptor(descriptor).await;
        }
        registry.load_all().await;

        *self.registry.write().await = Some(registry);
        info!("Runtime initialized");
        Ok(())
    }

    /// Starts every registered client, in client-priority order.
    pub async fn start(&self) -> RuntimeResult<()> {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Runtime is already running");
                return Ok(());
            }
            *running = true;
        }

        let registry = self
            .registry
            .read()
            .await
            .clone()
            .ok_or(RuntimeError::NotInitialized)?;

        for client in registry.clients() {
            client.start().await;
            info!(client = client.name(), "Client started");
        }

        info!("Runtime started");
        Ok(())
    }

    /// Stops clients, unloads plugins, and drains in-flight invocations.
    pub async fn stop(&self) -> RuntimeResult<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                warn!("Runtime is not running");
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping Ferrite runtime");

        if let Some(registry) = self.registry.read().await.clone() {
            for client in registry.clients() {
                client.stop().await;
            }
            registry.unload_all().await;
        }

        // Wait for every in-flight dispatch task before returning, so side
        // effects are never truncated by process exit.
        self.tracker.close();
        self.tracker.wait().await;

        info!("Runtime stopped");
        Ok(())
    }

    /// Runs the runtime until a shutdown signal is received.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.init().await?;
        self.start().await?;

        info!("Ferrite runtime is now running. Press Ctrl+C to stop.");
        Self::wait_for_shutdown().await;

        self.stop().await?;
        Ok(())
    }

    /// Runs the runtime with a custom shutdown future.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.init().await?;
        self.start().await?;

        shutdown.await;

        self.stop().await?;
        Ok(())
    }

    /// Builds the dispatch worker pool and runs the runtime on it, blocking
    /// the calling thread.
    ///
    /// Pool size comes from `config.parallelism`, defaulting to the
    /// machine's available parallelism. Failure to build the pool is the one
    /// fatal startup error.
    pub fn run_blocking(&self) -> RuntimeResult<()> {
        let workers = self.config.parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });

        let pool = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .enable_all()
            .build()
            .inspect_err(|e| error!(error = %e, "Failed to build the dispatch worker pool"))?;

        pool.block_on(self.run())
    }

    /// Waits for shutdown signals (Ctrl+C or SIGTERM).
    async fn wait_for_shutdown() {
        #[cfg(unix)]
        {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!(error = %e, "Failed to register SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if signal::ctrl_c().await.is_err() {
                error!("Failed to listen for Ctrl+C");
                return;
            }
            info!("Received Ctrl+C, shutting down");
        }
    }
}

impl Default for FerriteRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`FerriteRuntime`] with custom configuration.
///
/// ```rust,ignore
/// let runtime = FerriteRuntime::builder()
///     .config_file("config/production.yaml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: FerriteConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> ConfigResult<FerriteRuntime> {
        let config = self.config_loader.load()?;
        Ok(FerriteRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
