//! # Ferrite Loop Client
//!
//! A concrete subscription client whose family is a single synthetic tick
//! event. For each active subscription the client runs an independent
//! repeating task that invokes the handler at the subscription's fixed
//! interval, counts invocations from 0, and supports clean cancellation.
//!
//! Loop handlers declare the tick parameter and attach an interval:
//!
//! ```rust,ignore
//! fn manifest(&self) -> Vec<RawHandler> {
//!     vec![
//!         RawHandler::handler("poll", |event: TickEvent| async move {
//!             info!(count = event.count, "polling");
//!         })
//!         .interval(Duration::from_secs(60)),
//!     ]
//! }
//! ```
//!
//! A loop handler without an interval is rejected with a warning at load
//! time. The client runs at [`Priority::Lower`] process-wide so reactive
//! clients get first refusal on ambiguous descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use ferrite_core::{
    BoxedEvent, EventFamily, FamilyId, HandlerDescriptor, Priority, Subscription,
    SubscriptionClient, SubscriptionStorage, impl_event,
};

// ============================================================================
// Tick event family
// ============================================================================

/// The loop client's event family.
pub struct LoopFamily;

impl EventFamily for LoopFamily {
    const NAME: &'static str = "loop";
}

/// The synthetic event delivered on every loop iteration.
#[derive(Debug, Clone)]
pub struct TickEvent {
    /// Monotonically increasing invocation counter, starting at 0 and reset
    /// whenever the subscription is (re)created.
    pub count: u64,
}

impl_event!(TickEvent, family: LoopFamily);

/// Upper bound for the invocation counter; the loop stops with a warning
/// when it is reached.
pub const COUNTER_MAX: u64 = u64::MAX;

// ============================================================================
// LoopClient
// ============================================================================

/// The loop scheduler: one repeating timer task per active subscription.
pub struct LoopClient {
    storage: SubscriptionStorage,
    tracker: TaskTracker,
    timers: Mutex<HashMap<String, CancellationToken>>,
}

impl LoopClient {
    /// Creates a loop client spawning its timer tasks on the given tracker.
    ///
    /// Pass the runtime's shared tracker so shutdown waits for in-flight
    /// invocations to finish.
    pub fn new(tracker: TaskTracker) -> Self {
        Self {
            storage: SubscriptionStorage::new(),
            tracker,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Number of currently running timer loops.
    pub fn running_loops(&self) -> usize {
        self.timers.lock().len()
    }

    fn start_loop(&self, subscription: &Arc<Subscription>) {
        // Interval presence was validated in try_accept.
        let Some(interval) = subscription.interval() else {
            return;
        };

        let key = subscription.full_name();
        let token = {
            let mut timers = self.timers.lock();
            if timers.contains_key(&key) {
                return;
            }
            let token = CancellationToken::new();
            timers.insert(key, token.clone());
            token
        };

        let subscription = Arc::clone(subscription);
        debug!(
            subscription = %subscription.full_name(),
            interval_ms = interval.as_millis() as u64,
            "Loop started"
        );

        self.tracker.spawn(async move {
            let mut count: u64 = 0;
            loop {
                if token.is_cancelled() {
                    break;
                }
                if count == COUNTER_MAX {
                    warn!(
                        subscription = %subscription.full_name(),
                        "Invocation count limit reached, stopping loop"
                    );
                    break;
                }

                let event = BoxedEvent::new(TickEvent { count });
                if let Err(e) = subscription.invoke(event).await {
                    error!(
                        subscription = %subscription.full_name(),
                        error = %e,
                        "Loop handler invocation failed"
                    );
                }
                count += 1;

                // Cancellation during the sleep exits without a further
                // invocation.
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!(subscription = %subscription.full_name(), "Loop finished");
        });
    }

    fn stop_loop(&self, subscription: &Subscription) {
        if let Some(token) = self.timers.lock().remove(&subscription.full_name()) {
            token.cancel();
        }
    }
}

#[async_trait]
impl SubscriptionClient for LoopClient {
    fn name(&self) -> &'static str {
        "loop"
    }

    fn priority(&self) -> Priority {
        Priority::Lower
    }

    fn storage(&self) -> &SubscriptionStorage {
        &self.storage
    }

    fn try_accept(&self, descriptor: &HandlerDescriptor) -> Option<Subscription> {
        if descriptor.family() != FamilyId::of::<LoopFamily>() {
            return None;
        }

        if descriptor.attrs().interval.is_none() {
            warn!(
                function = %descriptor.full_name(),
                "Loop handler declares no interval, skipping"
            );
            return None;
        }

        Some(Subscription::of(descriptor))
    }

    async fn start(&self) {
        for subscription in self.storage.snapshot() {
            self.start_loop(&subscription);
        }
    }

    async fn stop(&self) {
        let timers: Vec<_> = self.timers.lock().drain().collect();
        for (_, token) in timers {
            token.cancel();
        }
    }

    async fn on_subscription_loaded(&self, subscription: &Arc<Subscription>) {
        self.start_loop(subscription);
    }

    async fn on_subscription_unloaded(&self, subscription: &Arc<Subscription>) {
        self.stop_loop(subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_core::{Plugin, RawHandler, extract};
    use std::time::Duration;
    use tokio::time::Instant;

    type Probe = Arc<Mutex<Vec<(u64, Instant)>>>;

    struct TickerPlugin {
        probe: Probe,
        interval: Duration,
    }

    impl Plugin for TickerPlugin {
        fn name(&self) -> &'static str {
            "ticker"
        }

        fn manifest(&self) -> Vec<RawHandler> {
            let probe = Arc::clone(&self.probe);
            vec![
                RawHandler::handler("on_tick", move |event: TickEvent| {
                    let probe = Arc::clone(&probe);
                    async move {
                        probe.lock().push((event.count, Instant::now()));
                    }
                })
                .interval(self.interval),
            ]
        }
    }

    fn loaded_client(probe: Probe, interval: Duration) -> (LoopClient, Arc<Subscription>) {
        let client = LoopClient::new(TaskTracker::new());
        let plugin: Arc<dyn Plugin> = Arc::new(TickerPlugin { probe, interval });
        let descriptor = extract(&plugin).descriptors.remove(0);
        let subscription = client
            .register(client.try_accept(&descriptor).expect("accepted"))
            .expect("registered");
        (client, subscription)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_fixed_interval() {
        let probe: Probe = Arc::new(Mutex::new(Vec::new()));
        let (client, subscription) = loaded_client(Arc::clone(&probe), Duration::from_millis(1000));

        client.on_subscription_loaded(&subscription).await;
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let ticks = probe.lock().clone();
        let counts: Vec<_> = ticks.iter().map(|(c, _)| *c).collect();
        assert_eq!(counts, [0, 1, 2, 3]);
        for pair in ticks.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_sleep_stops_further_invocations() {
        let probe: Probe = Arc::new(Mutex::new(Vec::new()));
        let (client, subscription) = loaded_client(Arc::clone(&probe), Duration::from_millis(1000));

        client.on_subscription_loaded(&subscription).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(probe.lock().len(), 2);

        client.on_subscription_unloaded(&subscription).await;
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(probe.lock().len(), 2);
        assert_eq!(client.running_loops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_every_loop() {
        let probe: Probe = Arc::new(Mutex::new(Vec::new()));
        let (client, _subscription) = loaded_client(Arc::clone(&probe), Duration::from_millis(500));

        client.start().await;
        tokio::time::sleep(Duration::from_millis(1200)).await;
        client.stop().await;
        let seen = probe.lock().len();

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(probe.lock().len(), seen);

        // The cancelled loop tasks have all exited; the tracker drains.
        client.tracker.close();
        client.tracker.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reload_resets_the_counter() {
        let probe: Probe = Arc::new(Mutex::new(Vec::new()));
        let (client, subscription) = loaded_client(Arc::clone(&probe), Duration::from_millis(1000));

        client.on_subscription_loaded(&subscription).await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        client.on_subscription_unloaded(&subscription).await;
        client.unregister("ticker");

        // Fresh subscriptions after a reload start counting from 0 again.
        let plugin: Arc<dyn Plugin> = Arc::new(TickerPlugin {
            probe: Arc::clone(&probe),
            interval: Duration::from_millis(1000),
        });
        let descriptor = extract(&plugin).descriptors.remove(0);
        let fresh = client
            .register(client.try_accept(&descriptor).expect("accepted"))
            .expect("registered");
        client.on_subscription_loaded(&fresh).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let counts: Vec<_> = probe.lock().iter().map(|(c, _)| *c).collect();
        assert_eq!(counts, [0, 1, 2, 0, 1]);
    }

    #[tokio::test]
    async fn missing_interval_is_rejected() {
        struct NoInterval;

        impl Plugin for NoInterval {
            fn name(&self) -> &'static str {
                "no_interval"
            }

            fn manifest(&self) -> Vec<RawHandler> {
                vec![RawHandler::handler("on_tick", |_: TickEvent| async {})]
            }
        }

        let client = LoopClient::new(TaskTracker::new());
        let plugin: Arc<dyn Plugin> = Arc::new(NoInterval);
        let descriptor = extract(&plugin).descriptors.remove(0);
        assert!(client.try_accept(&descriptor).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ping_scenario() {
        // One tick handler at 2000ms plus one malformed two-parameter
        // function: loading yields 1 subscription and 1 diagnostic, and the
        // handler ticks at 0ms, 2000ms, and 4000ms within the first 5
        // seconds.
        let probe: Probe = Arc::new(Mutex::new(Vec::new()));
        let probe_clone = Arc::clone(&probe);

        struct Ping {
            probe: Probe,
        }

        impl Plugin for Ping {
            fn name(&self) -> &'static str {
                "ping"
            }

            fn manifest(&self) -> Vec<RawHandler> {
                let probe = Arc::clone(&self.probe);
                vec![
                    RawHandler::handler("on_tick", move |event: TickEvent| {
                        let probe = Arc::clone(&probe);
                        async move {
                            probe.lock().push((event.count, Instant::now()));
                        }
                    })
                    .interval(Duration::from_millis(2000)),
                    RawHandler::opaque("malformed", 2),
                ]
            }
        }

        let client = LoopClient::new(TaskTracker::new());
        let plugin: Arc<dyn Plugin> = Arc::new(Ping { probe: probe_clone });
        let extraction = extract(&plugin);
        assert_eq!(extraction.descriptors.len(), 1);
        assert_eq!(extraction.diagnostics.len(), 1);

        let subscription = client
            .register(client.try_accept(&extraction.descriptors[0]).expect("accepted"))
            .expect("registered");
        client.on_subscription_loaded(&subscription).await;

        tokio::time::sleep(Duration::from_millis(5000)).await;
        let counts: Vec<_> = probe.lock().iter().map(|(c, _)| *c).collect();
        assert_eq!(counts, [0, 1, 2]);
    }
}
