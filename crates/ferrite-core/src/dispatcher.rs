//! Per-client event fan-out.
//!
//! A [`Dispatcher`] takes one concrete family event and invokes every
//! matching subscription as an independent asynchronous task:
//!
//! 1. the client's active-subscription set is snapshotted (copy-on-read, so
//!    concurrent plugin load/unload is tolerated);
//! 2. subscriptions whose declared parameter type is assignable from the
//!    event's runtime type (and whose filter predicate, if any, accepts it)
//!    remain;
//! 3. remaining subscriptions are sorted by priority (`Higher`, `Default`,
//!    `Lower`; ties keep registration order);
//! 4. each is invoked on its own tracked task. A failing handler is logged
//!    with plugin#function identity and never affects its siblings or the
//!    event source.
//!
//! Dispatch is fire-and-forget: it returns once the tasks are scheduled. The
//! runtime drains the shared [`TaskTracker`] at shutdown so in-flight
//! invocations complete before the process exits.

use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::event::BoxedEvent;
use crate::subscription::SubscriptionStorage;

/// The fan-out mechanism of one subscription client.
#[derive(Clone)]
pub struct Dispatcher {
    client_name: &'static str,
    storage: SubscriptionStorage,
    tracker: TaskTracker,
}

impl Dispatcher {
    /// Creates a dispatcher over the given client storage.
    ///
    /// The tracker is shared process-wide; every invocation task is spawned
    /// on it so shutdown can wait for the in-flight ones.
    pub fn new(
        client_name: &'static str,
        storage: SubscriptionStorage,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            client_name,
            storage,
            tracker,
        }
    }

    /// The tracker invocation tasks are spawned on.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Fans the event out to all matching subscriptions.
    ///
    /// Returns the number of invocations scheduled. Handler failures are
    /// captured inside their own tasks and never surface here.
    pub fn dispatch(&self, event: BoxedEvent) -> usize {
        let mut matching: Vec<_> = self
            .storage
            .snapshot()
            .into_iter()
            .filter(|subscription| subscription.matches(&*event))
            .collect();
        matching.sort_by_key(|subscription| subscription.priority());

        debug!(
            client = self.client_name,
            event_name = event.event_name(),
            subscriptions = matching.len(),
            "Dispatching event"
        );

        let scheduled = matching.len();
        for subscription in matching {
            let event = event.clone();
            let client = self.client_name;
            self.tracker.spawn(async move {
                if let Err(e) = subscription.invoke(event).await {
                    error!(
                        client,
                        subscription = %subscription.full_name(),
                        error = %e,
                        "Handler invocation failed"
                    );
                }
            });
        }
        scheduled
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("client", &self.client_name)
            .field("subscriptions", &self.storage.len())
            .finish()
    }
}
