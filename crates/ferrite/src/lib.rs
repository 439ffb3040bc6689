//! # Ferrite
//!
//! A plugin-hosting dispatch runtime: independently compiled extension
//! modules declare handler functions for strongly-typed events, and
//! pluggable *subscription clients*, one per event family, claim, manage,
//! and dispatch to them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  extract   ┌────────────────────┐  try_accept  ┌──────────────┐
//! │ Registry │───────────▶│ HandlerDescriptors │─────────────▶│ Subscription │
//! │ (Loader) │            └────────────────────┘  (by client  │   Clients    │
//! └──────────┘                                     priority)  └──────┬───────┘
//!                                                                    │
//!             raw events ──▶ client ingress ──▶ Dispatcher ──fan-out─┘
//! ```
//!
//! - **Registry**: discovers plugins, drives their load state machine
//! - **Clients**: own one event family each; the loop client ships in-tree
//! - **Dispatcher**: per-client fan-out with priority ordering and
//!   per-invocation failure isolation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrite::prelude::*;
//! use std::time::Duration;
//!
//! struct Ping;
//!
//! impl Plugin for Ping {
//!     fn name(&self) -> &'static str {
//!         "ping"
//!     }
//!
//!     fn manifest(&self) -> Vec<RawHandler> {
//!         vec![
//!             RawHandler::handler("on_tick", |event: TickEvent| async move {
//!                 tracing::info!(count = event.count, "ping");
//!             })
//!             .interval(Duration::from_secs(2)),
//!         ]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> RuntimeResult<()> {
//!     let runtime = FerriteRuntime::new();
//!     runtime
//!         .register_client(Arc::new(LoopClient::new(runtime.tracker().clone())))
//!         .await;
//!     runtime
//!         .register_plugin(PluginDescriptor {
//!             name: "ping",
//!             gate: Gate::Always,
//!             singleton: true,
//!             create: || Ok(Arc::new(Ping)),
//!         })
//!         .await;
//!     runtime.run().await
//! }
//! ```

pub use ferrite_core as core;
pub use ferrite_runtime as runtime;

#[cfg(feature = "client-loop")]
pub use ferrite_client_loop as client_loop;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use ferrite::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use ferrite_runtime::{FerriteRuntime, RuntimeResult};

    // Plugin system - primary unit of event handling
    pub use ferrite_core::{Plugin, RawHandler};
    pub use ferrite_runtime::{Gate, PLUGINS, PluginDescriptor};

    // Event system - for building handlers and families
    pub use ferrite_core::{
        BoxedEvent, Event, EventFamily, FamilyId, FromEvent, Priority, TypedEvent, impl_event,
    };

    // Client contract - for implementing custom event families
    pub use ferrite_core::{
        Dispatcher, HandlerDescriptor, Subscription, SubscriptionClient, SubscriptionStorage,
    };

    // In-tree loop scheduler
    #[cfg(feature = "client-loop")]
    pub use ferrite_client_loop::{LoopClient, LoopFamily, TickEvent};
}
