//! # Ferrite Core
//!
//! The subscription and dispatch core of the Ferrite plugin runtime.
//!
//! Ferrite hosts independently compiled extension modules ("plugins") that
//! declare handler functions for strongly-typed events, without the runtime
//! knowing in advance what event families exist. This crate provides the
//! generic machinery:
//!
//! - **Events** ([`event`]) - the [`Event`] marker trait, structural family
//!   identity ([`FamilyId`]), and typed extraction ([`FromEvent`]).
//! - **Plugins** ([`plugin`]) - the [`Plugin`] contract and the handler
//!   manifest ([`RawHandler`]) a plugin exposes.
//! - **Extraction** ([`extract`]) - validation of manifest entries into
//!   [`HandlerDescriptor`]s, with per-function diagnostics.
//! - **Subscriptions** ([`subscription`]) - the accepted
//!   handler-to-client bindings and their copy-on-read storage.
//! - **Clients** ([`client`]) - the [`SubscriptionClient`] capability owning
//!   one event family's matching and lifecycle.
//! - **Dispatch** ([`dispatcher`]) - per-client fan-out with priority
//!   ordering and per-invocation failure isolation.
//!
//! ```text
//! Loader ──extract──▶ HandlerDescriptor ──try_accept──▶ Subscription
//!                                                           │
//!                 raw event ──▶ client ──▶ Dispatcher ──fan-out──▶ handlers
//! ```

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod extract;
pub mod plugin;
pub mod subscription;

pub use client::SubscriptionClient;
pub use dispatcher::Dispatcher;
pub use error::{BoxError, RejectReason};
pub use event::{BoxedEvent, Event, EventFamily, FamilyId, FromEvent, TypedEvent};
pub use extract::{Extraction, ExtractionDiagnostic, HandlerDescriptor, extract};
pub use plugin::{
    EventBinding, EventPredicate, HandlerFn, HandlerFuture, IntoHandlerResult, Plugin, RawHandler,
};
pub use subscription::{HandlerAttrs, Priority, Subscription, SubscriptionStorage};
