//! Plugin contract and handler manifest.
//!
//! A plugin is a named, stateful extension unit exposing event-handler
//! functions. Instead of runtime reflection, each plugin supplies a
//! *manifest*: an explicit registration table of [`RawHandler`] entries built
//! at load time, one per candidate function. The
//! [extractor](crate::extract::extract) validates each entry's shape and
//! turns the well-formed ones into handler descriptors.
//!
//! # Example
//!
//! ```rust,ignore
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
//!                 info!(count = event.count, "tick");
//!             })
//!             .interval(Duration::from_secs(2)),
//!         ]
//!     }
//! }
//! ```

use std::any::TypeId;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::BoxError;
use crate::event::{BoxedEvent, Event, FamilyId, TypedEvent};
use crate::subscription::{HandlerAttrs, Priority};

// ============================================================================
// Plugin trait
// ============================================================================

/// A loadable extension unit exposing zero or more event-handler functions.
///
/// Exactly one instance per plugin is live at a time; the registry owns it
/// for its entire loaded lifetime. Plugins needing mutable state across
/// events use interior mutability; handler invocations may run concurrently.
pub trait Plugin: Send + Sync {
    /// Qualified plugin name, unique across the process.
    fn name(&self) -> &'static str;

    /// Human-readable display name.
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// The registration table of candidate handler functions.
    ///
    /// Called once per load; entries are validated and matched to
    /// subscription clients in declaration order.
    fn manifest(&self) -> Vec<RawHandler>;
}

// ============================================================================
// Handler function plumbing
// ============================================================================

/// Future returned by a type-erased handler invocation.
pub type HandlerFuture = BoxFuture<'static, Result<(), BoxError>>;

/// A type-erased, invocable handler function.
pub type HandlerFn = Arc<dyn Fn(BoxedEvent) -> HandlerFuture + Send + Sync>;

/// A family-specific event filter predicate.
pub type EventPredicate = Arc<dyn Fn(&dyn Event) -> bool + Send + Sync>;

/// Conversion from a handler's return value into the uniform invocation
/// result.
///
/// Implemented for `()` and for `Result<(), E>`. Handlers returning anything
/// else do not type-check as manifest entries.
pub trait IntoHandlerResult {
    /// Converts the handler return value.
    fn into_handler_result(self) -> Result<(), BoxError>;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E: Into<BoxError>> IntoHandlerResult for Result<(), E> {
    fn into_handler_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// EventBinding
// ============================================================================

/// How a handler binds to its single event parameter.
///
/// Captures the declared parameter type's family, identity, and an
/// assignability check, all derived statically from the type: no event
/// instance is needed to match a handler to a client.
#[derive(Clone, Copy)]
pub struct EventBinding {
    family: FamilyId,
    event_type: TypeId,
    event_type_name: &'static str,
    accepts: fn(&dyn Event) -> bool,
}

impl EventBinding {
    /// Builds the binding for parameter type `E`.
    pub fn of<E: TypedEvent + 'static>() -> Self {
        fn accepts<E: TypedEvent>(event: &dyn Event) -> bool {
            E::from_event(event).is_some()
        }

        Self {
            family: FamilyId::of::<E::Family>(),
            event_type: TypeId::of::<E>(),
            event_type_name: std::any::type_name::<E>(),
            accepts: accepts::<E>,
        }
    }

    /// The family owning the declared parameter type.
    pub fn family(&self) -> FamilyId {
        self.family
    }

    /// Identity of the declared parameter type.
    pub fn event_type(&self) -> TypeId {
        self.event_type
    }

    /// Full name of the declared parameter type.
    pub fn event_type_name(&self) -> &'static str {
        self.event_type_name
    }

    /// Whether the declared parameter type is assignable from the given
    /// event's runtime type.
    pub fn accepts(&self) -> fn(&dyn Event) -> bool {
        self.accepts
    }
}

impl std::fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBinding")
            .field("family", &self.family.name())
            .field("event_type", &self.event_type_name)
            .finish()
    }
}

// ============================================================================
// RawHandler
// ============================================================================

/// One entry in a plugin's handler manifest, before validation.
///
/// Typed entries are built with [`RawHandler::handler`]; shapes the extractor
/// must reject (wrong arity, non-event parameters) are representable through
/// [`RawHandler::opaque`] and the builder flags, so a plugin's manifest can
/// describe every function it declares, valid or not.
pub struct RawHandler {
    pub(crate) name: &'static str,
    pub(crate) arity: usize,
    pub(crate) public: bool,
    pub(crate) default_body: bool,
    pub(crate) returns_unit: bool,
    pub(crate) binding: Option<EventBinding>,
    pub(crate) invoke: Option<HandlerFn>,
    pub(crate) priority: Priority,
    pub(crate) attrs: HandlerAttrs,
}

impl RawHandler {
    /// A well-formed handler entry: one event parameter of type `E`, invoked
    /// through the async function `f`.
    pub fn handler<E, F, Fut, R>(name: &'static str, f: F) -> Self
    where
        E: TypedEvent + 'static,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult + Send + 'static,
    {
        let f = Arc::new(f);
        let invoke: HandlerFn = Arc::new(move |event: BoxedEvent| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                match event.extract::<E>() {
                    Some(typed) => f(typed).await.into_handler_result(),
                    None => Err(format!(
                        "event '{}' is not assignable to parameter type '{}'",
                        event.event_name(),
                        std::any::type_name::<E>()
                    )
                    .into()),
                }
            })
        });

        Self {
            name,
            arity: 1,
            public: true,
            default_body: false,
            returns_unit: true,
            binding: Some(EventBinding::of::<E>()),
            invoke: Some(invoke),
            priority: Priority::Default,
            attrs: HandlerAttrs::default(),
        }
    }

    /// An entry whose parameters are not event-typed, present in the
    /// manifest only so extraction can diagnose and skip it.
    pub fn opaque(name: &'static str, arity: usize) -> Self {
        Self {
            name,
            arity,
            public: true,
            default_body: false,
            returns_unit: true,
            binding: None,
            invoke: None,
            priority: Priority::Default,
            attrs: HandlerAttrs::default(),
        }
    }

    /// Sets the dispatch priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches the fixed invocation interval required by the loop family.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.attrs.interval = Some(interval);
        self
    }

    /// Attaches a family-specific event filter predicate.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Event) -> bool + Send + Sync + 'static,
    {
        self.attrs.filter = Some(Arc::new(predicate));
        self
    }

    /// Marks the entry as an inherited default implementation.
    pub fn default_body(mut self) -> Self {
        self.default_body = true;
        self
    }

    /// Marks the entry as not publicly invokable.
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    /// Marks the entry as returning a non-unit value.
    pub fn returns_value(mut self) -> Self {
        self.returns_unit = false;
        self
    }

    /// The function's name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for RawHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHandler")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("public", &self.public)
            .field("default_body", &self.default_body)
            .field("binding", &self.binding)
            .field("priority", &self.priority)
            .finish()
    }
}
