//! Event system for the Ferrite runtime.
//!
//! This module provides the core event infrastructure:
//!
//! - [`Event`] - Base trait for all events
//! - [`EventFamily`] / [`FamilyId`] - Family identity for event types
//! - [`FromEvent`] - Trait for extracting typed events
//! - [`BoxedEvent`] - Type-erased event container
//!
//! # Event families
//!
//! Every event belongs to exactly one *family*: a closed group of related
//! event types owned by one subscription client. Family identity is
//! structural, the [`TypeId`] of a zero-sized marker type implementing
//! [`EventFamily`], never name-based.
//!
//! # Typed extraction
//!
//! Handlers can request events at any level of a family's hierarchy. A
//! concrete event type extracts only itself; a family base type implements
//! [`FromEvent`] to match every subtype it covers:
//!
//! ```rust,ignore
//! // Extract the most specific event type
//! async fn on_track_start(event: TrackStartEvent) { /* … */ }
//!
//! // Extract the family base, matching any audio event
//! async fn on_audio(event: AudioEvent) { /* … */ }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

// ============================================================================
// Family Identity
// ============================================================================

/// Marker trait for event-family identifier types.
///
/// A family is declared by a (usually zero-sized) marker type:
///
/// ```rust,ignore
/// pub struct LoopFamily;
///
/// impl EventFamily for LoopFamily {
///     const NAME: &'static str = "loop";
/// }
/// ```
pub trait EventFamily: 'static {
    /// Human-readable family name, used in logs and diagnostics only.
    const NAME: &'static str;
}

/// Structural identity of an event family.
///
/// Two `FamilyId`s are equal iff they were created from the same
/// [`EventFamily`] marker type. The carried name participates only in
/// formatting, never in comparison.
#[derive(Debug, Clone, Copy)]
pub struct FamilyId {
    id: TypeId,
    name: &'static str,
}

impl FamilyId {
    /// Returns the identity of family `F`.
    pub fn of<F: EventFamily>() -> Self {
        Self {
            id: TypeId::of::<F>(),
            name: F::NAME,
        }
    }

    /// Returns the family's diagnostic name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for FamilyId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FamilyId {}

impl Hash for FamilyId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// Core Event Trait
// ============================================================================

/// The base trait for all events in the Ferrite runtime.
///
/// Events are type-erased as `dyn Event` while travelling through a
/// dispatcher and downcast back to concrete types via `as_any()`.
pub trait Event: Any + Send + Sync {
    /// Returns the human-readable name of this event type.
    fn event_name(&self) -> &'static str;

    /// Returns the identity of the family this event belongs to.
    fn family(&self) -> FamilyId;

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Trait for extracting a typed event from a type-erased one.
///
/// This is the assignability seam used during dispatch: a subscription whose
/// declared parameter type is `T` matches a concrete event `e` exactly when
/// `T::from_event(&e)` succeeds. Concrete event types extract themselves by
/// downcast (see [`impl_event!`](crate::impl_event)); family base types
/// implement this manually to cover every subtype.
pub trait FromEvent: Sized {
    /// Attempts to extract this event type from the given event.
    fn from_event(root: &dyn Event) -> Option<Self>;
}

/// An event type whose family is known statically.
///
/// This is what a handler's single parameter must implement: it ties the
/// parameter type to the family that owns it, so a handler descriptor can be
/// matched to the right subscription client without an event instance.
pub trait TypedEvent: Event + FromEvent {
    /// The family marker type this event belongs to.
    type Family: EventFamily;
}

// ============================================================================
// Boxed Event
// ============================================================================

/// A type-erased container for events that supports runtime downcasting.
///
/// `BoxedEvent` wraps any type implementing [`Event`] in an `Arc`, allowing
/// it to be cloned cheaply into every dispatch task without knowing its
/// concrete type.
#[derive(Clone)]
pub struct BoxedEvent {
    inner: Arc<dyn Event>,
}

impl BoxedEvent {
    /// Creates a new `BoxedEvent` from any type implementing `Event`.
    pub fn new<E: Event + 'static>(event: E) -> Self {
        Self {
            inner: Arc::new(event),
        }
    }

    /// Returns the inner `Arc<dyn Event>`.
    pub fn inner(&self) -> &Arc<dyn Event> {
        &self.inner
    }

    /// Attempts to downcast to a concrete event type.
    pub fn downcast_ref<E: Event + 'static>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref()
    }

    /// Attempts to extract a typed event using [`FromEvent`].
    pub fn extract<E: FromEvent>(&self) -> Option<E> {
        E::from_event(self.inner.as_ref())
    }
}

impl Deref for BoxedEvent {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for BoxedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedEvent")
            .field("event_name", &self.event_name())
            .field("family", &self.family().name())
            .finish()
    }
}

// ============================================================================
// impl_event!
// ============================================================================

/// Implements [`Event`], [`FromEvent`], and [`TypedEvent`] for a concrete
/// event type.
///
/// The type must be `Clone`; extraction is by downcast, so the produced
/// `FromEvent` impl matches exactly this type. Family base types that should
/// match several subtypes implement the traits by hand instead.
///
/// ```rust,ignore
/// #[derive(Debug, Clone)]
/// pub struct TickEvent {
///     pub count: u64,
/// }
///
/// impl_event!(TickEvent, family: LoopFamily);
/// ```
#[macro_export]
macro_rules! impl_event {
    ($ty:ty, family: $family:ty) => {
        impl $crate::Event for $ty {
            fn event_name(&self) -> &'static str {
                ::std::stringify!($ty)
            }

            fn family(&self) -> $crate::FamilyId {
                $crate::FamilyId::of::<$family>()
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }

        impl $crate::FromEvent for $ty {
            fn from_event(root: &dyn $crate::Event) -> ::std::option::Option<Self> {
                root.as_any().downcast_ref::<$ty>().cloned()
            }
        }

        impl $crate::TypedEvent for $ty {
            type Family = $family;
        }
    };
}
