//! Handler descriptor extraction.
//!
//! Given a plugin instance, [`extract`] walks its manifest and derives one
//! [`HandlerDescriptor`] per well-formed candidate handler. Malformed entries
//! are skipped with a diagnostic; extraction itself never fails, so one bad
//! function cannot block the rest of the plugin.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::RejectReason;
use crate::event::{Event, FamilyId};
use crate::plugin::{EventBinding, HandlerFn, Plugin, RawHandler};
use crate::subscription::{HandlerAttrs, Priority};

// ============================================================================
// HandlerDescriptor
// ============================================================================

/// An extracted, validated candidate handler, not yet matched to a client.
///
/// Created at plugin load time and immutable thereafter. Carries a shared
/// back-reference to the owning plugin; the registry remains the owner of the
/// plugin's lifecycle.
pub struct HandlerDescriptor {
    plugin: Arc<dyn Plugin>,
    name: &'static str,
    binding: EventBinding,
    priority: Priority,
    attrs: HandlerAttrs,
    invoke: HandlerFn,
}

impl HandlerDescriptor {
    /// The owning plugin.
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    /// The handler function's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `"plugin#function"`, for logs.
    pub fn full_name(&self) -> String {
        format!("{}#{}", self.plugin.name(), self.name)
    }

    /// The family of the declared parameter type.
    pub fn family(&self) -> FamilyId {
        self.binding.family()
    }

    /// The declared parameter type's binding.
    pub fn binding(&self) -> &EventBinding {
        &self.binding
    }

    /// Declared dispatch priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Family-specific attributes.
    pub fn attrs(&self) -> &HandlerAttrs {
        &self.attrs
    }

    /// The assignability check for the declared parameter type.
    pub fn accepts_fn(&self) -> fn(&dyn Event) -> bool {
        self.binding.accepts()
    }

    /// A clone of the type-erased invoker.
    pub fn invoker(&self) -> HandlerFn {
        Arc::clone(&self.invoke)
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("plugin", &self.plugin.name())
            .field("function", &self.name)
            .field("binding", &self.binding)
            .field("priority", &self.priority)
            .finish()
    }
}

// ============================================================================
// Extraction result
// ============================================================================

/// One rejected manifest entry.
#[derive(Debug, Clone)]
pub struct ExtractionDiagnostic {
    /// The owning plugin's qualified name.
    pub plugin: &'static str,
    /// The rejected function's name.
    pub function: &'static str,
    /// Why it was rejected.
    pub reason: RejectReason,
}

/// The outcome of extracting one plugin's manifest.
#[derive(Default)]
pub struct Extraction {
    /// Well-formed candidate handlers, in declaration order.
    pub descriptors: Vec<HandlerDescriptor>,
    /// One entry per rejected function, in declaration order.
    pub diagnostics: Vec<ExtractionDiagnostic>,
}

/// Extracts handler descriptors from the plugin's manifest.
///
/// Validation per entry, in order:
///
/// 1. parameter count must be exactly 1;
/// 2. the parameter must be an event type;
/// 3. inherited default implementations are never registered;
/// 4. the function must be publicly invokable;
/// 5. a non-unit return type is accepted but flagged as a style warning.
///
/// Every rejection is logged with plugin#function identity and returned as a
/// diagnostic.
pub fn extract(plugin: &Arc<dyn Plugin>) -> Extraction {
    let plugin_name = plugin.name();
    let mut extraction = Extraction::default();

    let reject = |diagnostics: &mut Vec<ExtractionDiagnostic>, function, reason| {
        diagnostics.push(ExtractionDiagnostic {
            plugin: plugin_name,
            function,
            reason,
        });
    };

    for raw in plugin.manifest() {
        let RawHandler {
            name,
            arity,
            public,
            default_body,
            returns_unit,
            binding,
            invoke,
            priority,
            attrs,
        } = raw;

        if arity != 1 {
            trace!(
                function = %format_args!("{plugin_name}#{name}"),
                arity,
                "Parameter count is not 1, skipping"
            );
            reject(&mut extraction.diagnostics, name, RejectReason::WrongArity(arity));
            continue;
        }

        let (Some(binding), Some(invoke)) = (binding, invoke) else {
            trace!(
                function = %format_args!("{plugin_name}#{name}"),
                "Parameter is not an event type, skipping"
            );
            reject(&mut extraction.diagnostics, name, RejectReason::NotAnEvent);
            continue;
        };

        if default_body {
            trace!(
                function = %format_args!("{plugin_name}#{name}"),
                "Default implementation, skipping"
            );
            reject(&mut extraction.diagnostics, name, RejectReason::DefaultBody);
            continue;
        }

        if !public {
            warn!(
                function = %format_args!("{plugin_name}#{name}"),
                "Not publicly invokable, skipping"
            );
            reject(&mut extraction.diagnostics, name, RejectReason::NotPublic);
            continue;
        }

        if !returns_unit {
            warn!(
                function = %format_args!("{plugin_name}#{name}"),
                "Return type is not unit; a unit return is recommended"
            );
        }

        extraction.descriptors.push(HandlerDescriptor {
            plugin: Arc::clone(plugin),
            name,
            binding,
            priority,
            attrs,
            invoke,
        });
    }

    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventFamily;

    struct TestFamily;

    impl EventFamily for TestFamily {
        const NAME: &'static str = "test";
    }

    #[derive(Debug, Clone)]
    struct TestEvent;

    crate::impl_event!(TestEvent, family: TestFamily);

    struct MixedPlugin;

    impl Plugin for MixedPlugin {
        fn name(&self) -> &'static str {
            "mixed"
        }

        fn manifest(&self) -> Vec<RawHandler> {
            vec![
                RawHandler::handler("valid_a", |_: TestEvent| async {}),
                RawHandler::opaque("two_params", 2),
                RawHandler::opaque("not_an_event", 1),
                RawHandler::handler("inherited", |_: TestEvent| async {}).default_body(),
                RawHandler::handler("hidden", |_: TestEvent| async {}).private(),
                RawHandler::handler("valid_b", |_: TestEvent| async {})
                    .priority(Priority::Higher),
            ]
        }
    }

    #[test]
    fn valid_and_invalid_entries_are_counted_independently() {
        let plugin: Arc<dyn Plugin> = Arc::new(MixedPlugin);
        let extraction = extract(&plugin);

        assert_eq!(extraction.descriptors.len(), 2);
        assert_eq!(extraction.diagnostics.len(), 4);

        let names: Vec<_> = extraction.descriptors.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["valid_a", "valid_b"]);
    }

    #[test]
    fn rejection_reasons_match_the_shape() {
        let plugin: Arc<dyn Plugin> = Arc::new(MixedPlugin);
        let extraction = extract(&plugin);

        let reasons: Vec<_> = extraction
            .diagnostics
            .iter()
            .map(|d| (d.function, d.reason))
            .collect();
        assert_eq!(
            reasons,
            [
                ("two_params", RejectReason::WrongArity(2)),
                ("not_an_event", RejectReason::NotAnEvent),
                ("inherited", RejectReason::DefaultBody),
                ("hidden", RejectReason::NotPublic),
            ]
        );
    }

    #[test]
    fn descriptors_carry_declared_metadata() {
        let plugin: Arc<dyn Plugin> = Arc::new(MixedPlugin);
        let extraction = extract(&plugin);

        let valid_b = &extraction.descriptors[1];
        assert_eq!(valid_b.priority(), Priority::Higher);
        assert_eq!(valid_b.family(), FamilyId::of::<TestFamily>());
        assert_eq!(valid_b.full_name(), "mixed#valid_b");
    }

    #[test]
    fn non_unit_return_is_accepted() {
        struct Styled;

        impl Plugin for Styled {
            fn name(&self) -> &'static str {
                "styled"
            }

            fn manifest(&self) -> Vec<RawHandler> {
                vec![RawHandler::handler("noisy", |_: TestEvent| async {}).returns_value()]
            }
        }

        let plugin: Arc<dyn Plugin> = Arc::new(Styled);
        let extraction = extract(&plugin);
        assert_eq!(extraction.descriptors.len(), 1);
        assert!(extraction.diagnostics.is_empty());
    }
}
