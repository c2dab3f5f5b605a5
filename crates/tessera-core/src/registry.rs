//! # Component Registry
//!
//! Maps a component name to its factory and static configuration.
//!
//! - Names are bound at most once; the first registration wins
//! - Lookups never construct anything; the scanner calls the factory

use crate::component::{Component, ComponentFactory};
use crate::{ConfigDirective, TesseraError};
use std::collections::BTreeMap;
use std::rc::Rc;

/// A resolved registry entry.
#[derive(Clone)]
pub struct Registration {
    /// Builds one component instance per marker node.
    pub factory: ComponentFactory,
    /// Directives handed to every instance of this component.
    pub static_config: Rc<[ConfigDirective]>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("static_config", &self.static_config)
            .finish_non_exhaustive()
    }
}

/// Name → construction capability.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: BTreeMap<String, Registration>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a factory.
    ///
    /// Returns `TesseraError::DuplicateRegistration` if the name is taken;
    /// the existing registration is left untouched.
    pub fn register<F, C>(
        &mut self,
        name: impl Into<String>,
        factory: F,
        static_config: Option<Vec<ConfigDirective>>,
    ) -> Result<(), TesseraError>
    where
        F: Fn() -> C + 'static,
        C: Component + 'static,
    {
        let factory: ComponentFactory = Rc::new(move || Rc::new(factory()) as Rc<dyn Component>);
        self.register_factory(name, factory, static_config)
    }

    /// Bind `name` to an already type-erased factory.
    pub fn register_factory(
        &mut self,
        name: impl Into<String>,
        factory: ComponentFactory,
        static_config: Option<Vec<ConfigDirective>>,
    ) -> Result<(), TesseraError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(TesseraError::DuplicateRegistration(name));
        }
        tracing::debug!(component = %name, "registered component");
        self.entries.insert(
            name,
            Registration {
                factory,
                static_config: static_config.unwrap_or_default().into(),
            },
        );
        Ok(())
    }

    /// Look up a registration.
    pub fn resolve(&self, name: &str) -> Result<&Registration, TesseraError> {
        self.entries
            .get(name)
            .ok_or_else(|| TesseraError::UnknownComponent {
                name: name.to_string(),
                node: None,
            })
    }

    /// Check if a name is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
