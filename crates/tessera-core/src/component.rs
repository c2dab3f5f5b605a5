//! # Component Contract
//!
//! The capability every component instance implements, and the context the
//! scheduler hands to each phase.
//!
//! Phases are trait methods with no-op defaults, so a component that only
//! needs structural setup implements `ready` and nothing else. The trait is
//! `?Send`: everything runs on one logical thread and components keep their
//! state in `Cell`/`RefCell`.

use crate::manager::{BatchHandle, WeakManager};
use crate::{ComponentError, ComponentId, ConfigDirective, ConfigMap, Document, NodeId, TesseraError};
use async_trait::async_trait;
use std::cell::RefCell;
use std::rc::Rc;

/// Result of a single lifecycle phase.
pub type PhaseResult = Result<(), ComponentError>;

/// A behavior unit bound to a marker node.
///
/// Each returned future must settle exactly once. Do not hold a
/// `RefCell` borrow of the document across an `.await`.
#[async_trait(?Send)]
pub trait Component {
    /// Structural setup: locate or create internal structure.
    ///
    /// Must not assume any sibling's `ready` has completed.
    async fn ready(&self, _cx: &ComponentContext) -> PhaseResult {
        Ok(())
    }

    /// Behavioral wiring.
    ///
    /// Every `ready` of the containing batch has settled.
    async fn init(&self, _cx: &ComponentContext) -> PhaseResult {
        Ok(())
    }

    /// Layout-dependent activation.
    ///
    /// Every `init` of the containing batch has settled.
    async fn enter(&self, _cx: &ComponentContext) -> PhaseResult {
        Ok(())
    }

    /// Called once when the descriptor is pruned.
    fn dispose(&self) {}
}

/// Constructs a fresh component instance.
pub type ComponentFactory = Rc<dyn Fn() -> Rc<dyn Component>>;

// =============================================================================
// CONTEXT
// =============================================================================

/// Everything a phase may know about its own instance.
#[derive(Clone)]
pub struct ComponentContext {
    pub(crate) id: ComponentId,
    pub(crate) name: String,
    pub(crate) node: NodeId,
    pub(crate) depth: usize,
    pub(crate) parent: Option<ComponentId>,
    pub(crate) static_config: Rc<[ConfigDirective]>,
    pub(crate) dynamic_config: Rc<ConfigMap>,
    pub(crate) document: Rc<RefCell<Document>>,
    pub(crate) manager: WeakManager,
}

impl ComponentContext {
    /// The component's id.
    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// The registry name the component was resolved from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound marker node.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Nesting depth among components.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Id of the nearest ancestor component.
    #[must_use]
    pub fn parent(&self) -> Option<&ComponentId> {
        self.parent.as_ref()
    }

    /// Registry-supplied directives, in registration order.
    #[must_use]
    pub fn static_config(&self) -> &[ConfigDirective] {
        &self.static_config
    }

    /// First static directive with the given name.
    #[must_use]
    pub fn directive(&self, name: &str) -> Option<&serde_json::Value> {
        self.static_config
            .iter()
            .find(|directive| directive.name == name)
            .map(|directive| &directive.value)
    }

    /// Configuration parsed from the marker node.
    #[must_use]
    pub fn dynamic_config(&self) -> &ConfigMap {
        &self.dynamic_config
    }

    /// Shared handle to the document.
    #[must_use]
    pub fn document(&self) -> &Rc<RefCell<Document>> {
        &self.document
    }

    /// Scan this component's own subtree for new markers and drive them.
    ///
    /// The batch runs whether or not the returned handle is awaited; await
    /// it to wait for the injected components to settle.
    pub fn update(&self) -> Result<BatchHandle, TesseraError> {
        self.manager.update(Some(self.node))
    }

    /// Scan the whole document for new markers and drive them.
    pub fn update_document(&self) -> Result<BatchHandle, TesseraError> {
        self.manager.update(None)
    }
}

impl std::fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("node", &self.node)
            .field("depth", &self.depth)
            .field("parent", &self.parent)
            .finish()
    }
}
