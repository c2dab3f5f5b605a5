//! # Built-in Components
//!
//! Small components that exercise every phase of the lifecycle from the CLI.
//!
//! - `accordion`: indexes `.accordion-item` children, opens one on `init`
//! - `dropdown`: builds its option list, applies selection, activates
//! - `include`: appends an HTML fragment and drives the markers inside it;
//!   with `replace` the previous content is removed first

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use tessera_core::{
    Component, ComponentContext, ComponentError, ConfigDirective, NodeId, PhaseResult, Registry,
    TesseraError,
};

// =============================================================================
// KINDS
// =============================================================================

/// The built-in component implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Collapsible item list.
    Accordion,
    /// Option list with a selection.
    Dropdown,
    /// Fragment injection.
    Include,
}

impl ComponentKind {
    /// Every kind, in name order.
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Accordion,
        ComponentKind::Dropdown,
        ComponentKind::Include,
    ];

    /// Default registry name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ComponentKind::Accordion => "accordion",
            ComponentKind::Dropdown => "dropdown",
            ComponentKind::Include => "include",
        }
    }

    /// Register this kind under `name`.
    pub fn register(
        self,
        registry: &mut Registry,
        name: &str,
        directives: Vec<ConfigDirective>,
    ) -> Result<(), TesseraError> {
        match self {
            ComponentKind::Accordion => registry.register(name, Accordion::default, Some(directives)),
            ComponentKind::Dropdown => registry.register(name, Dropdown::default, Some(directives)),
            ComponentKind::Include => registry.register(name, Include::default, Some(directives)),
        }
    }
}

/// Dynamic config first, then the static directive.
fn setting<'a>(cx: &'a ComponentContext, key: &str) -> Option<&'a serde_json::Value> {
    cx.dynamic_config().get(key).or_else(|| cx.directive(key))
}

// =============================================================================
// ACCORDION
// =============================================================================

/// Class marking accordion items.
pub const ACCORDION_ITEM_CLASS: &str = "accordion-item";

/// Indexes its items on `ready`; opens the item named by `open` on `init`.
#[derive(Debug, Default)]
pub struct Accordion {
    items: RefCell<Vec<NodeId>>,
}

#[async_trait(?Send)]
impl Component for Accordion {
    async fn ready(&self, cx: &ComponentContext) -> PhaseResult {
        let mut document = cx.document().borrow_mut();
        let items = document.elements_by_class(cx.node(), ACCORDION_ITEM_CLASS);
        for (index, &item) in items.iter().enumerate() {
            document.set_attribute(item, "data-accordion-index", index.to_string())?;
            document.set_attribute(item, "aria-expanded", "false")?;
        }
        tracing::debug!(component = %cx.id(), items = items.len(), "accordion ready");
        *self.items.borrow_mut() = items;
        Ok(())
    }

    async fn init(&self, cx: &ComponentContext) -> PhaseResult {
        let Some(open) = setting(cx, "open") else {
            return Ok(());
        };
        let index = open
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| ComponentError::new(format!("'open' must be an item index, got {open}")))?;

        let items = self.items.borrow();
        let item = items.get(index).copied().ok_or_else(|| {
            ComponentError::new(format!(
                "cannot open item {index}, accordion has {}",
                items.len()
            ))
        })?;

        let mut document = cx.document().borrow_mut();
        document.add_class(item, "open")?;
        document.set_attribute(item, "aria-expanded", "true")?;
        Ok(())
    }
}

// =============================================================================
// DROPDOWN
// =============================================================================

/// Builds a `<ul>` of options on `ready`, applies `selected`/`disabled` on
/// `init` and marks itself active on `enter`.
#[derive(Debug, Default)]
pub struct Dropdown {
    menu: Cell<Option<NodeId>>,
}

#[async_trait(?Send)]
impl Component for Dropdown {
    async fn ready(&self, cx: &ComponentContext) -> PhaseResult {
        let options: Vec<String> = match setting(cx, "options") {
            None => Vec::new(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ComponentError::new(format!("'options' must be a list of strings: {e}")))?,
        };

        let mut document = cx.document().borrow_mut();
        let menu = document.create_element("ul");
        document.set_attribute(menu, "class", "dropdown-menu")?;
        for option in &options {
            let entry = document.create_element("li");
            document.set_attribute(entry, "data-value", option.as_str())?;
            let label = document.create_text(option.as_str());
            document.append_child(entry, label)?;
            document.append_child(menu, entry)?;
        }
        document.append_child(cx.node(), menu)?;
        self.menu.set(Some(menu));
        Ok(())
    }

    async fn init(&self, cx: &ComponentContext) -> PhaseResult {
        let Some(menu) = self.menu.get() else {
            return Err("dropdown menu was not built".into());
        };
        let mut document = cx.document().borrow_mut();

        if let Some(selected) = setting(cx, "selected").and_then(|v| v.as_str()) {
            let entry = document
                .children(menu)
                .iter()
                .copied()
                .find(|&entry| document.attribute(entry, "data-value") == Some(selected))
                .ok_or_else(|| ComponentError::new(format!("no option named '{selected}'")))?;
            document.add_class(entry, "selected")?;
            document.set_attribute(cx.node(), "data-selected", selected)?;
        }

        if setting(cx, "disabled").and_then(serde_json::Value::as_bool) == Some(true) {
            document.set_attribute(cx.node(), "aria-disabled", "true")?;
        }
        Ok(())
    }

    async fn enter(&self, cx: &ComponentContext) -> PhaseResult {
        cx.document().borrow_mut().add_class(cx.node(), "active")?;
        Ok(())
    }
}

// =============================================================================
// INCLUDE
// =============================================================================

/// Appends the `html` setting on `enter` and waits for the injected
/// markers to be driven.
///
/// With `replace: true` the node's existing children are removed first, and
/// components bound inside them become prunable.
#[derive(Debug, Default)]
pub struct Include;

#[async_trait(?Send)]
impl Component for Include {
    async fn enter(&self, cx: &ComponentContext) -> PhaseResult {
        let Some(html) = setting(cx, "html") else {
            return Ok(());
        };
        let html = html
            .as_str()
            .ok_or_else(|| ComponentError::new("'html' must be a string"))?;

        let replace = setting(cx, "replace").and_then(serde_json::Value::as_bool) == Some(true);
        {
            let mut document = cx.document().borrow_mut();
            if replace {
                for child in document.children(cx.node()).to_vec() {
                    document.remove(child)?;
                }
            }
            document.append_html(cx.node(), html)?;
        }
        let report = cx.update()?.await;
        for error in &report.errors {
            tracing::warn!(component = %cx.id(), %error, "included markers failed");
        }

        cx.document()
            .borrow_mut()
            .set_attribute(cx.node(), "data-included", report.entered.len().to_string())?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{Document, Manager, ManagerConfig, Phase};
    use tokio::task::LocalSet;

    fn manager(html: &str) -> Manager {
        let mut registry = Registry::new();
        for kind in ComponentKind::ALL {
            kind.register(&mut registry, kind.name(), Vec::new())
                .expect("register");
        }
        Manager::new(Document::parse_html(html), registry, ManagerConfig::default())
    }

    fn html_of(manager: &Manager) -> String {
        let document = manager.document();
        let document = document.borrow();
        document.to_html(document.root())
    }

    #[tokio::test]
    async fn accordion_opens_configured_item() {
        LocalSet::new()
            .run_until(async {
                let manager = manager(
                    r#"<div data-component="accordion" data-config='{"open":1}'>
                         <div class="accordion-item">A</div>
                         <div class="accordion-item" id="second">B</div>
                       </div>"#,
                );

                let report = manager.update(None).await;
                assert!(report.is_clean(), "{:?}", report.errors);

                let document = manager.document();
                let document = document.borrow();
                let second = document.find_by_attribute("id", "second").expect("second");
                assert!(document.has_class(second, "open"));
                assert_eq!(document.attribute(second, "aria-expanded"), Some("true"));
                assert_eq!(document.attribute(second, "data-accordion-index"), Some("1"));
            })
            .await;
    }

    #[tokio::test]
    async fn accordion_rejects_missing_item() {
        LocalSet::new()
            .run_until(async {
                let manager = manager(r#"<div data-component="accordion" data-config='{"open":3}' id="a"></div>"#);

                let report = manager.update(None).await;

                assert!(matches!(
                    &report.errors[..],
                    [TesseraError::Lifecycle { phase: Phase::Init, .. }]
                ));
                let node = manager
                    .document()
                    .borrow()
                    .find_by_attribute("id", "a")
                    .expect("a");
                assert_eq!(manager.describe(node).expect("view").failed, Some(Phase::Init));
            })
            .await;
    }

    #[tokio::test]
    async fn dropdown_builds_selects_and_activates() {
        LocalSet::new()
            .run_until(async {
                let manager = manager(
                    r#"<div data-component="dropdown" id="d"
                            data-config='{"options":["red","green"],"selected":"green","disabled":true}'></div>"#,
                );

                let report = manager.update(None).await;
                assert!(report.is_clean(), "{:?}", report.errors);

                let html = html_of(&manager);
                assert!(html.contains(r#"<li data-value="red">red</li>"#));
                assert!(html.contains(r#"<li class="selected" data-value="green">green</li>"#));

                let document = manager.document();
                let document = document.borrow();
                let node = document.find_by_attribute("id", "d").expect("d");
                assert!(document.has_class(node, "active"));
                assert_eq!(document.attribute(node, "data-selected"), Some("green"));
                assert_eq!(document.attribute(node, "aria-disabled"), Some("true"));
            })
            .await;
    }

    #[tokio::test]
    async fn include_drives_injected_markers() {
        LocalSet::new()
            .run_until(async {
                let manager = manager(
                    r#"<div data-component="include" id="inc"
                            data-config='{"html":"<div data-component=\"dropdown\" id=\"nested\"></div>"}'></div>"#,
                );

                let report = manager.update(None).await;
                assert!(report.is_clean(), "{:?}", report.errors);
                assert_eq!(report.entered.len(), 1);

                let document = manager.document();
                let (include, nested) = {
                    let document = document.borrow();
                    (
                        document.find_by_attribute("id", "inc").expect("inc"),
                        document.find_by_attribute("id", "nested").expect("nested"),
                    )
                };
                assert_eq!(document.borrow().attribute(include, "data-included"), Some("1"));

                let view = manager.describe(nested).expect("nested view");
                assert!(view.entered);
                assert_eq!(view.depth, 1);
                assert!(document.borrow().has_class(nested, "active"));
            })
            .await;
    }

    #[tokio::test]
    async fn include_falls_back_to_directive() {
        LocalSet::new()
            .run_until(async {
                let mut registry = Registry::new();
                ComponentKind::Include
                    .register(
                        &mut registry,
                        "footer",
                        vec![ConfigDirective::new("html", serde_json::json!("<p>bye</p>"))],
                    )
                    .expect("register");
                let manager = Manager::new(
                    Document::parse_html(r#"<footer data-component="footer"></footer>"#),
                    registry,
                    ManagerConfig::default(),
                );

                manager.update(None).await;

                assert!(html_of(&manager).contains("<p>bye</p>"));
            })
            .await;
    }

    #[tokio::test]
    async fn include_replace_detaches_previous_content() {
        LocalSet::new()
            .run_until(async {
                let manager = manager(
                    r#"<div data-component="include" id="inc"
                            data-config='{"html":"<p>new</p>","replace":true}'>
                         <div data-component="accordion" id="old">
                           <div class="accordion-item">old</div>
                         </div>
                       </div>"#,
                );

                let report = manager.update(None).await;
                assert!(report.is_clean(), "{:?}", report.errors);
                assert_eq!(report.entered.len(), 2);

                let html = html_of(&manager);
                assert!(html.contains("<p>new</p>"));
                assert!(!html.contains("accordion-item"));

                let pruned = manager.prune();
                assert_eq!(pruned.len(), 1);
                assert_eq!(manager.len(), 1);
            })
            .await;
    }
}
