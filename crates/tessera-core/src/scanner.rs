//! # Scanner
//!
//! Discovers unregistered marker nodes under a root and creates their
//! descriptors.
//!
//! - Lazy: one descriptor per `next()`, traversal state kept between calls
//! - Document order: ancestors are always registered before descendants,
//!   so `parent` and `depth` are computed incrementally in a single pass
//! - Non-fatal errors: unknown names and bad payloads skip the node only.
//!   A rejected payload is reported once; the node is retried when the
//!   payload changes

use crate::descriptor::{DescriptorSeed, DescriptorTable};
use crate::registry::Registry;
use crate::{BatchId, ConfigMap, DescriptorId, Document, ManagerConfig, NodeId, TesseraError};

/// Descriptors and errors produced by one scan pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Discovery {
    /// New descriptors in document order.
    pub descriptors: Vec<DescriptorId>,
    /// Scan errors in document order.
    pub errors: Vec<TesseraError>,
}

/// Single-use iterator over newly discovered descriptors.
///
/// Nodes already present in the table are skipped but their subtrees are
/// still walked, so markers injected inside known components are found.
pub struct Scanner<'a> {
    document: &'a Document,
    registry: &'a Registry,
    table: &'a mut DescriptorTable,
    config: &'a ManagerConfig,
    batch: BatchId,
    stack: Vec<NodeId>,
}

impl<'a> Scanner<'a> {
    /// Prepare a scan of the subtree rooted at `root` (inclusive).
    #[must_use]
    pub fn new(
        document: &'a Document,
        root: NodeId,
        registry: &'a Registry,
        table: &'a mut DescriptorTable,
        config: &'a ManagerConfig,
        batch: BatchId,
    ) -> Self {
        let stack = if document.contains(root) {
            vec![root]
        } else {
            Vec::new()
        };
        Self {
            document,
            registry,
            table,
            config,
            batch,
            stack,
        }
    }

    /// Drain the scanner, splitting descriptors from errors.
    #[must_use]
    pub fn into_discovery(self) -> Discovery {
        let mut discovery = Discovery::default();
        for result in self {
            match result {
                Ok(key) => discovery.descriptors.push(key),
                Err(err) => {
                    tracing::warn!(error = %err, "scan skipped marker node");
                    discovery.errors.push(err);
                }
            }
        }
        discovery
    }

    fn discover(&mut self, node: NodeId, name: &str) -> Result<DescriptorId, TesseraError> {
        let registration =
            self.registry
                .resolve(name)
                .map_err(|_| TesseraError::UnknownComponent {
                    name: name.to_string(),
                    node: Some(node),
                })?;

        let payload = self.document.attribute(node, &self.config.config_attribute);
        let dynamic_config = match parse_config(payload, node, self.config.max_config_length) {
            Ok(config) => config,
            Err(err) => {
                self.table.reject(node, payload.unwrap_or_default());
                return Err(err);
            }
        };

        let table = &*self.table;
        let parent = self
            .document
            .ancestors(node)
            .find_map(|ancestor| table.by_node(ancestor));
        let depth = parent
            .and_then(|key| table.get(key))
            .map_or(0, |descriptor| descriptor.depth().saturating_add(1));

        let component = (registration.factory)();
        let key = self.table.insert(DescriptorSeed {
            name: name.to_string(),
            node,
            component,
            parent,
            depth,
            static_config: registration.static_config.clone(),
            dynamic_config,
            batch: self.batch,
        });

        tracing::debug!(component = name, %node, depth, batch = self.batch.0, "discovered component");
        Ok(key)
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<DescriptorId, TesseraError>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = self.document;
        while let Some(node) = self.stack.pop() {
            self.stack
                .extend(document.children(node).iter().rev().copied());

            let Some(name) = document.attribute(node, &self.config.component_attribute) else {
                continue;
            };
            if self.table.contains_node(node)
                || self
                    .table
                    .is_rejected(node, document.attribute(node, &self.config.config_attribute))
            {
                continue;
            }
            return Some(self.discover(node, name.trim()));
        }
        None
    }
}

/// Parse a marker's configuration payload.
///
/// Absent or blank payloads yield an empty map. Anything but a JSON object
/// is rejected.
pub fn parse_config(
    payload: Option<&str>,
    node: NodeId,
    max_length: usize,
) -> Result<ConfigMap, TesseraError> {
    let Some(payload) = payload.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(ConfigMap::new());
    };
    if payload.len() > max_length {
        return Err(TesseraError::ConfigParse {
            node,
            message: format!(
                "payload of {} bytes exceeds the {max_length} byte limit",
                payload.len()
            ),
        });
    }
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => Err(TesseraError::ConfigParse {
            node,
            message: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
        Err(err) => Err(TesseraError::ConfigParse {
            node,
            message: err.to_string(),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// =============================================================================
// TESTS
// =============================================================================
