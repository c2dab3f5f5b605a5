//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the scheduler:
//! - Identifiers (`NodeId`, `DescriptorId`, `ComponentId`, `BatchId`)
//! - Lifecycle phases (`Phase`)
//! - Configuration payloads (`ConfigDirective`, `ConfigMap`)
//! - Error types (`TesseraError`, `ComponentError`)
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! and keep discovery output in a stable order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a node in a [`Document`](crate::Document) arena.
///
/// Node ids are never reused within a document, so a stale id simply
/// stops resolving once its node is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena key of a descriptor inside a [`DescriptorTable`](crate::DescriptorTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DescriptorId(pub u64);

/// Public, string-valued identity of a component instance.
///
/// Generated once per descriptor from the configured prefix and a counter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
    /// Create a component id from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequence number of a discovery batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct BatchId(pub u64);

impl BatchId {
    /// The batch that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

// =============================================================================
// LIFECYCLE PHASES
// =============================================================================

/// One asynchronous step of a component lifecycle.
///
/// Phases run in declaration order, each behind a batch-wide barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Structural setup. No layout reads.
    Ready,
    /// Behavioral wiring. The whole batch is ready.
    Init,
    /// Layout-dependent activation. The whole batch is initialized.
    Enter,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 3] = [Phase::Ready, Phase::Init, Phase::Enter];

    /// Lowercase phase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Phase::Ready => "ready",
            Phase::Init => "init",
            Phase::Enter => "enter",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// CONFIGURATION PAYLOADS
// =============================================================================

/// Per-node configuration parsed from the marker's configuration attribute.
///
/// Values are opaque to the scheduler.
pub type ConfigMap = BTreeMap<String, serde_json::Value>;

/// A registry-supplied configuration directive.
///
/// Directives are ordered and fixed at registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDirective {
    /// Directive name.
    pub name: String,
    /// Opaque directive value.
    pub value: serde_json::Value,
}

impl ConfigDirective {
    /// Create a new directive.
    #[must_use]
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Tessera system.
///
/// Scan and phase errors are collected into batch reports rather than
/// propagated, so the type is `Clone` and serializable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TesseraError {
    /// A marker node names a component that was never registered.
    #[error("Unknown component '{name}'")]
    UnknownComponent {
        /// The unresolved registry key.
        name: String,
        /// The marker node, when the lookup came from a scan.
        node: Option<NodeId>,
    },

    /// A component name was registered twice.
    #[error("Component '{0}' is already registered")]
    DuplicateRegistration(String),

    /// A marker's configuration payload could not be parsed.
    #[error("Invalid configuration on node {node}: {message}")]
    ConfigParse {
        /// The marker node carrying the payload.
        node: NodeId,
        /// Parser message.
        message: String,
    },

    /// A lifecycle phase returned an error.
    #[error("Component {id} failed during {phase}: {message}")]
    Lifecycle {
        /// The failing component.
        id: ComponentId,
        /// The phase that failed.
        phase: Phase,
        /// The component's error message.
        message: String,
    },

    /// A lifecycle phase did not settle within the configured timeout.
    #[error("Component {id} did not settle {phase} within {timeout_ms} ms")]
    PhaseTimeout {
        /// The stalled component.
        id: ComponentId,
        /// The phase that stalled.
        phase: Phase,
        /// The configured limit.
        timeout_ms: u64,
    },

    /// The requested node does not exist in the document.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A structural document operation would corrupt the tree.
    #[error("Invalid tree operation: {0}")]
    InvalidTreeOperation(String),

    /// A component tried to reach a manager that has been dropped.
    #[error("Component manager is no longer available")]
    ManagerUnavailable,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Application configuration could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error returned by a component phase.
///
/// The scheduler wraps it into [`TesseraError::Lifecycle`] together with
/// the component id and phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ComponentError(pub String);

impl ComponentError {
    /// Create a component error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<TesseraError> for ComponentError {
    fn from(err: TesseraError) -> Self {
        Self(err.to_string())
    }
}

impl From<serde_json::Error> for ComponentError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<&str> for ComponentError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for ComponentError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        assert!(Phase::Ready < Phase::Init);
        assert!(Phase::Init < Phase::Enter);
        assert_eq!(Phase::ALL.to_vec(), {
            let mut sorted = Phase::ALL.to_vec();
            sorted.sort();
            sorted
        });
    }

    #[test]
    fn batch_id_saturates() {
        assert_eq!(BatchId(u64::MAX).next(), BatchId(u64::MAX));
        assert_eq!(BatchId(1).next(), BatchId(2));
    }

    #[test]
    fn error_serializes_with_kind_tag() {
        let err = TesseraError::Lifecycle {
            id: ComponentId::new("cmp-1"),
            phase: Phase::Init,
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["kind"], "lifecycle");
        assert_eq!(json["detail"]["phase"], "init");
        assert_eq!(json["detail"]["id"], "cmp-1");
    }

    #[test]
    fn component_error_wraps_core_error() {
        let err = ComponentError::from(TesseraError::NodeNotFound(NodeId(7)));
        assert_eq!(err.to_string(), "Node not found: #7");
    }
}
