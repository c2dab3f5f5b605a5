//! # Manager Configuration
//!
//! Settings for the marker convention and the phase timeout policy.
//!
//! Every field has a default, so an empty table (or no table at all)
//! deserializes to [`ManagerConfig::default`].

use crate::primitives::{COMPONENT_ATTRIBUTE, CONFIG_ATTRIBUTE, ID_PREFIX, MAX_CONFIG_LENGTH};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Attribute naming the component bound to a marker node.
    pub component_attribute: String,

    /// Attribute holding the marker's JSON configuration object.
    pub config_attribute: String,

    /// Prefix of generated component ids.
    pub id_prefix: String,

    /// Per-phase timeout in milliseconds. `None` waits forever.
    pub phase_timeout_ms: Option<u64>,

    /// Maximum configuration payload length in bytes.
    pub max_config_length: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            component_attribute: COMPONENT_ATTRIBUTE.to_string(),
            config_attribute: CONFIG_ATTRIBUTE.to_string(),
            id_prefix: ID_PREFIX.to_string(),
            phase_timeout_ms: None,
            max_config_length: MAX_CONFIG_LENGTH,
        }
    }
}

impl ManagerConfig {
    /// Set the phase timeout.
    #[must_use]
    pub fn with_phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// The phase timeout as a `Duration`, if configured.
    #[must_use]
    pub fn phase_timeout(&self) -> Option<Duration> {
        self.phase_timeout_ms.map(Duration::from_millis)
    }
}
