//! # Marker Primitives
//!
//! Default marker convention and hard limits for the scheduler.
//!
//! The attribute names are defaults only; [`ManagerConfig`](crate::ManagerConfig)
//! may override them. The limits are fixed.

/// Attribute that flags an element as a component marker.
///
/// Its value is the registry key of the component to bind.
pub const COMPONENT_ATTRIBUTE: &str = "data-component";

/// Attribute holding the marker's serialized configuration object (JSON).
pub const CONFIG_ATTRIBUTE: &str = "data-config";

/// Prefix of generated component ids (`cmp-0`, `cmp-1`, ...).
pub const ID_PREFIX: &str = "cmp-";

/// Maximum length of a configuration payload in bytes.
///
/// Longer payloads are rejected as `ConfigParse` without being parsed.
pub const MAX_CONFIG_LENGTH: usize = 65536;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_attributes_are_data_attributes() {
        assert!(COMPONENT_ATTRIBUTE.starts_with("data-"));
        assert!(CONFIG_ATTRIBUTE.starts_with("data-"));
        assert_ne!(COMPONENT_ATTRIBUTE, CONFIG_ATTRIBUTE);
    }
}
