//! # Application Configuration
//!
//! TOML file with a `[scheduler]` table and a `[[components]]` list:
//!
//! ```toml
//! [scheduler]
//! phase_timeout_ms = 2000
//!
//! [[components]]
//! name = "faq"
//! kind = "accordion"
//!
//! [[components]]
//! name = "footer"
//! kind = "include"
//! [components.config]
//! html = "<p>(c) Tessera</p>"
//! ```
//!
//! Without a `[[components]]` list every built-in kind is registered under
//! its own name.

use crate::components::ComponentKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tessera_core::{ConfigDirective, ManagerConfig, Registry, TesseraError};

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Scheduler settings.
    pub scheduler: ManagerConfig,

    /// Registry entries.
    pub components: Vec<ComponentEntry>,
}

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentEntry {
    /// Name used in marker attributes.
    pub name: String,

    /// Built-in implementation.
    pub kind: ComponentKind,

    /// Static directives, handed to every instance in key order.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl ComponentEntry {
    /// The entry's static directives.
    #[must_use]
    pub fn directives(&self) -> Vec<ConfigDirective> {
        self.config
            .iter()
            .map(|(name, value)| ConfigDirective::new(name.clone(), value.clone()))
            .collect()
    }
}

impl AppConfig {
    /// Load from a file, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, TesseraError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let metadata = std::fs::metadata(path).map_err(|e| {
            TesseraError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(TesseraError::ConfigError(format!(
                "'{}' is {} bytes, limit is {}",
                path.display(),
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            TesseraError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        let config = Self::parse(&text)?;
        tracing::debug!(path = %path.display(), components = config.components.len(), "loaded configuration");
        Ok(config)
    }

    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self, TesseraError> {
        toml::from_str(text).map_err(|e| TesseraError::ConfigError(e.to_string()))
    }

    /// The entries to register: the configured list, or one per built-in kind.
    #[must_use]
    pub fn entries(&self) -> Vec<ComponentEntry> {
        if !self.components.is_empty() {
            return self.components.clone();
        }
        ComponentKind::ALL
            .iter()
            .map(|kind| ComponentEntry {
                name: kind.name().to_string(),
                kind: *kind,
                config: BTreeMap::new(),
            })
            .collect()
    }

    /// Build the component registry.
    pub fn registry(&self) -> Result<Registry, TesseraError> {
        let mut registry = Registry::new();
        for entry in self.entries() {
            entry
                .kind
                .register(&mut registry, &entry.name, entry.directives())?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::parse("").expect("parse");
        assert_eq!(config, AppConfig::default());

        let registry = config.registry().expect("registry");
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["accordion", "dropdown", "include"]
        );
    }

    #[test]
    fn parses_scheduler_and_components() {
        let config = AppConfig::parse(
            r#"
            [scheduler]
            component_attribute = "data-widget"
            phase_timeout_ms = 250

            [[components]]
            name = "faq"
            kind = "accordion"

            [[components]]
            name = "footer"
            kind = "include"
            [components.config]
            html = "<p>hi</p>"
            retries = 2
            "#,
        )
        .expect("parse");

        assert_eq!(config.scheduler.component_attribute, "data-widget");
        assert_eq!(config.scheduler.phase_timeout_ms, Some(250));
        assert_eq!(config.scheduler.config_attribute, "data-config");

        let footer = &config.components[1];
        assert_eq!(footer.kind, ComponentKind::Include);
        let directives = footer.directives();
        assert_eq!(directives[0].name, "html");
        assert_eq!(directives[1], ConfigDirective::new("retries", serde_json::json!(2)));

        let registry = config.registry().expect("registry");
        assert!(registry.contains("faq"));
        assert!(!registry.contains("accordion"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let config = AppConfig::parse(
            r#"
            [[components]]
            name = "x"
            kind = "accordion"

            [[components]]
            name = "x"
            kind = "dropdown"
            "#,
        )
        .expect("parse");

        assert_eq!(
            config.registry().err(),
            Some(TesseraError::DuplicateRegistration("x".to_string()))
        );
    }

    #[test]
    fn unknown_fields_and_kinds_fail() {
        assert!(matches!(
            AppConfig::parse("[scheduler]\nbogus = 1"),
            Err(TesseraError::ConfigError(_))
        ));
        assert!(matches!(
            AppConfig::parse("[[components]]\nname = \"a\"\nkind = \"carousel\""),
            Err(TesseraError::ConfigError(_))
        ));
    }
}
