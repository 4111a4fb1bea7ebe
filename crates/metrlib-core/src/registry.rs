//! Driver registry: maps instrument model strings to driver and connection
//! metadata.
//!
//! A [`DriverRegistry`] is an ordinary value. Applications construct one at
//! startup, either from the built-in table ([`DriverRegistry::builtin`]) or
//! from a TOML file ([`DriverRegistry::load`]), and pass it to whatever
//! opens connections. Nothing is registered globally.
//!
//! Entries may name a `template` entry to inherit from. Resolution is a
//! shallow overlay: every field the entry sets wins, every field it leaves
//! out comes from the template, recursively. Template chains that loop back
//! on themselves are rejected as [`Error::UnknownTemplate`].
//!
//! # File format
//!
//! ```toml
//! [HS9001B]
//! module = "metrlib_holzworth"
//! class = "Hs9000"
//! interfaces = ["VISA", "SOCKET", "SERIAL"]
//! socket_port = 9760
//! discovery = { udp_port = 30303, protocol = "MICROCHIP" }
//!
//! [HS9002B]
//! template = "HS9001B"
//! ```
//!
//! # Example
//!
//! ```
//! use metrlib_core::registry::DriverRegistry;
//! use metrlib_core::ConnectionType;
//!
//! let registry = DriverRegistry::builtin();
//! let info = registry.get_driver_info("HS9002B").unwrap();
//! assert_eq!(info.class, "Hs9000");
//! assert_eq!(info.socket_port, Some(9760));
//! assert!(registry.supports_interface("HS9002B", ConnectionType::Serial));
//! assert!(!registry.supports_interface("NOPE", ConnectionType::Serial));
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ConnectionType;

/// Module name for models that are listed but have no driver in this
/// workspace.
pub const NO_DRIVER_MODULE: &str = "none";

/// Default UDP port for Microchip TCP/IP stack discovery.
pub const MICROCHIP_DISCOVERY_PORT: u16 = 30303;

/// LAN discovery protocol spoken by an instrument's network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiscoveryProtocol {
    /// Microchip TCP/IP stack announce ("Discovery: Who is out there!").
    Microchip,
}

/// How to find an instrument on the LAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    /// UDP port the discovery request is broadcast to.
    pub udp_port: u16,
    /// Discovery protocol.
    pub protocol: DiscoveryProtocol,
}

/// One registry entry as written in the table or file.
///
/// Every field is optional so that templated entries can override only
/// what differs from their template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverEntry {
    /// Driver crate or module implementing the instrument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Driver type within `module`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Interfaces the instrument can be reached through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Vec<ConnectionType>>,
    /// Raw-socket TCP port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_port: Option<u16>,
    /// LAN discovery metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<Discovery>,
    /// Name of the entry this one inherits from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl DriverEntry {
    /// A complete, non-templated entry.
    pub fn new(module: &str, class: &str, interfaces: &[ConnectionType]) -> Self {
        DriverEntry {
            module: Some(module.to_string()),
            class: Some(class.to_string()),
            interfaces: Some(interfaces.to_vec()),
            ..Default::default()
        }
    }

    /// An entry that inherits everything from `template`.
    pub fn from_template(template: &str) -> Self {
        DriverEntry {
            template: Some(template.to_string()),
            ..Default::default()
        }
    }

    /// Set the raw-socket port.
    pub fn socket_port(mut self, port: u16) -> Self {
        self.socket_port = Some(port);
        self
    }

    /// Set LAN discovery metadata.
    pub fn discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Shallow overlay: fields set on `self` win over `base`.
    ///
    /// The result carries no template reference.
    fn overlay(&self, base: DriverEntry) -> DriverEntry {
        DriverEntry {
            module: self.module.clone().or(base.module),
            class: self.class.clone().or(base.class),
            interfaces: self.interfaces.clone().or(base.interfaces),
            socket_port: self.socket_port.or(base.socket_port),
            discovery: self.discovery.or(base.discovery),
            template: None,
        }
    }
}

/// Fully resolved driver information for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverInfo {
    /// The model string that was looked up.
    pub model: String,
    /// Driver crate or module.
    pub module: String,
    /// Driver type within `module`.
    pub class: String,
    /// Supported interfaces (empty if the entry lists none).
    pub interfaces: Vec<ConnectionType>,
    /// Raw-socket TCP port, if any.
    pub socket_port: Option<u16>,
    /// LAN discovery metadata, if any.
    pub discovery: Option<Discovery>,
}

impl DriverInfo {
    /// Whether the entry names a driver module rather than
    /// [`NO_DRIVER_MODULE`].
    pub fn has_driver(&self) -> bool {
        self.module != NO_DRIVER_MODULE
    }

    fn from_resolved(model: &str, entry: DriverEntry) -> Result<Self> {
        let module = entry.module.ok_or_else(|| {
            Error::InvalidParameter(format!("registry entry '{model}' has no module"))
        })?;
        let class = entry.class.ok_or_else(|| {
            Error::InvalidParameter(format!("registry entry '{model}' has no class"))
        })?;
        Ok(DriverInfo {
            model: model.to_string(),
            module,
            class,
            interfaces: entry.interfaces.unwrap_or_default(),
            socket_port: entry.socket_port,
            discovery: entry.discovery,
        })
    }
}

/// Model-to-driver lookup table with template inheritance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverRegistry {
    entries: BTreeMap<String, DriverEntry>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of every model this workspace knows about.
    pub fn builtin() -> Self {
        use ConnectionType::{Serial, Socket, Visa};

        let mut registry = Self::new();

        // HP legacy equipment, GPIB through VISA only. Listed, not driven.
        for (model, class) in [
            ("HP8563A", "Hp8563a"),
            ("HP8564E", "Hp8564e"),
            ("HP8657B", "Hp8657b"),
            ("HP437B", "Hp437b"),
        ] {
            registry.insert(model, DriverEntry::new(NO_DRIVER_MODULE, class, &[Visa]));
        }

        // Holzworth HS9000 family: one template, per-channel-count aliases.
        registry.insert(
            "HS9001B",
            DriverEntry::new("metrlib_holzworth", "Hs9000", &[Visa, Socket, Serial])
                .socket_port(9760)
                .discovery(Discovery {
                    udp_port: MICROCHIP_DISCOVERY_PORT,
                    protocol: DiscoveryProtocol::Microchip,
                }),
        );
        for model in [
            "HS9002B", "HS9003B", "HS9004B", "HS9005B", "HS9006B", "HS9007B", "HS9008B",
        ] {
            registry.insert(model, DriverEntry::from_template("HS9001B"));
        }

        registry.insert(
            "DSOX1204G",
            DriverEntry::new("metrlib_keysight", "Dsox1204g", &[Visa, Socket]).socket_port(5025),
        );

        registry
    }

    /// Parse a registry from TOML text (one table per model).
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let entries: BTreeMap<String, DriverEntry> =
            toml::from_str(text).map_err(|e| Error::Parse(format!("driver registry: {e}")))?;
        Ok(DriverRegistry { entries })
    }

    /// Read and parse a registry file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let registry = Self::from_toml_str(&text)
            .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?;
        tracing::debug!(
            path = %path.display(),
            models = registry.entries.len(),
            "Loaded driver registry"
        );
        Ok(registry)
    }

    /// Serialize the registry back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(&self.entries)
            .map_err(|e| Error::Parse(format!("driver registry: {e}")))
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, model: &str, entry: DriverEntry) {
        self.entries.insert(model.to_string(), entry);
    }

    /// Add every entry of `other`, replacing entries with the same model.
    pub fn extend(&mut self, other: DriverRegistry) {
        self.entries.extend(other.entries);
    }

    /// The raw (unresolved) entry for a model.
    pub fn entry(&self, model: &str) -> Option<&DriverEntry> {
        self.entries.get(model)
    }

    /// All registered model strings, sorted.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the complete driver information for `model`.
    ///
    /// Template references are followed recursively and overlaid with the
    /// referencing entry's own fields. Resolution never modifies the
    /// registry.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownModel`] if `model` is not registered.
    /// - [`Error::UnknownTemplate`] if a template in the chain is missing or
    ///   the chain loops.
    /// - [`Error::InvalidParameter`] if the resolved entry lacks a module
    ///   or class.
    pub fn get_driver_info(&self, model: &str) -> Result<DriverInfo> {
        let entry = self
            .entries
            .get(model)
            .ok_or_else(|| Error::UnknownModel(model.to_string()))?;
        let mut chain = vec![model.to_string()];
        let resolved = self.resolve(entry, &mut chain)?;
        DriverInfo::from_resolved(model, resolved)
    }

    /// Whether `model` can be reached through `interface`.
    ///
    /// Unknown or unresolvable models report `false`.
    pub fn supports_interface(&self, model: &str, interface: ConnectionType) -> bool {
        self.get_driver_info(model)
            .map(|info| info.interfaces.contains(&interface))
            .unwrap_or(false)
    }

    /// The raw-socket port for `model`, if it has one and resolves.
    pub fn get_socket_port(&self, model: &str) -> Option<u16> {
        self.get_driver_info(model)
            .ok()
            .and_then(|info| info.socket_port)
    }

    /// Resolve every entry, returning the first failure.
    pub fn validate(&self) -> Result<()> {
        for model in self.entries.keys() {
            self.get_driver_info(model)?;
        }
        Ok(())
    }

    fn resolve(&self, entry: &DriverEntry, chain: &mut Vec<String>) -> Result<DriverEntry> {
        let Some(template) = entry.template.as_deref() else {
            return Ok(entry.overlay(DriverEntry::default()));
        };

        if chain.iter().any(|seen| seen == template) {
            chain.push(template.to_string());
            return Err(Error::UnknownTemplate(format!(
                "template cycle {}",
                chain.join(" -> ")
            )));
        }

        let base_entry = self
            .entries
            .get(template)
            .ok_or_else(|| Error::UnknownTemplate(template.to_string()))?;
        chain.push(template.to_string());
        let base = self.resolve(base_entry, chain)?;
        Ok(entry.overlay(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionType::{Serial, Socket, Visa};

    #[test]
    fn builtin_plain_entry() {
        let registry = DriverRegistry::builtin();
        let info = registry.get_driver_info("HP8563A").unwrap();
        assert_eq!(info.model, "HP8563A");
        assert_eq!(info.class, "Hp8563a");
        assert_eq!(info.module, NO_DRIVER_MODULE);
        assert!(!info.has_driver());
        assert_eq!(info.interfaces, vec![Visa]);
        assert_eq!(info.socket_port, None);
        assert_eq!(info.discovery, None);
    }

    #[test]
    fn templated_entry_inherits_template_fields() {
        let registry = DriverRegistry::builtin();
        let base = registry.get_driver_info("HS9001B").unwrap();
        let derived = registry.get_driver_info("HS9002B").unwrap();

        assert_eq!(derived.model, "HS9002B");
        assert_eq!(derived.module, base.module);
        assert_eq!(derived.class, base.class);
        assert_eq!(derived.interfaces, vec![Visa, Socket, Serial]);
        assert_eq!(derived.socket_port, Some(9760));
        assert_eq!(
            derived.discovery,
            Some(Discovery {
                udp_port: 30303,
                protocol: DiscoveryProtocol::Microchip
            })
        );
    }

    #[test]
    fn every_templated_builtin_matches_its_template() {
        let registry = DriverRegistry::builtin();
        for model in registry.models() {
            let entry = registry.entry(model).unwrap();
            if let Some(template) = &entry.template {
                let mut expected = registry.get_driver_info(template).unwrap();
                expected.model = model.to_string();
                assert_eq!(registry.get_driver_info(model).unwrap(), expected);
            }
        }
    }

    #[test]
    fn override_wins_over_template() {
        let mut registry = DriverRegistry::builtin();
        registry.insert(
            "HS9001B-LAN",
            DriverEntry {
                interfaces: Some(vec![Socket]),
                socket_port: Some(8000),
                template: Some("HS9001B".into()),
                ..Default::default()
            },
        );
        let info = registry.get_driver_info("HS9001B-LAN").unwrap();
        assert_eq!(info.interfaces, vec![Socket]);
        assert_eq!(info.socket_port, Some(8000));
        assert_eq!(info.class, "Hs9000");
        assert!(info.discovery.is_some());
    }

    #[test]
    fn nested_templates_resolve_recursively() {
        let mut registry = DriverRegistry::new();
        registry.insert(
            "BASE",
            DriverEntry::new("drv", "Base", &[Visa]).socket_port(1000),
        );
        registry.insert(
            "MID",
            DriverEntry {
                class: Some("Mid".into()),
                template: Some("BASE".into()),
                ..Default::default()
            },
        );
        registry.insert("LEAF", DriverEntry::from_template("MID"));

        let info = registry.get_driver_info("LEAF").unwrap();
        assert_eq!(info.module, "drv");
        assert_eq!(info.class, "Mid");
        assert_eq!(info.socket_port, Some(1000));
    }

    #[test]
    fn unknown_model() {
        let registry = DriverRegistry::builtin();
        assert!(matches!(
            registry.get_driver_info("XYZ123"),
            Err(Error::UnknownModel(m)) if m == "XYZ123"
        ));
    }

    #[test]
    fn unknown_template() {
        let mut registry = DriverRegistry::new();
        registry.insert("ORPHAN", DriverEntry::from_template("MISSING"));
        assert!(matches!(
            registry.get_driver_info("ORPHAN"),
            Err(Error::UnknownTemplate(t)) if t == "MISSING"
        ));
    }

    #[test]
    fn self_referencing_template_is_rejected() {
        let mut registry = DriverRegistry::new();
        registry.insert("LOOP", DriverEntry::from_template("LOOP"));
        assert!(matches!(
            registry.get_driver_info("LOOP"),
            Err(Error::UnknownTemplate(_))
        ));
    }

    #[test]
    fn indirect_template_cycle_is_rejected() {
        let mut registry = DriverRegistry::new();
        registry.insert("A", DriverEntry::from_template("B"));
        registry.insert("B", DriverEntry::from_template("C"));
        registry.insert("C", DriverEntry::from_template("A"));
        match registry.get_driver_info("A") {
            Err(Error::UnknownTemplate(msg)) => assert!(msg.contains("A -> B -> C -> A"), "{msg}"),
            other => panic!("expected UnknownTemplate, got {other:?}"),
        }
    }

    #[test]
    fn missing_class_after_resolution() {
        let mut registry = DriverRegistry::new();
        registry.insert(
            "HALF",
            DriverEntry {
                module: Some("drv".into()),
                ..Default::default()
            },
        );
        assert!(matches!(
            registry.get_driver_info("HALF"),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn supports_interface_and_socket_port() {
        let registry = DriverRegistry::builtin();
        assert!(registry.supports_interface("HS9003B", Socket));
        assert!(registry.supports_interface("DSOX1204G", Visa));
        assert!(!registry.supports_interface("DSOX1204G", Serial));
        assert!(!registry.supports_interface("HP437B", Socket));
        assert!(!registry.supports_interface("NOT-A-MODEL", Visa));

        assert_eq!(registry.get_socket_port("HS9004B"), Some(9760));
        assert_eq!(registry.get_socket_port("DSOX1204G"), Some(5025));
        assert_eq!(registry.get_socket_port("HP8657B"), None);
        assert_eq!(registry.get_socket_port("NOT-A-MODEL"), None);
    }

    #[test]
    fn resolution_does_not_mutate_entries() {
        let registry = DriverRegistry::builtin();
        let before = registry.clone();
        let first = registry.get_driver_info("HS9005B").unwrap();
        let second = registry.get_driver_info("HS9005B").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry, before);
        assert_eq!(
            registry.entry("HS9005B"),
            Some(&DriverEntry::from_template("HS9001B"))
        );
    }

    #[test]
    fn models_are_sorted() {
        let registry = DriverRegistry::builtin();
        let models: Vec<&str> = registry.models().collect();
        let mut sorted = models.clone();
        sorted.sort();
        assert_eq!(models, sorted);
        assert!(models.contains(&"HS9008B"));
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn load_from_toml() {
        let text = r#"
            [HS9001B]
            module = "metrlib_holzworth"
            class = "Hs9000"
            interfaces = ["VISA", "SOCKET", "SERIAL"]
            socket_port = 9760
            discovery = { udp_port = 30303, protocol = "MICROCHIP" }

            [HS9002B]
            template = "HS9001B"
        "#;
        let registry = DriverRegistry::from_toml_str(text).unwrap();
        assert_eq!(registry.len(), 2);
        let info = registry.get_driver_info("HS9002B").unwrap();
        assert_eq!(info.interfaces, vec![Visa, Socket, Serial]);
        assert_eq!(info.socket_port, Some(9760));
    }

    #[test]
    fn toml_rejects_unknown_fields_and_interfaces() {
        assert!(matches!(
            DriverRegistry::from_toml_str("[X]\nmodule = \"m\"\ncolour = \"red\"\n"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            DriverRegistry::from_toml_str("[X]\ninterfaces = [\"GPIB\"]\n"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn builtin_survives_toml_round_trip() {
        let registry = DriverRegistry::builtin();
        let text = registry.to_toml_string().unwrap();
        let reloaded = DriverRegistry::from_toml_str(&text).unwrap();
        assert_eq!(reloaded, registry);
    }

    #[test]
    fn load_from_file_and_extend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drivers.toml");
        std::fs::write(
            &path,
            "[HS9002B]\ntemplate = \"HS9001B\"\nsocket_port = 9999\n",
        )
        .unwrap();

        let mut registry = DriverRegistry::builtin();
        registry.extend(DriverRegistry::load(&path).unwrap());
        assert_eq!(registry.get_socket_port("HS9002B"), Some(9999));
        assert_eq!(registry.get_socket_port("HS9003B"), Some(9760));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = DriverRegistry::load("/nonexistent/metrlib/drivers.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
