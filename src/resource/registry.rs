//! Resource Registry - Load resource definitions from JSON
//!
//! This module loads all service and resource definitions from embedded JSON
//! files and provides lookup functions for the rest of the crate. The
//! registry is immutable after first access: `base_path`, `resource_key`,
//! and `resources_key` are fixed per definition.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded schema JSON files (compiled into the binary)
const SCHEMA_FILES: &[&str] = &[
    include_str!("../resources/compute.json"),
    include_str!("../resources/network.json"),
    include_str!("../resources/block_storage.json"),
    include_str!("../resources/identity.json"),
    include_str!("../resources/object_store.json"),
];

/// Where a declared field lives on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldLocation {
    /// JSON body attribute (the default).
    #[default]
    Body,
    /// HTTP response header.
    Header,
    /// `{placeholder}` in the base path template.
    Uri,
    /// Derived locally from a dot-path into the body; never sent.
    Computed,
}

/// Field definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    /// Local attribute name.
    pub name: String,
    /// Wire name when it differs (e.g. `OS-EXT-AZ:availability_zone`).
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default)]
    pub location: FieldLocation,
    /// Dot-path into the body for computed fields.
    #[serde(default)]
    pub path: Option<String>,
}

impl FieldDef {
    /// The name this field carries on the wire.
    pub fn remote_name(&self) -> &str {
        self.remote.as_deref().unwrap_or(&self.name)
    }
}

/// Per-verb gates: a disallowed verb fails without touching the network.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct AllowedOps {
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub fetch: bool,
    #[serde(default)]
    pub commit: bool,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub head: bool,
}

/// Write verb used for create/commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteVerb {
    Post,
    Put,
    Patch,
}

fn default_create_method() -> WriteVerb {
    WriteVerb::Post
}

fn default_commit_method() -> WriteVerb {
    WriteVerb::Put
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_name_field() -> String {
    "name".to_string()
}

fn default_status_field() -> String {
    "status".to_string()
}

/// Action definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDef {
    /// Local action name.
    pub name: String,
    /// Wire-level wrapper key when it differs (e.g. `os-start`).
    #[serde(default)]
    pub wrapper: Option<String>,
}

impl ActionDef {
    /// The JSON envelope key posted to the action URL.
    pub fn wrapper_key(&self) -> &str {
        self.wrapper.as_deref().unwrap_or(&self.name)
    }
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    /// Registry key of the owning service.
    pub service: String,
    /// URL path template under the service endpoint, with `{param}`
    /// placeholders filled from a resource's URI attributes.
    pub base_path: String,
    /// JSON envelope key for a single resource; unwrapped when absent.
    #[serde(default)]
    pub resource_key: Option<String>,
    /// JSON envelope key for a list; a bare array when absent.
    #[serde(default)]
    pub resources_key: Option<String>,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_name_field")]
    pub name_field: String,
    #[serde(default)]
    pub allow: AllowedOps,
    #[serde(default = "default_create_method")]
    pub create_method: WriteVerb,
    #[serde(default = "default_commit_method")]
    pub commit_method: WriteVerb,
    /// Filter-name to query-string-name mapping for list/find.
    #[serde(default)]
    pub query_params: HashMap<String, String>,
    /// Query pairs sent on every list call (e.g. Swift's `format=json`).
    #[serde(default)]
    pub default_query: HashMap<String, String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
    /// Field the polling helpers watch.
    #[serde(default = "default_status_field")]
    pub status_field: String,
    /// Terminal statuses that fail a wait early.
    #[serde(default)]
    pub failure_statuses: Vec<String>,
}

impl ResourceDef {
    /// Look up a declared field by local name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a declared field by wire name.
    pub fn field_by_remote(&self, remote: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.remote_name() == remote)
    }

    /// Look up an action by local name.
    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// Service definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDef {
    /// Service type as it appears in the identity catalog.
    pub catalog_type: String,
    /// Microversion header name, when the service supports one.
    #[serde(default)]
    pub microversion_header: Option<String>,
    /// Microversion sent on every request to this service.
    #[serde(default)]
    pub default_microversion: Option<String>,
}

impl ServiceDef {
    /// The microversion header pair to send, if any.
    pub fn microversion(&self) -> Option<(&str, &str)> {
        match (&self.microversion_header, &self.default_microversion) {
            (Some(header), Some(version)) => Some((header.as_str(), version.as_str())),
            _ => None,
        }
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub services: HashMap<String, ServiceDef>,
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<SchemaConfig> = OnceLock::new();

/// Get the schema registry (loads from embedded JSON on first access)
pub fn registry() -> &'static SchemaConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = SchemaConfig {
            services: HashMap::new(),
            resources: HashMap::new(),
        };

        for content in SCHEMA_FILES {
            let partial: SchemaConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded schema JSON: {}", e));
            final_config.services.extend(partial.services);
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by key
pub fn resource_def(key: &str) -> Option<&'static ResourceDef> {
    registry().resources.get(key)
}

/// Get a service definition by key
pub fn service_def(key: &str) -> Option<&'static ServiceDef> {
    registry().services.get(key)
}

/// Get all resource keys
pub fn resource_keys() -> Vec<&'static str> {
    registry().resources.keys().map(|s| s.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = registry();
        assert!(!registry.resources.is_empty(), "Registry should have resources");
        assert!(!registry.services.is_empty(), "Registry should have services");
    }

    #[test]
    fn test_server_resource_exists() {
        let def = resource_def("compute-servers").expect("servers definition");
        assert_eq!(def.service, "compute");
        assert_eq!(def.base_path, "/servers");
        assert_eq!(def.resource_key.as_deref(), Some("server"));
        assert_eq!(def.resources_key.as_deref(), Some("servers"));
        assert!(def.allow.create && def.allow.commit && def.allow.list);
        assert_eq!(def.commit_method, WriteVerb::Put);
    }

    #[test]
    fn test_keypair_uses_name_as_id() {
        let def = resource_def("compute-keypairs").expect("keypairs definition");
        assert_eq!(def.id_field, "name");
        assert!(!def.allow.commit);
    }

    #[test]
    fn test_project_commits_with_patch() {
        let def = resource_def("identity-projects").expect("projects definition");
        assert_eq!(def.commit_method, WriteVerb::Patch);
    }

    #[test]
    fn test_container_has_no_envelopes() {
        let def = resource_def("object-store-containers").expect("containers definition");
        assert!(def.resource_key.is_none());
        assert!(def.resources_key.is_none());
        assert_eq!(def.create_method, WriteVerb::Put);
        assert!(def.allow.head);
        let field = def.field("object_count").expect("object_count field");
        assert_eq!(field.location, FieldLocation::Header);
    }

    #[test]
    fn test_compute_microversion_header() {
        let service = service_def("compute").expect("compute service");
        let (header, version) = service.microversion().expect("microversion pair");
        assert_eq!(header, "X-OpenStack-Nova-API-Version");
        assert!(!version.is_empty());
    }

    #[test]
    fn test_server_action_wrappers() {
        let def = resource_def("compute-servers").unwrap();
        assert_eq!(def.action("start").unwrap().wrapper_key(), "os-start");
        assert_eq!(def.action("reboot").unwrap().wrapper_key(), "reboot");
        assert!(def.action("self-destruct").is_none());
    }
}
