//! Resource instance
//!
//! A [`Resource`] is a typed view over one remote object's JSON document.
//! Attributes are stored under their local names; the definition from the
//! registry supplies wire aliases, envelope keys, and path templates. Writes
//! are tracked in a dirty set so commits only send what changed.

use std::collections::BTreeSet;

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use super::registry::{resource_def, FieldLocation, ResourceDef};

/// One remote object, addressed by a registry key.
#[derive(Debug, Clone)]
pub struct Resource {
    key: String,
    def: &'static ResourceDef,
    /// Body and header attributes, keyed by local name.
    attrs: Map<String, Value>,
    /// Values for `{placeholder}` params in the base path template.
    uri: Map<String, Value>,
    dirty: BTreeSet<String>,
}

impl Resource {
    /// Create an empty resource for a registry key.
    pub fn new(key: &str) -> Result<Self> {
        let def = resource_def(key).ok_or_else(|| Error::UnknownKey {
            kind: "resource",
            key: key.to_string(),
        })?;

        Ok(Self {
            key: key.to_string(),
            def,
            attrs: Map::new(),
            uri: Map::new(),
            dirty: BTreeSet::new(),
        })
    }

    /// The registry key this resource was created with.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn def(&self) -> &'static ResourceDef {
        self.def
    }

    /// Set an attribute by local name and mark it dirty. URI params go to
    /// the path store; everything else, declared or not, goes to the body
    /// document. Setting a value identical to the current one still dirties.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(field) = self.def.field(name) {
            if field.location == FieldLocation::Uri {
                self.uri.insert(name.to_string(), value);
                return;
            }
        }
        self.attrs.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
    }

    /// Read an attribute by local name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(field) = self.def.field(name) {
            if field.location == FieldLocation::Uri {
                return self.uri.get(name);
            }
        }
        self.attrs.get(name)
    }

    /// Read an attribute as a string slice.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// The resource's identifier, per the definition's `id_field`.
    pub fn id(&self) -> Option<String> {
        self.attrs.get(&self.def.id_field).and_then(scalar_to_string)
    }

    /// The resource's display name, per the definition's `name_field`.
    pub fn name(&self) -> Option<String> {
        self.attrs.get(&self.def.name_field).and_then(scalar_to_string)
    }

    /// The value of the status field the polling helpers watch.
    pub fn status(&self) -> Option<String> {
        self.attrs
            .get(&self.def.status_field)
            .and_then(scalar_to_string)
    }

    /// Whether any attribute changed since the last server round-trip.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Request body for create: every body attribute, wire-aliased and
    /// wrapped in the single-resource envelope when one is declared.
    pub(crate) fn create_body(&self) -> Value {
        self.assemble_body(|_| true)
    }

    /// Request body for commit: dirty attributes only.
    pub(crate) fn commit_body(&self) -> Value {
        self.assemble_body(|name| self.dirty.contains(name))
    }

    fn assemble_body(&self, include: impl Fn(&str) -> bool) -> Value {
        let mut body = Map::new();
        for (name, value) in &self.attrs {
            if !include(name) {
                continue;
            }
            match self.def.field(name) {
                // Header and computed attributes are response-only
                Some(f) if f.location != FieldLocation::Body => continue,
                Some(f) => {
                    body.insert(f.remote_name().to_string(), value.clone());
                }
                None => {
                    body.insert(name.clone(), value.clone());
                }
            }
        }

        match &self.def.resource_key {
            Some(envelope) => {
                let mut wrapped = Map::new();
                wrapped.insert(envelope.clone(), Value::Object(body));
                Value::Object(wrapped)
            }
            None => Value::Object(body),
        }
    }

    /// Absorb a full response body: unwrap the declared envelope, then
    /// ingest the inner document. A `Null` body (204-style responses) is
    /// a no-op.
    pub(crate) fn ingest_body(&mut self, body: &Value) -> Result<()> {
        if body.is_null() {
            return Ok(());
        }

        let item = match &self.def.resource_key {
            Some(envelope) => body.get(envelope).ok_or_else(|| {
                Error::MalformedResponse(format!(
                    "missing `{}` envelope in {} response",
                    envelope, self.key
                ))
            })?,
            None => body,
        };

        self.ingest_item(item)
    }

    /// Absorb one un-enveloped resource document. Wire names are mapped
    /// back to local names, computed fields are derived from their paths,
    /// and the dirty set is cleared.
    pub(crate) fn ingest_item(&mut self, item: &Value) -> Result<()> {
        let object = item.as_object().ok_or_else(|| {
            Error::MalformedResponse(format!("{} document is not a JSON object", self.key))
        })?;

        for (wire_name, value) in object {
            let local = match self.def.field_by_remote(wire_name) {
                Some(field) => field.name.clone(),
                None => wire_name.clone(),
            };
            self.attrs.insert(local, value.clone());
        }

        for field in &self.def.fields {
            if field.location != FieldLocation::Computed {
                continue;
            }
            if let Some(path) = &field.path {
                if let Some(value) = value_at_path(item, path) {
                    self.attrs.insert(field.name.clone(), value.clone());
                }
            }
        }

        self.dirty.clear();
        Ok(())
    }

    /// Absorb response headers into the declared header-located fields.
    pub(crate) fn ingest_headers(&mut self, headers: &HeaderMap) {
        for field in &self.def.fields {
            if field.location != FieldLocation::Header {
                continue;
            }
            if let Some(value) = headers.get(field.remote_name()) {
                if let Ok(text) = value.to_str() {
                    self.attrs
                        .insert(field.name.clone(), Value::String(text.to_string()));
                }
            }
        }
        self.dirty.clear();
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// The collection URL path, with `{param}` placeholders filled from
    /// the URI attribute store.
    pub(crate) fn collection_path(&self) -> Result<String> {
        let mut path = String::with_capacity(self.def.base_path.len());
        let mut rest = self.def.base_path.as_str();

        while let Some(start) = rest.find('{') {
            let Some(end) = rest[start..].find('}') else {
                path.push_str(rest);
                break;
            };
            path.push_str(&rest[..start]);
            let param = &rest[start + 1..start + end];
            let value = self
                .uri
                .get(param)
                .and_then(scalar_to_string)
                .ok_or_else(|| Error::MissingUriParam {
                    resource: self.key.clone(),
                    param: param.to_string(),
                })?;
            path.push_str(&urlencoding::encode(&value));
            rest = &rest[start + end + 1..];
        }
        path.push_str(rest);

        Ok(path)
    }

    /// The member URL path: the collection path plus the encoded id.
    pub(crate) fn member_path(&self) -> Result<String> {
        let id = self.id().ok_or_else(|| Error::NoIdentity {
            resource: self.key.clone(),
        })?;
        Ok(format!(
            "{}/{}",
            self.collection_path()?,
            urlencoding::encode(&id)
        ))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Walk a dot-notation path through a JSON document. Numeric segments
/// index into arrays.
fn value_at_path<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;
    for part in path.split('.') {
        current = if let Ok(idx) = part.parse::<usize>() {
            current.get(idx)?
        } else {
            current.get(part)?
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Resource::new("compute-toasters").unwrap_err();
        assert!(matches!(err, Error::UnknownKey { kind: "resource", .. }));
    }

    #[test]
    fn test_set_marks_dirty() {
        let mut server = Resource::new("compute-servers").unwrap();
        assert!(!server.is_dirty());
        server.set("name", "web-1");
        assert!(server.is_dirty());
        assert_eq!(server.get_str("name"), Some("web-1"));
    }

    #[test]
    fn test_create_body_wraps_and_aliases() {
        let mut server = Resource::new("compute-servers").unwrap();
        server.set("name", "web-1");
        server.set("availability_zone", "nova");

        let body = server.create_body();
        assert_eq!(body["server"]["name"], json!("web-1"));
        assert_eq!(
            body["server"]["OS-EXT-AZ:availability_zone"],
            json!("nova")
        );
        assert!(body["server"].get("availability_zone").is_none());
    }

    #[test]
    fn test_commit_body_sends_dirty_only() {
        let mut server = Resource::new("compute-servers").unwrap();
        server
            .ingest_body(&json!({"server": {"id": "abc", "name": "web-1", "status": "ACTIVE"}}))
            .unwrap();
        assert!(!server.is_dirty());

        server.set("name", "web-2");
        let body = server.commit_body();
        assert_eq!(body, json!({"server": {"name": "web-2"}}));
    }

    #[test]
    fn test_ingest_reverse_aliases_and_clears_dirty() {
        let mut server = Resource::new("compute-servers").unwrap();
        server.set("name", "stale");

        server
            .ingest_body(&json!({
                "server": {
                    "id": "abc",
                    "name": "web-1",
                    "OS-EXT-AZ:availability_zone": "nova",
                    "flavor": {"id": "m1.small"}
                }
            }))
            .unwrap();

        assert!(!server.is_dirty());
        assert_eq!(server.get_str("availability_zone"), Some("nova"));
        assert_eq!(server.get_str("flavor_id"), Some("m1.small"));
        assert_eq!(server.id().as_deref(), Some("abc"));
    }

    #[test]
    fn test_missing_envelope_is_malformed() {
        let mut server = Resource::new("compute-servers").unwrap();
        let err = server.ingest_body(&json!({"id": "abc"})).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_unenveloped_resource_ingests_bare_body() {
        let mut container = Resource::new("object-store-containers").unwrap();
        container.ingest_body(&json!({"name": "backups"})).unwrap();
        assert_eq!(container.name().as_deref(), Some("backups"));
    }

    #[test]
    fn test_header_fields_come_from_headers() {
        let mut container = Resource::new("object-store-containers").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("X-Container-Object-Count", "42".parse().unwrap());
        container.ingest_headers(&headers);
        assert_eq!(container.get_str("object_count"), Some("42"));
    }

    #[test]
    fn test_collection_path_substitutes_uri_params() {
        let mut object = Resource::new("object-store-objects").unwrap();
        object.set("container", "my backups");
        assert_eq!(object.collection_path().unwrap(), "/my%20backups");
        assert!(!object.is_dirty(), "uri params are addressing, not state");
    }

    #[test]
    fn test_missing_uri_param_is_reported() {
        let object = Resource::new("object-store-objects").unwrap();
        let err = object.collection_path().unwrap_err();
        assert!(matches!(err, Error::MissingUriParam { ref param, .. } if param == "container"));
    }

    #[test]
    fn test_member_path_needs_identity() {
        let server = Resource::new("compute-servers").unwrap();
        assert!(matches!(
            server.member_path().unwrap_err(),
            Error::NoIdentity { .. }
        ));

        let mut named = Resource::new("compute-servers").unwrap();
        named.set("id", "abc/def");
        assert_eq!(named.member_path().unwrap(), "/servers/abc%2Fdef");
    }
}
