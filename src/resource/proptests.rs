//! Property-based tests using proptest
//!
//! These tests verify the mapping invariants with randomized inputs: commit
//! bodies carry exactly the dirtied attributes, wire aliases round-trip
//! through ingestion, and URL path segments never leak unencoded
//! metacharacters.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::{json, Value};

use super::instance::Resource;
use super::query::QueryParams;
use super::registry::resource_def;

/// Generate an attribute name that no schema declares.
fn arb_attr_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{2,15}".prop_filter("must be undeclared", |name| {
        resource_def("network-subnets")
            .map(|def| def.field(name).is_none())
            .unwrap_or(false)
    })
}

/// Generate a scalar attribute value.
fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[ -~]{0,20}".prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ]
}

/// Generate a set of attributes keyed by local name.
fn arb_attrs() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(arb_attr_name(), arb_scalar(), 0..8)
}

/// Generate a printable-ASCII identifier, including path metacharacters.
fn arb_raw_id() -> impl Strategy<Value = String> {
    "[ -~]{1,40}"
}

proptest! {
    /// A commit body carries exactly the attributes set since the last
    /// ingestion, no more and no fewer.
    #[test]
    fn commit_body_is_exactly_the_dirty_set(
        initial in arb_attrs(),
        changes in arb_attrs(),
    ) {
        let mut subnet = Resource::new("network-subnets").unwrap();
        subnet
            .ingest_body(&json!({ "subnet": Value::Object(initial.clone().into_iter().collect()) }))
            .unwrap();
        prop_assert!(!subnet.is_dirty());

        for (name, value) in &changes {
            subnet.set(name, value.clone());
        }

        let body = subnet.commit_body();
        let sent = body["subnet"].as_object().unwrap();
        let sent_keys: std::collections::BTreeSet<&String> = sent.keys().collect();
        let change_keys: std::collections::BTreeSet<&String> = changes.keys().collect();
        prop_assert_eq!(sent_keys, change_keys);
        for (name, value) in &changes {
            prop_assert_eq!(&sent[name], value);
        }
    }

    /// A create body carries the union of ingested and set attributes.
    #[test]
    fn create_body_is_the_union(
        initial in arb_attrs(),
        changes in arb_attrs(),
    ) {
        let mut subnet = Resource::new("network-subnets").unwrap();
        subnet
            .ingest_body(&json!({ "subnet": Value::Object(initial.clone().into_iter().collect()) }))
            .unwrap();
        for (name, value) in &changes {
            subnet.set(name, value.clone());
        }

        let body = subnet.create_body();
        let sent = body["subnet"].as_object().unwrap();

        let mut expected = initial;
        expected.extend(changes);
        prop_assert_eq!(sent.len(), expected.len());
        for (name, value) in &expected {
            prop_assert_eq!(&sent[name], value);
        }
    }

    /// Aliased fields round-trip: a wire name on the way in is readable
    /// under its local name, and a local write serializes back under the
    /// wire name only.
    #[test]
    fn wire_alias_round_trips(zone in "[ -~]{1,20}") {
        let mut server = Resource::new("compute-servers").unwrap();
        server
            .ingest_body(&json!({
                "server": { "id": "abc", "OS-EXT-AZ:availability_zone": zone.clone() }
            }))
            .unwrap();
        prop_assert_eq!(server.get_str("availability_zone"), Some(zone.as_str()));

        server.set("availability_zone", zone.clone());
        let body = server.create_body();
        prop_assert_eq!(&body["server"]["OS-EXT-AZ:availability_zone"], &json!(zone));
        prop_assert!(body["server"].get("availability_zone").is_none());
    }

    /// Member paths never leak URL metacharacters from the id, and the
    /// encoded segment decodes back to the original id.
    #[test]
    fn member_path_encodes_the_id(id in arb_raw_id()) {
        let mut server = Resource::new("compute-servers").unwrap();
        server.set("id", id.clone());

        let path = server.member_path().unwrap();
        let segment = path.strip_prefix("/servers/").unwrap();
        for forbidden in ['/', '?', '#', ' '] {
            prop_assert!(!segment.contains(forbidden), "raw {:?} in {}", forbidden, path);
        }
        prop_assert_eq!(urlencoding::decode(segment).unwrap().into_owned(), id);
    }

    /// URI template params are encoded the same way as appended ids.
    #[test]
    fn uri_params_encode_into_the_path(container in arb_raw_id()) {
        let mut object = Resource::new("object-store-objects").unwrap();
        object.set("container", container.clone());

        let path = object.collection_path().unwrap();
        let segment = path.strip_prefix('/').unwrap();
        prop_assert!(!segment.contains('/'), "raw slash in {}", path);
        prop_assert!(!segment.contains('?'), "raw query in {}", path);
        prop_assert_eq!(urlencoding::decode(segment).unwrap().into_owned(), container);
    }

    /// Unknown filter names are always rejected before any request.
    #[test]
    fn unknown_filters_are_rejected(name in "[a-z][a-z0-9_]{2,15}", value in "[ -~]{0,10}") {
        let def = resource_def("compute-servers").unwrap();
        prop_assume!(!def.query_params.contains_key(&name));

        let err = QueryParams::new()
            .filter(name.as_str(), value)
            .resolve(def, "compute-servers")
            .unwrap_err();
        prop_assert!(matches!(err, crate::error::Error::InvalidQuery { ref param, .. } if param == &name), "unexpected error: {:?}", err);
    }

    /// Pagination controls resolve for every definition.
    #[test]
    fn limit_and_marker_always_resolve(limit in 1u32..10_000, marker in "[a-z0-9-]{1,36}") {
        for key in crate::resource::registry::resource_keys() {
            let def = resource_def(key).unwrap();
            let pairs = QueryParams::new()
                .limit(limit)
                .marker(marker.as_str())
                .resolve(def, key)
                .unwrap();
            prop_assert!(pairs.contains(&("limit".to_string(), limit.to_string())));
            prop_assert!(pairs.contains(&("marker".to_string(), marker.clone())));
        }
    }
}
