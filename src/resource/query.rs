//! Query parameters
//!
//! Maps caller-side filter names to the REST query-string names a service
//! expects. `limit` and `marker` are pagination controls every listing
//! endpoint accepts, so they bypass the per-resource mapping.

use crate::error::{Error, Result};
use super::registry::ResourceDef;

/// Filters and pagination controls for list and find calls.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    filters: Vec<(String, String)>,
    pub(crate) limit: Option<u32>,
    pub(crate) marker: Option<String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named filter. The name is validated against the resource
    /// definition when the request is built.
    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((name.into(), value.into()));
        self
    }

    /// Cap the page size the service returns.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume listing after the given resource id.
    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Resolve to wire pairs: the definition's default query, then mapped
    /// filters, then pagination controls. Unknown filter names fail before
    /// any request is made.
    pub(crate) fn resolve(
        &self,
        def: &ResourceDef,
        resource_key: &str,
    ) -> Result<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = def
            .default_query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort();

        for (name, value) in &self.filters {
            let wire = def
                .query_params
                .get(name)
                .ok_or_else(|| Error::InvalidQuery {
                    resource: resource_key.to_string(),
                    param: name.clone(),
                })?;
            pairs.push((wire.clone(), value.clone()));
        }

        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(marker) = &self.marker {
            pairs.push(("marker".to_string(), marker.clone()));
        }

        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::registry::resource_def;

    #[test]
    fn test_filters_map_to_wire_names() {
        let def = resource_def("compute-servers").unwrap();
        let pairs = QueryParams::new()
            .filter("name", "web")
            .filter("status", "ACTIVE")
            .resolve(def, "compute-servers")
            .unwrap();
        assert!(pairs.contains(&("name".to_string(), "web".to_string())));
        assert!(pairs.contains(&("status".to_string(), "ACTIVE".to_string())));
    }

    #[test]
    fn test_unknown_filter_is_rejected() {
        let def = resource_def("compute-servers").unwrap();
        let err = QueryParams::new()
            .filter("shoe_size", "44")
            .resolve(def, "compute-servers")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { ref param, .. } if param == "shoe_size"));
    }

    #[test]
    fn test_pagination_controls_always_pass() {
        let def = resource_def("compute-servers").unwrap();
        let pairs = QueryParams::new()
            .limit(50)
            .marker("abc")
            .resolve(def, "compute-servers")
            .unwrap();
        assert!(pairs.contains(&("limit".to_string(), "50".to_string())));
        assert!(pairs.contains(&("marker".to_string(), "abc".to_string())));
    }

    #[test]
    fn test_default_query_is_always_sent() {
        let def = resource_def("object-store-containers").unwrap();
        let pairs = QueryParams::new()
            .resolve(def, "object-store-containers")
            .unwrap();
        assert!(pairs.contains(&("format".to_string(), "json".to_string())));
    }
}
