//! Service proxy
//!
//! A [`Proxy`] is the per-service facade every CRUD call goes through. It
//! owns a [`Session`] handle plus the service definition, resolves resource
//! keys against the registry, and enforces the per-verb allow gates before
//! any network traffic happens.

mod waiter;

pub use waiter::WaitOpts;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::resource::registry::{resource_def, service_def, ResourceDef, ServiceDef, WriteVerb};
use crate::resource::{QueryParams, Resource};
use crate::session::Session;

/// One page of a listing plus the marker to continue from.
pub struct Page {
    pub items: Vec<Resource>,
    /// Pass to [`QueryParams::marker`] to fetch the next page; `None` means
    /// the listing is exhausted.
    pub next_marker: Option<String>,
}

/// Per-service CRUD dispatcher.
#[derive(Clone)]
pub struct Proxy {
    session: Session,
    service_key: String,
    service: &'static ServiceDef,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("service_key", &self.service_key)
            .finish_non_exhaustive()
    }
}

impl Proxy {
    pub(crate) fn new(session: Session, service_key: &str) -> Result<Self> {
        let service = service_def(service_key).ok_or_else(|| Error::UnknownKey {
            kind: "service",
            key: service_key.to_string(),
        })?;

        Ok(Self {
            session,
            service_key: service_key.to_string(),
            service,
        })
    }

    /// Registry key of the service this proxy fronts.
    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    /// Resolve a resource key and check it belongs to this service.
    fn resolve(&self, key: &str) -> Result<&'static ResourceDef> {
        let def = resource_def(key).ok_or_else(|| Error::UnknownKey {
            kind: "resource",
            key: key.to_string(),
        })?;
        self.check_service(key, def)?;
        Ok(def)
    }

    fn check_service(&self, key: &str, def: &ResourceDef) -> Result<()> {
        if def.service != self.service_key {
            return Err(Error::UnknownKey {
                kind: "resource",
                key: format!("{} (belongs to service '{}')", key, def.service),
            });
        }
        Ok(())
    }

    /// Create a remote object from the resource's attributes and ingest the
    /// server's view of it back into the instance.
    pub async fn create(&self, resource: &mut Resource) -> Result<()> {
        let def = resource.def();
        self.check_service(resource.key(), def)?;
        gate(resource.key(), def.allow.create, "create")?;

        let body = resource.create_body();
        let response = match def.create_method {
            WriteVerb::Post => {
                let path = resource.collection_path()?;
                self.session.post(self.service, &path, &body).await?
            }
            // PUT-create addresses the member URL (object-store style)
            WriteVerb::Put => {
                let path = resource.member_path()?;
                self.session
                    .put(self.service, &path, non_empty(&body))
                    .await?
            }
            WriteVerb::Patch => {
                let path = resource.collection_path()?;
                self.session.patch(self.service, &path, &body).await?
            }
        };

        resource.ingest_body(&response.body)?;
        resource.ingest_headers(&response.headers);
        Ok(())
    }

    /// Fetch one resource by id.
    pub async fn get(&self, key: &str, id: &str) -> Result<Resource> {
        self.get_with(key, id, &[]).await
    }

    /// Fetch one resource by id, supplying values for `{param}` placeholders
    /// in the base path template.
    pub async fn get_with(
        &self,
        key: &str,
        id: &str,
        uri_params: &[(&str, &str)],
    ) -> Result<Resource> {
        let def = self.resolve(key)?;
        gate(key, def.allow.fetch, "fetch")?;

        let mut resource = self.stub(key, id, uri_params)?;
        self.refresh(&mut resource).await?;
        Ok(resource)
    }

    /// Re-fetch a resource's current remote state into the instance.
    pub(crate) async fn refresh(&self, resource: &mut Resource) -> Result<()> {
        let path = resource.member_path()?;
        let response = self.session.get(self.service, &path, &[]).await?;
        resource.ingest_body(&response.body)?;
        resource.ingest_headers(&response.headers);
        Ok(())
    }

    /// HEAD one resource: only the declared header fields are populated.
    pub async fn head(&self, key: &str, id: &str) -> Result<Resource> {
        self.head_with(key, id, &[]).await
    }

    /// HEAD with values for `{param}` placeholders in the base path.
    pub async fn head_with(
        &self,
        key: &str,
        id: &str,
        uri_params: &[(&str, &str)],
    ) -> Result<Resource> {
        let def = self.resolve(key)?;
        gate(key, def.allow.head, "head")?;

        let mut resource = self.stub(key, id, uri_params)?;
        let path = resource.member_path()?;
        let response = self.session.head(self.service, &path).await?;
        resource.ingest_headers(&response.headers);
        Ok(resource)
    }

    /// Push dirty attributes to the server. A clean resource is a no-op.
    pub async fn commit(&self, resource: &mut Resource) -> Result<()> {
        let def = resource.def();
        self.check_service(resource.key(), def)?;
        gate(resource.key(), def.allow.commit, "commit")?;

        if !resource.is_dirty() {
            tracing::debug!("{}: nothing to commit", resource.key());
            return Ok(());
        }

        let body = resource.commit_body();
        let path = resource.member_path()?;
        let response = match def.commit_method {
            WriteVerb::Post => self.session.post(self.service, &path, &body).await?,
            WriteVerb::Put => {
                self.session.put(self.service, &path, Some(&body)).await?
            }
            WriteVerb::Patch => self.session.patch(self.service, &path, &body).await?,
        };

        resource.ingest_body(&response.body)?;
        resource.ingest_headers(&response.headers);
        Ok(())
    }

    /// Delete one resource by id.
    pub async fn delete(&self, key: &str, id: &str) -> Result<()> {
        self.delete_with(key, id, &[]).await
    }

    /// Delete with values for `{param}` placeholders in the base path.
    pub async fn delete_with(
        &self,
        key: &str,
        id: &str,
        uri_params: &[(&str, &str)],
    ) -> Result<()> {
        let def = self.resolve(key)?;
        gate(key, def.allow.delete, "delete")?;

        let resource = self.stub(key, id, uri_params)?;
        let path = resource.member_path()?;
        self.session.delete(self.service, &path).await?;
        Ok(())
    }

    /// Delete one resource by id, treating an already-gone resource as
    /// success.
    pub async fn delete_ignore_missing(&self, key: &str, id: &str) -> Result<()> {
        match self.delete(key, id).await {
            Err(err) if err.is_not_found() => {
                tracing::debug!("{} {} already gone", key, id);
                Ok(())
            }
            other => other,
        }
    }

    /// List all resources matching the query, following pagination to the
    /// end of the collection.
    pub async fn list(&self, key: &str, query: &QueryParams) -> Result<Vec<Resource>> {
        self.list_with(key, &[], query).await
    }

    /// List with values for `{param}` placeholders in the base path.
    pub async fn list_with(
        &self,
        key: &str,
        uri_params: &[(&str, &str)],
        query: &QueryParams,
    ) -> Result<Vec<Resource>> {
        let mut all = Vec::new();
        let mut query = query.clone();

        loop {
            let page = self.page(key, uri_params, &query).await?;
            all.extend(page.items);
            match page.next_marker {
                Some(marker) => query = query.marker(marker),
                None => break,
            }
        }

        Ok(all)
    }

    /// Fetch a single page for callers doing their own iteration.
    pub async fn list_page(&self, key: &str, query: &QueryParams) -> Result<Page> {
        self.page(key, &[], query).await
    }

    async fn page(
        &self,
        key: &str,
        uri_params: &[(&str, &str)],
        query: &QueryParams,
    ) -> Result<Page> {
        let def = self.resolve(key)?;
        gate(key, def.allow.list, "list")?;

        let mut probe = Resource::new(key)?;
        for (name, value) in uri_params {
            probe.set(*name, *value);
        }
        let path = probe.collection_path()?;
        let pairs = query.resolve(def, key)?;
        let response = self.session.get(self.service, &path, &pairs).await?;

        let items = match &def.resources_key {
            Some(envelope) => response
                .body
                .get(envelope)
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| {
                    Error::MalformedResponse(format!(
                        "missing `{}` envelope in {} listing",
                        envelope, key
                    ))
                })?,
            None => match &response.body {
                Value::Array(items) => items.clone(),
                Value::Null => Vec::new(),
                _ => {
                    return Err(Error::MalformedResponse(format!(
                        "{} listing is not a JSON array",
                        key
                    )))
                }
            },
        };

        let mut resources = Vec::with_capacity(items.len());
        for item in &items {
            let mut resource = Resource::new(key)?;
            for (name, value) in uri_params {
                resource.set(*name, *value);
            }
            resource.ingest_item(item)?;
            resources.push(resource);
        }

        let next_marker = next_marker(&response.body, def, query, &resources);
        Ok(Page {
            items: resources,
            next_marker,
        })
    }

    /// Look up one resource by id, falling back to an exact name match over
    /// a listing. Zero name matches is NotFound; several is TooManyMatches.
    pub async fn find(&self, key: &str, name_or_id: &str) -> Result<Resource> {
        let def = self.resolve(key)?;

        if def.allow.fetch {
            match self.get(key, name_or_id).await {
                Ok(resource) => return Ok(resource),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }

        // Services filter name as a substring, so re-check exactly
        let candidates = if def.query_params.contains_key("name") {
            let query = QueryParams::new().filter("name", name_or_id);
            self.list(key, &query).await?
        } else {
            self.list(key, &QueryParams::new()).await?
        };

        let mut matches: Vec<Resource> = candidates
            .into_iter()
            .filter(|r| {
                r.name().as_deref() == Some(name_or_id) || r.id().as_deref() == Some(name_or_id)
            })
            .collect();

        match matches.len() {
            0 => Err(Error::NotFound(format!("{} '{}'", key, name_or_id))),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::TooManyMatches {
                resource: key.to_string(),
                name: name_or_id.to_string(),
            }),
        }
    }

    /// Like [`Proxy::find`], but maps NotFound to `None`.
    pub async fn find_or_none(&self, key: &str, name_or_id: &str) -> Result<Option<Resource>> {
        match self.find(key, name_or_id).await {
            Ok(resource) => Ok(Some(resource)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Post a named one-off action to `<member>/action` with the declared
    /// wrapper key. The response body is returned raw.
    pub async fn action(&self, key: &str, id: &str, action: &str, args: Value) -> Result<Value> {
        let def = self.resolve(key)?;
        let action_def = def.action(action).ok_or_else(|| Error::UnknownKey {
            kind: "action",
            key: format!("{}/{}", key, action),
        })?;

        let resource = self.stub(key, id, &[])?;
        let path = format!("{}/action", resource.member_path()?);

        let mut body = Map::new();
        body.insert(action_def.wrapper_key().to_string(), args);
        let response = self
            .session
            .post(self.service, &path, &Value::Object(body))
            .await?;
        Ok(response.body)
    }

    /// An addressable but not-yet-fetched instance.
    fn stub(&self, key: &str, id: &str, uri_params: &[(&str, &str)]) -> Result<Resource> {
        let mut resource = Resource::new(key)?;
        for (name, value) in uri_params {
            resource.set(*name, *value);
        }
        let id_field = resource.def().id_field.clone();
        resource.set(&id_field, id);
        resource.clear_dirty();
        Ok(resource)
    }
}

fn gate(key: &str, allowed: bool, operation: &'static str) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(Error::MethodNotSupported {
            resource: key.to_string(),
            operation,
        })
    }
}

/// Treat an attribute-less body as absent (PUT-create of bare containers).
fn non_empty(body: &Value) -> Option<&Value> {
    match body {
        Value::Object(map) if map.is_empty() => None,
        _ => Some(body),
    }
}

/// Work out where the next page starts: a `<resources_key>_links` rel=next
/// href wins; otherwise a full page with an explicit limit continues from
/// the last element's id.
fn next_marker(
    body: &Value,
    def: &ResourceDef,
    query: &QueryParams,
    items: &[Resource],
) -> Option<String> {
    if let Some(envelope) = &def.resources_key {
        let links_key = format!("{}_links", envelope);
        if let Some(links) = body.get(&links_key).and_then(Value::as_array) {
            return marker_from_links(links);
        }
    }

    let limit = query.limit? as usize;
    if !items.is_empty() && items.len() == limit {
        items.last().and_then(Resource::id)
    } else {
        None
    }
}

fn marker_from_links(links: &[Value]) -> Option<String> {
    let href = links
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)?;
    let url = url::Url::parse(href).ok()?;
    url.query_pairs()
        .find(|(name, _)| name == "marker")
        .map(|(_, value)| value.into_owned())
}
