//! Session
//!
//! The session combines credentials, the HTTP transport, and service
//! endpoint resolution into the single handle proxies make calls through.

mod http;

pub(crate) use http::HttpResponse;

use reqwest::Method;
use serde_json::Value;

use crate::auth::Credentials;
use crate::config::CloudConfig;
use crate::error::{Error, Result};
use crate::resource::registry::ServiceDef;
use http::HttpClient;

/// An authenticated connection to one cloud.
///
/// Cheap to clone; clones share the HTTP connection pool, the token cache,
/// and the service catalog.
#[derive(Clone)]
pub struct Session {
    http: HttpClient,
    credentials: Credentials,
    interface: String,
    region: Option<String>,
}

impl Session {
    /// Create a session from a cloud config. No network traffic happens
    /// here; authentication is lazy and occurs on the first request.
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let http = HttpClient::new()?;
        let credentials = Credentials::from_config(config, http.inner())?;

        Ok(Self {
            http,
            credentials,
            interface: config.effective_interface().to_string(),
            region: config.region_name.clone(),
        })
    }

    /// Force re-authentication (e.g. after a credential rotation).
    pub async fn refresh(&self) -> Result<()> {
        let _ = self.credentials.refresh_token().await?;
        Ok(())
    }

    /// Resolve the base URL for a service.
    pub(crate) async fn endpoint(&self, service: &ServiceDef) -> Result<String> {
        // Authenticating populates the catalog in the password flow
        let _ = self.credentials.get_token().await?;
        self.credentials
            .catalog()
            .await
            .endpoint_for(&service.catalog_type, &self.interface, self.region.as_deref())
            .ok_or_else(|| Error::EndpointNotFound {
                service: service.catalog_type.clone(),
                interface: self.interface.clone(),
            })
    }

    /// Issue one request against a service, resolving the endpoint and
    /// injecting the auth token and the service's microversion header.
    pub(crate) async fn request(
        &self,
        service: &ServiceDef,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let token = self.credentials.get_token().await?;
        let endpoint = self.endpoint(service).await?;
        let url = join_url(&endpoint, path);
        let microversion = service.microversion();

        self.http
            .send(method, &url, &token, microversion, query, body)
            .await
    }

    pub(crate) async fn get(
        &self,
        service: &ServiceDef,
        path: &str,
        query: &[(String, String)],
    ) -> Result<HttpResponse> {
        self.request(service, Method::GET, path, query, None).await
    }

    pub(crate) async fn post(
        &self,
        service: &ServiceDef,
        path: &str,
        body: &Value,
    ) -> Result<HttpResponse> {
        self.request(service, Method::POST, path, &[], Some(body))
            .await
    }

    pub(crate) async fn put(
        &self,
        service: &ServiceDef,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        self.request(service, Method::PUT, path, &[], body).await
    }

    pub(crate) async fn patch(
        &self,
        service: &ServiceDef,
        path: &str,
        body: &Value,
    ) -> Result<HttpResponse> {
        self.request(service, Method::PATCH, path, &[], Some(body))
            .await
    }

    pub(crate) async fn delete(&self, service: &ServiceDef, path: &str) -> Result<HttpResponse> {
        self.request(service, Method::DELETE, path, &[], None).await
    }

    pub(crate) async fn head(&self, service: &ServiceDef, path: &str) -> Result<HttpResponse> {
        self.request(service, Method::HEAD, path, &[], None).await
    }
}

/// Join a service endpoint and a resource path without doubling slashes.
fn join_url(endpoint: &str, path: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://nova/v2.1/", "/servers"),
            "http://nova/v2.1/servers"
        );
        assert_eq!(join_url("http://nova/v2.1", "servers"), "http://nova/v2.1/servers");
        assert_eq!(join_url("http://swift/v1/", "/"), "http://swift/v1");
    }
}
