//! Identity and token management
//!
//! Handles Keystone v3 password authentication with in-memory token caching,
//! plus a static-token mode for standalone services and tests. The service
//! catalog returned by the identity service is captured at authentication
//! time and merged with configured endpoint overrides.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::config::CloudConfig;
use crate::error::{Error, Result};

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if the identity service reports no expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// One entry in the service catalog.
#[derive(Debug, Clone)]
pub struct CatalogEndpoint {
    pub service_type: String,
    pub interface: String,
    pub region: Option<String>,
    pub url: String,
}

/// Service catalog: endpoints from the token response plus configured
/// overrides. Overrides always win.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    endpoints: Vec<CatalogEndpoint>,
    overrides: HashMap<String, String>,
}

impl ServiceCatalog {
    /// Build a catalog that only knows configured overrides.
    pub fn from_overrides(overrides: HashMap<String, String>) -> Self {
        ServiceCatalog {
            endpoints: Vec::new(),
            overrides,
        }
    }

    /// Parse the `token.catalog` section of a Keystone token response.
    fn parse_token_body(&mut self, body: &Value) {
        let Some(services) = body
            .pointer("/token/catalog")
            .and_then(Value::as_array)
        else {
            return;
        };

        for service in services {
            let Some(service_type) = service.get("type").and_then(Value::as_str) else {
                continue;
            };
            let Some(endpoints) = service.get("endpoints").and_then(Value::as_array) else {
                continue;
            };
            for endpoint in endpoints {
                let (Some(interface), Some(url)) = (
                    endpoint.get("interface").and_then(Value::as_str),
                    endpoint.get("url").and_then(Value::as_str),
                ) else {
                    continue;
                };
                self.endpoints.push(CatalogEndpoint {
                    service_type: service_type.to_string(),
                    interface: interface.to_string(),
                    region: endpoint
                        .get("region")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    url: url.to_string(),
                });
            }
        }
    }

    /// Resolve the endpoint for a catalog type, preferring overrides.
    pub fn endpoint_for(
        &self,
        catalog_type: &str,
        interface: &str,
        region: Option<&str>,
    ) -> Option<String> {
        if let Some(url) = self.overrides.get(catalog_type) {
            return Some(url.clone());
        }
        self.endpoints
            .iter()
            .find(|e| {
                e.service_type == catalog_type
                    && e.interface == interface
                    && match (region, e.region.as_deref()) {
                        (Some(want), Some(have)) => want == have,
                        _ => true,
                    }
            })
            .map(|e| e.url.clone())
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Clone)]
enum AuthMode {
    /// Keystone v3 password flow.
    Password { token_url: String, payload: Value },
    /// Pre-issued token; never refreshed.
    Token { token: String },
}

/// Token provider with caching, shared across sessions and clones.
#[derive(Clone)]
pub struct Credentials {
    http: reqwest::Client,
    mode: AuthMode,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
    catalog: Arc<RwLock<ServiceCatalog>>,
}

impl Credentials {
    /// Build credentials from a cloud config and a shared HTTP client.
    pub fn from_config(config: &CloudConfig, http: reqwest::Client) -> Result<Self> {
        config.validate()?;
        let catalog = ServiceCatalog::from_overrides(config.endpoint_overrides.clone());

        let mode = if let Some(token) = &config.auth.token {
            AuthMode::Token {
                token: token.clone(),
            }
        } else {
            // validate() guarantees these are present for the password flow
            let auth = &config.auth;
            let auth_url = auth.auth_url.as_deref().ok_or_else(|| {
                Error::Config("auth_url is required for password authentication".into())
            })?;
            let username = auth.username.as_deref().ok_or_else(|| {
                Error::Config("username is required for password authentication".into())
            })?;
            let password = auth.password.as_deref().ok_or_else(|| {
                Error::Config("password is required for password authentication".into())
            })?;
            AuthMode::Password {
                token_url: token_url(auth_url),
                payload: password_payload(
                    username,
                    password,
                    auth.user_domain_name.as_deref(),
                    auth.project_name.as_deref(),
                    auth.project_id.as_deref(),
                    auth.project_domain_name.as_deref(),
                ),
            }
        };

        Ok(Credentials {
            http,
            mode,
            token_cache: Arc::new(RwLock::new(None)),
            catalog: Arc::new(RwLock::new(catalog)),
        })
    }

    /// Get a token for API calls, authenticating if needed.
    pub async fn get_token(&self) -> Result<String> {
        if let AuthMode::Token { token } = &self.mode {
            return Ok(token.clone());
        }

        // Check cache first - but only return if token is still valid
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, re-authenticating");
            }
        }

        self.authenticate().await
    }

    /// Force re-authentication.
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }
        self.get_token().await
    }

    /// Current service catalog snapshot.
    pub async fn catalog(&self) -> ServiceCatalog {
        self.catalog.read().await.clone()
    }

    /// Run the password flow against the identity service.
    async fn authenticate(&self) -> Result<String> {
        let AuthMode::Password { token_url, payload } = &self.mode else {
            return Err(Error::Auth("static token cannot be refreshed".into()));
        };

        tracing::debug!("POST {}", token_url);
        let response = self
            .http
            .post(token_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("identity service unreachable: {}", e)))?;

        let status = response.status();
        let token = response
            .headers()
            .get("x-subject-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let err = Error::from_response(status, &body);
            return Err(Error::Auth(err.to_string()));
        }
        let Some(token) = token else {
            return Err(Error::Auth(
                "identity service returned no X-Subject-Token header".into(),
            ));
        };

        let expires_at = Instant::now() + token_ttl(&body).saturating_sub(TOKEN_EXPIRY_BUFFER);
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }
        {
            let mut catalog = self.catalog.write().await;
            catalog.parse_token_body(&body);
        }

        tracing::debug!("Authenticated against {}", token_url);
        Ok(token)
    }
}

/// Token TTL from the `token.expires_at` timestamp, with a fallback.
fn token_ttl(body: &Value) -> Duration {
    body.pointer("/token/expires_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .and_then(|expires| {
            let remaining = expires.with_timezone(&Utc) - Utc::now();
            remaining.to_std().ok()
        })
        .unwrap_or(DEFAULT_TOKEN_TTL)
}

/// The `POST /auth/tokens` URL for an auth_url, appending `/v3` when absent.
fn token_url(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/v3") {
        format!("{}/auth/tokens", base)
    } else {
        format!("{}/v3/auth/tokens", base)
    }
}

/// Scoped Keystone v3 password payload.
fn password_payload(
    username: &str,
    password: &str,
    user_domain: Option<&str>,
    project_name: Option<&str>,
    project_id: Option<&str>,
    project_domain: Option<&str>,
) -> Value {
    let mut user = json!({
        "name": username,
        "password": password,
    });
    if let Some(domain) = user_domain {
        user["domain"] = json!({ "name": domain });
    }

    let mut payload = json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": { "user": user },
            }
        }
    });

    if let Some(id) = project_id {
        payload["auth"]["scope"] = json!({ "project": { "id": id } });
    } else if let Some(name) = project_name {
        let mut project = json!({ "name": name });
        if let Some(domain) = project_domain {
            project["domain"] = json!({ "name": domain });
        }
        payload["auth"]["scope"] = json!({ "project": project });
    }

    payload
}
