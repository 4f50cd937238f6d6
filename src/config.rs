//! Configuration Management
//!
//! Loads cloud connection settings from a `clouds.yaml` file or from the
//! standard `OS_*` environment variables. Precedence: an explicitly named
//! cloud wins over `OS_CLOUD`, which wins over plain environment variables.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default endpoint interface when none is configured.
pub const DEFAULT_INTERFACE: &str = "public";

/// Authentication settings for one cloud.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Keystone base URL, e.g. `https://keystone.example.org/v3`
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Pre-issued token; skips the password flow entirely.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub user_domain_name: Option<String>,
    #[serde(default)]
    pub project_domain_name: Option<String>,
}

/// Connection settings for one cloud.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CloudConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    /// Region to select endpoints from; any region matches when unset.
    #[serde(default)]
    pub region_name: Option<String>,
    /// Endpoint interface: `public`, `internal`, or `admin`.
    #[serde(default)]
    pub interface: Option<String>,
    /// Per-service endpoint overrides, keyed by catalog type
    /// (e.g. `compute`, `network`, `object-store`). Overrides win over
    /// the catalog and are the only endpoint source for token auth.
    #[serde(default)]
    pub endpoint_overrides: HashMap<String, String>,
}

/// Root structure of clouds.yaml.
#[derive(Debug, Clone, Deserialize)]
struct CloudsFile {
    #[serde(default)]
    clouds: HashMap<String, CloudConfig>,
}

impl CloudConfig {
    /// Get the clouds.yaml path (`~/.config/openstack/clouds.yaml`).
    fn clouds_yaml_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("openstack").join("clouds.yaml"))
    }

    /// Load a named cloud from clouds.yaml.
    pub fn from_clouds_yaml(cloud: &str) -> Result<Self> {
        let Some(path) = Self::clouds_yaml_path() else {
            return Err(Error::Config("no config directory on this system".into()));
        };
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_clouds_yaml_str(&content, cloud)
    }

    /// Parse a clouds.yaml document and select one cloud by name.
    pub fn from_clouds_yaml_str(content: &str, cloud: &str) -> Result<Self> {
        let file: CloudsFile = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid clouds.yaml: {}", e)))?;
        file.clouds
            .get(cloud)
            .cloned()
            .ok_or_else(|| Error::Config(format!("cloud '{}' not found in clouds.yaml", cloud)))
    }

    /// Build a config from `OS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// Build a config from a map of environment-style variables.
    pub(crate) fn from_env_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        let config = CloudConfig {
            auth: AuthConfig {
                auth_url: get("OS_AUTH_URL"),
                username: get("OS_USERNAME"),
                password: get("OS_PASSWORD"),
                token: get("OS_TOKEN"),
                project_name: get("OS_PROJECT_NAME"),
                project_id: get("OS_PROJECT_ID"),
                user_domain_name: get("OS_USER_DOMAIN_NAME"),
                project_domain_name: get("OS_PROJECT_DOMAIN_NAME"),
            },
            region_name: get("OS_REGION_NAME"),
            interface: get("OS_INTERFACE"),
            endpoint_overrides: HashMap::new(),
        };
        Ok(config)
    }

    /// Load by precedence: explicit name > `OS_CLOUD` > environment variables.
    pub fn load(cloud: Option<&str>) -> Result<Self> {
        if let Some(name) = cloud {
            return Self::from_clouds_yaml(name);
        }
        if let Ok(name) = std::env::var("OS_CLOUD") {
            if !name.is_empty() {
                return Self::from_clouds_yaml(&name);
            }
        }
        Self::from_env()
    }

    /// Effective endpoint interface.
    pub fn effective_interface(&self) -> &str {
        self.interface.as_deref().unwrap_or(DEFAULT_INTERFACE)
    }

    /// Add a per-service endpoint override (builder style).
    pub fn with_endpoint_override(mut self, catalog_type: &str, url: &str) -> Self {
        self.endpoint_overrides
            .insert(catalog_type.to_string(), url.to_string());
        self
    }

    /// Config for a pre-issued token plus explicit endpoints. No identity
    /// service round trip is made; all endpoints come from overrides.
    pub fn for_token(token: &str) -> Self {
        CloudConfig {
            auth: AuthConfig {
                token: Some(token.to_string()),
                ..AuthConfig::default()
            },
            ..CloudConfig::default()
        }
    }

    /// Check that the config carries enough to authenticate.
    pub fn validate(&self) -> Result<()> {
        if self.auth.token.is_some() {
            return Ok(());
        }
        if self.auth.auth_url.is_none() {
            return Err(Error::Config(
                "auth_url is required unless a token is configured".into(),
            ));
        }
        if self.auth.username.is_none() || self.auth.password.is_none() {
            return Err(Error::Config(
                "username and password are required for password authentication".into(),
            ));
        }
        Ok(())
    }
}
