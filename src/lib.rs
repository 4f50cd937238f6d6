//! ostack - a typed SDK core for OpenStack REST APIs
//!
//! The crate maps remote API objects through declarative resource
//! definitions instead of per-resource types: a JSON schema describes each
//! resource's URL layout, body envelopes, field aliases, and allowed verbs,
//! and one generic [`Proxy`] dispatches CRUD calls for all of them.
//!
//! # Layers
//!
//! - [`config`] - clouds.yaml / `OS_*` environment configuration
//! - `auth` - Keystone tokens, caching, and the service catalog
//! - [`session`] - the authenticated HTTP handle proxies call through
//! - [`resource`] - definitions, typed instances, query translation
//! - [`proxy`] - generic create/get/commit/delete/list/find/action dispatch
//!   and the polling helpers
//!
//! # Example
//!
//! ```no_run
//! use ostack::{Cloud, CloudConfig, QueryParams, Resource, WaitOpts};
//!
//! # async fn run() -> ostack::Result<()> {
//! let cloud = Cloud::from_env()?;
//! let compute = cloud.compute()?;
//!
//! let mut server = Resource::new("compute-servers")?;
//! server.set("name", "web-1");
//! server.set("flavorRef", "m1.small");
//! server.set("imageRef", "cirros");
//! compute.create(&mut server).await?;
//! compute
//!     .wait_for_status(&mut server, "ACTIVE", WaitOpts::default())
//!     .await?;
//!
//! for found in compute
//!     .list("compute-servers", &QueryParams::new().filter("status", "ACTIVE"))
//!     .await?
//! {
//!     println!("{:?}", found.name());
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
pub mod config;
pub mod error;
pub mod proxy;
pub mod resource;
pub mod session;

pub use config::CloudConfig;
pub use error::{Error, Result};
pub use proxy::{Page, Proxy, WaitOpts};
pub use resource::{QueryParams, Resource};
pub use session::Session;

/// Entry point: one authenticated cloud, handing out per-service proxies.
#[derive(Clone)]
pub struct Cloud {
    session: Session,
}

impl Cloud {
    /// Connect with an explicit config.
    pub fn new(config: &CloudConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            session: Session::new(config)?,
        })
    }

    /// Connect using `OS_*` environment variables (honoring `OS_CLOUD`).
    pub fn from_env() -> Result<Self> {
        Self::new(&CloudConfig::load(None)?)
    }

    /// Connect to a named cloud from clouds.yaml.
    pub fn from_cloud(name: &str) -> Result<Self> {
        Self::new(&CloudConfig::load(Some(name))?)
    }

    /// A proxy for an arbitrary service registry key.
    pub fn service(&self, key: &str) -> Result<Proxy> {
        Proxy::new(self.session.clone(), key)
    }

    pub fn compute(&self) -> Result<Proxy> {
        self.service("compute")
    }

    pub fn network(&self) -> Result<Proxy> {
        self.service("network")
    }

    pub fn block_storage(&self) -> Result<Proxy> {
        self.service("block-storage")
    }

    pub fn identity(&self) -> Result<Proxy> {
        self.service("identity")
    }

    pub fn object_store(&self) -> Result<Proxy> {
        self.service("object-store")
    }

    /// The underlying session, for callers composing their own requests.
    pub fn session(&self) -> &Session {
        &self.session
    }
}
