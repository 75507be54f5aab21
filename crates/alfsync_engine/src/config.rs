//! Configuration for the sync engine.

use alfsync_protocol::PageLimits;
use std::collections::HashMap;

/// Where the repository lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// URL scheme (`http` or `https`).
    pub protocol: String,
    /// Host name, optionally with a port.
    pub hostname: String,
    /// Path prefix of the web script endpoints.
    pub endpoint: String,
    /// Store protocol (e.g. `workspace`).
    pub store_protocol: String,
    /// Store id (e.g. `SpacesStore`).
    pub store_id: String,
    /// User name for Basic authentication, possibly percent-encoded.
    pub username: Option<String>,
    /// Password for Basic authentication, possibly percent-encoded.
    pub password: Option<String>,
}

impl RepositoryConfig {
    /// Creates a configuration for the given host with default paths.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Sets the URL scheme.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Sets the endpoint path prefix.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the store to synchronize.
    pub fn with_store(mut self, store_protocol: impl Into<String>, store_id: impl Into<String>) -> Self {
        self.store_protocol = store_protocol.into();
        self.store_id = store_id.into();
        self
    }

    /// Sets Basic authentication credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Returns the credentials when Basic authentication applies.
    ///
    /// Authentication is used only with a non-empty user name and a
    /// password (which may be empty).
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    fn base_url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.hostname, self.endpoint)
    }

    /// URL of the changes endpoint.
    pub fn changes_url(&self) -> String {
        format!(
            "{}/node/changes/{}/{}",
            self.base_url(),
            self.store_protocol,
            self.store_id
        )
    }

    /// URL of the node metadata endpoint (without the node uuid).
    pub fn metadata_url(&self) -> String {
        format!(
            "{}/node/details/{}/{}",
            self.base_url(),
            self.store_protocol,
            self.store_id
        )
    }

    /// URL of the authority resolution endpoint, ending in `/`.
    pub fn authorities_url(&self) -> String {
        format!("{}/api/node/auth/resolve/", self.base_url())
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            protocol: "http".into(),
            hostname: "localhost".into(),
            endpoint: "/alfresco/service".into(),
            store_protocol: "workspace".into(),
            store_id: "SpacesStore".into(),
            username: None,
            password: None,
        }
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    /// Repository location and credentials.
    pub repository: RepositoryConfig,
    /// Fetch and merge node metadata for every upserted document.
    pub enrich_metadata: bool,
    /// Page sizes requested from the changes endpoint.
    pub page_limits: PageLimits,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(repository: RepositoryConfig) -> Self {
        Self {
            repository,
            enrich_metadata: false,
            page_limits: PageLimits::unset(),
        }
    }

    /// Enables or disables metadata enrichment.
    pub fn with_metadata_enrichment(mut self, enabled: bool) -> Self {
        self.enrich_metadata = enabled;
        self
    }

    /// Sets the page limits.
    pub fn with_page_limits(mut self, limits: PageLimits) -> Self {
        self.page_limits = limits;
        self
    }

    /// Builds a configuration from connector parameters.
    ///
    /// Recognized keys: `protocol`, `hostname`, `endpoint`,
    /// `storeprotocol`, `storeid`, `username`, `password` and
    /// `enabledocumentprocessing`. Missing keys keep their defaults.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let defaults = RepositoryConfig::default();
        let get = |key: &str, default: String| params.get(key).cloned().unwrap_or(default);

        let repository = RepositoryConfig {
            protocol: get("protocol", defaults.protocol),
            hostname: get("hostname", defaults.hostname),
            endpoint: get("endpoint", defaults.endpoint),
            store_protocol: get("storeprotocol", defaults.store_protocol),
            store_id: get("storeid", defaults.store_id),
            username: params.get("username").cloned(),
            password: params.get("password").cloned(),
        };

        let enrich_metadata = params
            .get("enabledocumentprocessing")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Self::new(repository).with_metadata_enrichment(enrich_metadata)
    }
}
