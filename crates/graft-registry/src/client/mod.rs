//! HTTP registry backend with connection pooling
//!
//! Talks to the npm registry API directly. Retries and fallbacks are left to
//! the metadata resolver, so every method here makes exactly one request.

use std::time::Duration;

use async_trait::async_trait;
use graft_config::RegistrySettings;
use graft_core::error::GraftError;
use graft_core::types::{Version, VersionReq};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::api::{PackumentResponse, VersionMetadata};
use crate::source::RegistrySource;
use crate::RegistryResult;

const ABBREVIATED_ACCEPT: &str = "application/vnd.npm.install-v1+json";

/// Authentication configuration for registry access
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Bearer token for authentication
    pub token: Option<String>,
    /// Basic auth username
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
}

impl AuthConfig {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// `Authorization` header value, if any credentials are set
    fn header_value(&self) -> Option<String> {
        if let Some(token) = &self.token {
            return Some(format!("Bearer {}", token));
        }
        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return None;
        };
        use base64::{engine::general_purpose, Engine as _};
        Some(format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{}:{}", username, password))
        ))
    }
}

/// Registry backend speaking the npm HTTP API
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Base registry URL, without trailing slash
    base_url: String,
    timeout: Duration,
}

impl HttpRegistry {
    /// Client for the public registry
    pub fn new() -> RegistryResult<Self> {
        Self::with_config(
            graft_config::settings::DEFAULT_REGISTRY_URL,
            None,
            Duration::from_secs(30),
        )
    }

    /// Client configured from the registry settings
    pub fn from_settings(settings: &RegistrySettings) -> RegistryResult<Self> {
        let auth = settings.auth_token.clone().map(AuthConfig::bearer);
        Self::with_config(settings.registry_url_or_default(), auth, settings.timeout())
    }

    /// Create registry client with custom configuration
    pub fn with_config(base_url: &str, auth: Option<AuthConfig>, timeout: Duration) -> RegistryResult<Self> {
        let parsed = Url::parse(base_url).map_err(|e| GraftError::ConfigValidation {
            field: "registry.registry_url".to_string(),
            reason: format!("'{}' is not a valid URL: {}", base_url, e),
        })?;

        let mut builder = ClientBuilder::new()
            // Connection pooling configuration
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .gzip(true)
            .user_agent(concat!("graft/", env!("CARGO_PKG_VERSION")));

        if let Some(value) = auth.as_ref().and_then(AuthConfig::header_value) {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::AUTHORIZATION,
                value.parse().map_err(|e| GraftError::Network {
                    message: format!("Invalid registry credentials: {}", e),
                    source: Some(Box::new(e)),
                })?,
            );
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| GraftError::network(format!("Failed to create HTTP client: {}", e), e))?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the abbreviated document listing every version of a package
    pub async fn fetch_packument(&self, name: &str) -> RegistryResult<PackumentResponse> {
        let url = format!("{}/{}", self.base_url, encode_package_name(name));
        self.get_json(name, &url, Some(ABBREVIATED_ACCEPT)).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        name: &str,
        url: &str,
        accept: Option<&str>,
    ) -> RegistryResult<T> {
        debug!(url, "registry request");
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header("Accept", accept);
        }

        let response = request.send().await.map_err(|e| self.transport_error(url, e))?;

        match response.status() {
            StatusCode::OK => response.json::<T>().await.map_err(|e| {
                if e.is_timeout() {
                    self.transport_error(url, e)
                } else {
                    GraftError::ManifestParse {
                        package: name.to_string(),
                        message: e.to_string(),
                    }
                }
            }),
            StatusCode::NOT_FOUND => Err(GraftError::PackageNotFound {
                name: name.to_string(),
            }),
            status if status.is_server_error() => Err(GraftError::Network {
                message: format!("Registry returned status {}: {}", status, name),
                source: None,
            }),
            status => Err(GraftError::RegistryFetch {
                package: name.to_string(),
                message: format!("registry returned status {}", status),
            }),
        }
    }

    fn transport_error(&self, url: &str, error: reqwest::Error) -> GraftError {
        if error.is_timeout() {
            GraftError::timeout(format!("GET {}", url), self.timeout)
        } else {
            GraftError::network(format!("Failed to fetch {}: {}", url, error), error)
        }
    }
}

#[async_trait]
impl RegistrySource for HttpRegistry {
    async fn resolve_version(&self, name: &str, range: &str) -> RegistryResult<String> {
        let packument = self.fetch_packument(name).await?;

        if let Some(version) = packument.dist_tags.get(range.trim()) {
            return Ok(version.clone());
        }

        let req = VersionReq::parse(range).map_err(|source| GraftError::VersionParse {
            input: range.to_string(),
            source,
        })?;

        // Like npm, prefer the `latest` tag whenever it satisfies the range
        if let Some(latest) = packument
            .dist_tags
            .get("latest")
            .and_then(|latest| Version::parse(latest).ok())
        {
            if req.matches(&latest) && packument.versions.contains_key(&latest.to_string()) {
                return Ok(latest.to_string());
            }
        }

        let versions: Vec<Version> = packument
            .versions
            .keys()
            .filter_map(|version| Version::parse(version).ok())
            .collect();
        req.max_satisfying(&versions)
            .map(|version| version.to_string())
            .ok_or_else(|| GraftError::RegistryFetch {
                package: name.to_string(),
                message: format!("No matching version found for {}@{}", name, range),
            })
    }

    async fn fetch_manifest(&self, name: &str, version: &str) -> RegistryResult<VersionMetadata> {
        let url = format!("{}/{}/{}", self.base_url, encode_package_name(name), version);
        self.get_json(name, &url, None).await
    }

    fn backend_name(&self) -> &str {
        "http"
    }
}

/// Encode package name for URL (handle scoped packages)
pub fn encode_package_name(name: &str) -> String {
    if name.starts_with('@') {
        // Scoped package: @org/pkg -> @org%2fpkg
        name.replace('/', "%2f")
    } else {
        name.to_string()
    }
}
