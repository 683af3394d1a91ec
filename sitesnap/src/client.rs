//! # HTTP client for the snapshot service
//!
//! [`ApiClient`] implements [`SnapshotService`] over the service's JSON:API
//! endpoints with `reqwest`; [`HttpFetcher`] implements [`ResourceFetcher`]
//! with plain unauthenticated GETs.
//!
//! ## Configuration
//! [`ApiClient::new_from_env`] reads:
//! - `SITESNAP_TOKEN` (required), sent as `Authorization: Token token=<...>`
//! - `SITESNAP_API_URL` (required), e.g. `https://api.example.com/api/v1`
//! - `SITESNAP_TIMEOUT_SECS` (optional, default 30)
//!
//! ## Errors
//! Transport failures become [`ServiceError::Timeout`] or
//! [`ServiceError::Connection`]; non-success statuses go through
//! [`ServiceError::from_status`]; undecodable bodies become
//! [`ServiceError::InvalidResponse`]. Whether a failure ends the run is
//! decided by the core session.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use sitesnap_core::contract::{
    Build, ResourceFetcher, Snapshot, SnapshotRequestOptions, SnapshotService,
};
use sitesnap_core::error::ServiceError;
use sitesnap_core::resource::{Resource, ResourceRole};

use crate::user_agent::user_agent;

pub const TOKEN_ENV: &str = "SITESNAP_TOKEN";
pub const API_URL_ENV: &str = "SITESNAP_API_URL";
pub const TIMEOUT_ENV: &str = "SITESNAP_TIMEOUT_SECS";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Unreserved URL characters; everything else in a path segment is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escapes one URL path segment.
pub fn segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_SEGMENT).to_string()
}

/// `owner/name` with each part escaped; the separating `/` is kept.
pub fn repo_path(repo: &str) -> String {
    repo.split('/').map(segment).collect::<Vec<_>>().join("/")
}

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub token: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let token = env::var(TOKEN_ENV).map_err(|e| {
            error!(error = ?e, "{TOKEN_ENV} missing in environment");
            anyhow!("{TOKEN_ENV} must be set")
        })?;
        let api_url = env::var(API_URL_ENV).map_err(|e| {
            error!(error = ?e, "{API_URL_ENV} missing in environment");
            anyhow!("{API_URL_ENV} must be set")
        })?;
        let timeout_secs = match env::var(TIMEOUT_ENV) {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{TIMEOUT_ENV} must be a whole number of seconds, got {raw:?}"))?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };
        Ok(Self {
            api_url,
            token,
            timeout: Duration::from_secs(timeout_secs),
            user_agent: user_agent(&[]),
        })
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token token={}", config.token))
                .context("token contains characters not allowed in a header")?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("invalid user agent")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context("failed to build HTTP client")?;

        info!(
            api_url = %config.api_url,
            timeout_secs = config.timeout.as_secs(),
            user_agent = %config.user_agent,
            "Initialized ApiClient"
        );
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn new_from_env() -> anyhow::Result<Self> {
        Self::new(&ClientConfig::from_env()?)
    }

    async fn post<B, R>(&self, endpoint: &str, body: Option<&B>) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = self.http.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            error!(endpoint, status = status.as_u16(), body = %body, "API request failed");
            return Err(ServiceError::from_status(status.as_u16(), body));
        }
        debug!(endpoint, status = status.as_u16(), "API request succeeded");

        if bytes.is_empty() {
            // Finalize endpoints may answer with an empty body.
            return serde_json::from_slice(b"null").map_err(decode_error);
        }
        serde_json::from_slice(&bytes).map_err(decode_error)
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout(e.to_string())
    } else if e.is_decode() {
        ServiceError::InvalidResponse(e.to_string())
    } else {
        ServiceError::Connection(e.to_string())
    }
}

fn decode_error(e: serde_json::Error) -> ServiceError {
    ServiceError::InvalidResponse(e.to_string())
}

// JSON:API request and response documents.

#[derive(Debug, Serialize, Deserialize)]
pub struct Document<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceIdentity<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: &'a str,
    pub attributes: ResourceIdentityAttributes<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceIdentityAttributes<'a> {
    pub resource_url: &'a str,
    pub is_root: bool,
    pub mimetype: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct ResourceList<'a> {
    pub resources: Document<Vec<ResourceIdentity<'a>>>,
}

#[derive(Debug, Serialize)]
pub struct NewBuild<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub relationships: ResourceList<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NewSnapshotAttributes<'a> {
    pub name: Option<&'a str>,
    pub enable_javascript: bool,
    #[serde(skip_serializing_if = "<[u32]>::is_empty")]
    pub widths: &'a [u32],
}

#[derive(Debug, Serialize)]
pub struct NewSnapshot<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: NewSnapshotAttributes<'a>,
    pub relationships: ResourceList<'a>,
}

#[derive(Debug, Serialize)]
pub struct NewResourceContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub attributes: ResourceContentAttributes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceContentAttributes {
    pub base64_content: String,
}

#[derive(Debug, Deserialize)]
pub struct Created {
    pub id: String,
    #[serde(default)]
    pub attributes: CreatedAttributes,
    #[serde(default)]
    pub relationships: CreatedRelationships,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreatedAttributes {
    pub web_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreatedRelationships {
    pub missing_resources: Option<Document<Vec<Identifier>>>,
}

#[derive(Debug, Deserialize)]
pub struct Identifier {
    pub id: String,
}

impl Created {
    fn missing_resource_ids(&self) -> Vec<String> {
        self.relationships
            .missing_resources
            .as_ref()
            .map(|doc| doc.data.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default()
    }
}

pub fn resource_list(resources: &[Resource]) -> ResourceList<'_> {
    ResourceList {
        resources: Document {
            data: resources
                .iter()
                .map(|r| ResourceIdentity {
                    kind: "resources",
                    id: &r.digest,
                    attributes: ResourceIdentityAttributes {
                        resource_url: &r.url,
                        is_root: r.role == ResourceRole::Root,
                        mimetype: None,
                    },
                })
                .collect(),
        },
    }
}

pub fn resource_content(content: &[u8]) -> Document<NewResourceContent> {
    Document {
        data: NewResourceContent {
            kind: "resources",
            id: format!("{:x}", Sha256::digest(content)),
            attributes: ResourceContentAttributes {
                base64_content: STANDARD.encode(content),
            },
        },
    }
}

#[async_trait]
impl SnapshotService for ApiClient {
    async fn create_build(
        &self,
        repo: &str,
        resources: &[Resource],
    ) -> Result<Build, ServiceError> {
        info!(repo, resources = resources.len(), "Creating build");
        let body = Document {
            data: NewBuild {
                kind: "builds",
                attributes: serde_json::Map::new(),
                relationships: resource_list(resources),
            },
        };
        let created: Document<Created> = self
            .post(&format!("/repos/{}/builds/", repo_path(repo)), Some(&body))
            .await?;
        Ok(Build {
            missing_resource_ids: created.data.missing_resource_ids(),
            id: created.data.id,
            web_url: created.data.attributes.web_url,
        })
    }

    async fn create_snapshot(
        &self,
        build_id: &str,
        resources: &[Resource],
        options: &SnapshotRequestOptions,
    ) -> Result<Snapshot, ServiceError> {
        let body = Document {
            data: NewSnapshot {
                kind: "snapshots",
                attributes: NewSnapshotAttributes {
                    name: None,
                    enable_javascript: options.enable_javascript,
                    widths: &options.widths,
                },
                relationships: resource_list(resources),
            },
        };
        let created: Document<Created> = self
            .post(&format!("/builds/{}/snapshots/", segment(build_id)), Some(&body))
            .await?;
        Ok(Snapshot {
            missing_resource_ids: created.data.missing_resource_ids(),
            id: created.data.id,
        })
    }

    async fn upload_resource(&self, build_id: &str, content: Vec<u8>) -> Result<(), ServiceError> {
        let body = resource_content(&content);
        debug!(build_id, sha = %body.data.id, bytes = content.len(), "Uploading resource");
        let _: serde_json::Value = self
            .post(&format!("/builds/{}/resources/", segment(build_id)), Some(&body))
            .await?;
        Ok(())
    }

    async fn finalize_snapshot(&self, snapshot_id: &str) -> Result<(), ServiceError> {
        let _: serde_json::Value = self
            .post::<(), _>(&format!("/snapshots/{}/finalize", segment(snapshot_id)), None)
            .await?;
        Ok(())
    }

    async fn finalize_build(&self, build_id: &str) -> Result<(), ServiceError> {
        let _: serde_json::Value = self
            .post::<(), _>(&format!("/builds/{}/finalize", segment(build_id)), None)
            .await?;
        Ok(())
    }
}

/// Fetches remote assets referenced by local pages.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self.http.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_err(transport_error)?;
            return Err(ServiceError::from_status(status.as_u16(), body));
        }
        Ok(response.bytes().await.map_err(transport_error)?.to_vec())
    }
}
