//! REST-backed platform client
//!
//! Thin mapping of the [`PlatformClient`] trait onto the platform's
//! application-management API. Authentication is a bearer token on every
//! request.

use crate::{
    AppManifest, AppSnapshot, PlatformClient, PlatformError, ServiceInstance,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Application record as returned by `GET /apps/<name>`.
#[derive(Debug, Deserialize)]
struct AppRecord {
    #[serde(default)]
    url: String,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    services: Vec<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    instances: u32,
    #[serde(default)]
    running_instances: u32,
}

/// Platform client over the platform's HTTP API.
pub struct HttpPlatformClient {
    http: reqwest::Client,
    api_url: Url,
    target: String,
    token: String,
}

impl HttpPlatformClient {
    /// Build a client for the given target hostname and access token.
    pub fn new(target: &str, token: &str) -> Result<Self, PlatformError> {
        let api_url =
            Url::parse(&format!("https://{}", target)).map_err(|e| PlatformError::InvalidTarget {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_url,
            target: target.to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.api_url.clone();
        url.set_path(path);
        url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("Authorization", &self.token)
    }

    /// Map a non-success response to a platform error.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(PlatformError::UnexpectedResponse {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_app(&self, name: &str) -> Result<AppRecord, PlatformError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/apps/{}", name))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PlatformError::AppNotFound(name.to_string()));
        }

        let record = Self::check(response).await?.json::<AppRecord>().await?;
        Ok(record)
    }

    /// Partial update of an application record.
    async fn update_app(&self, name: &str, body: serde_json::Value) -> Result<(), PlatformError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/apps/{}", name))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    fn target(&self) -> &str {
        &self.target
    }

    async fn list_services(&self) -> Result<Vec<ServiceInstance>, PlatformError> {
        let response = self.request(reqwest::Method::GET, "/services").send().await?;
        let services = Self::check(response)
            .await?
            .json::<Vec<ServiceInstance>>()
            .await?;
        Ok(services)
    }

    async fn app_exists(&self, name: &str) -> Result<bool, PlatformError> {
        match self.fetch_app(name).await {
            Ok(_) => Ok(true),
            Err(PlatformError::AppNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn app_snapshot(&self, name: &str) -> Result<AppSnapshot, PlatformError> {
        let record = self.fetch_app(name).await?;
        Ok(AppSnapshot {
            url: record.url,
            env: record.env,
            services: record.services,
        })
    }

    async fn app_healthy(&self, name: &str) -> Result<bool, PlatformError> {
        let record = self.fetch_app(name).await?;
        Ok(record.state == "STARTED"
            && record.instances > 0
            && record.running_instances >= record.instances)
    }

    async fn create_app(&self, manifest: &AppManifest) -> Result<(), PlatformError> {
        debug!("Creating application {}", manifest.name);
        let response = self
            .request(reqwest::Method::POST, "/apps")
            .json(manifest)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upload_app(&self, name: &str, payload: &Path) -> Result<(), PlatformError> {
        let bytes = tokio::fs::read(payload)
            .await
            .map_err(|source| PlatformError::Payload {
                path: payload.display().to_string(),
                source,
            })?;

        debug!("Uploading {} bytes to application {}", bytes.len(), name);
        let response = self
            .request(reqwest::Method::PUT, &format!("/apps/{}/application", name))
            .header("Content-Type", "application/zip")
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn start_app(&self, name: &str) -> Result<(), PlatformError> {
        self.update_app(name, json!({ "state": "STARTED" })).await
    }

    async fn stop_app(&self, name: &str) -> Result<(), PlatformError> {
        self.update_app(name, json!({ "state": "STOPPED" })).await
    }

    async fn restart_app(&self, name: &str) -> Result<(), PlatformError> {
        self.stop_app(name).await?;
        self.start_app(name).await
    }

    async fn delete_app(&self, name: &str) -> Result<(), PlatformError> {
        debug!("Deleting application {}", name);
        let response = self
            .request(reqwest::Method::DELETE, &format!("/apps/{}", name))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn bind_service(&self, app: &str, service: &str) -> Result<(), PlatformError> {
        let record = self.fetch_app(app).await?;

        let mut services = record.services;
        if !services.iter().any(|s| s == service) {
            services.push(service.to_string());
        }

        self.update_app(app, json!({ "services": services })).await
    }
}
