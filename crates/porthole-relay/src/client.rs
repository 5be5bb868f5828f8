//! HTTP client for the remote relay
//!
//! Base-URL discovery probes `https://` then `http://` against the
//! platform-reported hostname; since probe requests carry no token, the
//! definitive "relay lives here" signal is a 404.

use crate::{AuthToken, RelayError};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Relay protocol version this client expects. The relay payload reports the
/// same constant from its `/info` endpoint; a mismatch means the deployed
/// relay predates this client and must be recreated.
pub const RELAY_VERSION: &str = "0.0.4";

/// Header carrying the shared secret on every authenticated request.
pub const AUTH_HEADER: &str = "Auth-Token";

/// URL-unreserved characters stay literal in path segments.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Response of `GET /info`.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayInfo {
    pub version: String,
}

/// Paths allocated by the relay for one tunneled connection.
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelPaths {
    pub path: String,
    pub path_in: String,
    pub path_out: String,
}

/// Wire client bound to a discovered relay base URL.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RelayClient {
    /// Discover the relay's base URL for a platform-reported hostname.
    ///
    /// Tries `https://` then `http://`; an unauthenticated 404 adopts the
    /// scheme. Transport failures (refused connections, TLS handshakes
    /// against a plain listener) move on to the next scheme; any other
    /// response does too. Exhausting both schemes is fatal.
    pub async fn discover(host: &str) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        for scheme in ["https", "http"] {
            let candidate = format!("{}://{}", scheme, host);
            debug!("Probing relay base URL {}", candidate);

            match http.get(&candidate).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    let base_url = Url::parse(&candidate)
                        .map_err(|e| RelayError::InvalidUrl(e.to_string()))?;
                    return Ok(Self { http, base_url });
                }
                Ok(response) => {
                    debug!("{} answered with {}, trying next scheme", candidate, response.status());
                }
                Err(e) => {
                    debug!("{} unreachable: {}", candidate, e);
                }
            }
        }

        Err(RelayError::BaseUrlUndiscoverable(host.to_string()))
    }

    /// Client for an already-known base URL. Used by tests; production code
    /// goes through [`RelayClient::discover`].
    pub fn with_base_url(base_url: Url) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, RelayError> {
        self.base_url
            .join(path)
            .map_err(|e| RelayError::InvalidUrl(e.to_string()))
    }

    fn check(response: &reqwest::Response) -> Result<(), RelayError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RelayError::UnexpectedResponse {
                status: response.status().as_u16(),
            })
        }
    }

    /// Authenticated health/version probe.
    pub async fn info(&self, token: &AuthToken) -> Result<RelayInfo, RelayError> {
        let response = self
            .http
            .get(self.endpoint("/info")?)
            .header(AUTH_HEADER, token.as_str())
            .send()
            .await?;
        Self::check(&response)?;
        Ok(response.json::<RelayInfo>().await?)
    }

    /// Raw connection parameters for a bound service, as reported by the
    /// relay. Single attempt; retry policy lives in the resolver.
    pub async fn service_info(
        &self,
        service_name: &str,
        token: &AuthToken,
    ) -> Result<Map<String, Value>, RelayError> {
        let segment = utf8_percent_encode(service_name, PATH_SEGMENT);
        let response = self
            .http
            .get(self.endpoint(&format!("/services/{}", segment))?)
            .header(AUTH_HEADER, token.as_str())
            .send()
            .await?;
        Self::check(&response)?;
        Ok(response.json::<Map<String, Value>>().await?)
    }

    /// Allocate a tunnel to `host:port` behind the relay.
    pub async fn create_tunnel(
        &self,
        token: &AuthToken,
        host: &str,
        port: u16,
    ) -> Result<TunnelPaths, RelayError> {
        let response = self
            .http
            .post(self.endpoint("/tunnels")?)
            .header(AUTH_HEADER, token.as_str())
            .json(&serde_json::json!({ "host": host, "port": port }))
            .send()
            .await?;
        Self::check(&response)?;
        Ok(response.json::<TunnelPaths>().await?)
    }

    /// Push one outbound chunk. A 404 means the relay side already closed.
    pub async fn send_chunk(
        &self,
        path_in: &str,
        seq: u64,
        data: Vec<u8>,
        token: &AuthToken,
    ) -> Result<(), RelayError> {
        let response = self
            .http
            .put(self.endpoint(&format!("{}/{}", path_in, seq))?)
            .header(AUTH_HEADER, token.as_str())
            .body(data)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RelayError::TunnelClosed);
        }
        Self::check(&response)
    }

    /// Long-poll the next inbound chunk. `None` means the tunnel is closed.
    pub async fn recv_chunk(
        &self,
        path_out: &str,
        seq: u64,
        token: &AuthToken,
    ) -> Result<Option<Vec<u8>>, RelayError> {
        let response = self
            .http
            .get(self.endpoint(&format!("{}/{}", path_out, seq))?)
            .header(AUTH_HEADER, token.as_str())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::check(&response)?;
        Ok(Some(response.bytes().await?.to_vec()))
    }

    /// Release a tunnel.
    pub async fn close_tunnel(&self, path: &str, token: &AuthToken) -> Result<(), RelayError> {
        let response = self
            .http
            .delete(self.endpoint(path)?)
            .header(AUTH_HEADER, token.as_str())
            .send()
            .await?;
        Self::check(&response)
    }
}
