//! Connection-info resolution and vendor normalization
//!
//! The relay reports raw per-vendor connection parameters; this module
//! retries the fetch while the relay warms up, reshapes the fields into a
//! common form, and enforces the mandatory hostname/port/password triple.

use crate::{AuthToken, RelayClient, RelayError};
use porthole_platform::{ServiceInstance, Vendor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Fetch attempts before declaring the relay unaware of the service. The
/// relay may still be booting right after a restart, so transport failures
/// and error statuses both count as "not yet".
pub const RESOLVE_ATTEMPTS: u32 = 10;

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Mandatory fields after normalization.
const REQUIRED_FIELDS: [&str; 3] = ["hostname", "port", "password"];

/// Normalized backend connection parameters.
///
/// Map-backed so vendor-specific extras (vhost, db name, ...) survive for
/// display and launcher placeholder resolution; the typed accessors cover
/// the fields the tunnel itself needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionInfo {
    fields: Map<String, Value>,
}

impl ConnectionInfo {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field rendered as a plain string, for placeholder substitution.
    pub fn get_string(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        self.fields.get("hostname").and_then(Value::as_str)
    }

    pub fn port(&self) -> Option<u16> {
        let value = self.fields.get("port")?;
        match value {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Prefers the `username` field, falling back to `user`.
    pub fn username(&self) -> Option<&str> {
        self.fields
            .get("username")
            .or_else(|| self.fields.get("user"))
            .and_then(Value::as_str)
    }

    pub fn password(&self) -> Option<&str> {
        self.fields.get("password").and_then(Value::as_str)
    }
}

/// Fetch and normalize connection parameters for a bound service.
pub async fn resolve(
    client: &RelayClient,
    service: &ServiceInstance,
    token: &AuthToken,
) -> Result<ConnectionInfo, RelayError> {
    let mut raw = None;
    for attempt in 1..=RESOLVE_ATTEMPTS {
        match client.service_info(&service.name, token).await {
            Ok(fields) => {
                raw = Some(fields);
                break;
            }
            Err(e) => {
                debug!(
                    "Connection info fetch for {} failed (attempt {}/{}): {}",
                    service.name, attempt, RESOLVE_ATTEMPTS, e
                );
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }

    let raw = raw.ok_or_else(|| RelayError::ServiceUnknown(service.name.clone()))?;
    let info = ConnectionInfo::from_fields(normalize_fields(&service.vendor, raw));

    for field in REQUIRED_FIELDS {
        if info.get(field).map_or(true, Value::is_null) {
            return Err(RelayError::MissingField {
                field: field.to_string(),
                service: service.name.clone(),
            });
        }
    }

    Ok(info)
}

/// Reshape raw relay-reported fields into the common form.
pub fn normalize_fields(vendor: &Vendor, mut fields: Map<String, Value>) -> Map<String, Value> {
    match vendor {
        // The broker reports a single amqp URL; split it into components.
        Vendor::RabbitMq => {
            if let Some(url) = fields.get("url").and_then(Value::as_str) {
                if let Ok(parsed) = Url::parse(url) {
                    if let Some(host) = parsed.host_str() {
                        fields.insert("hostname".to_string(), Value::from(host));
                    }
                    if let Some(port) = parsed.port() {
                        fields.insert("port".to_string(), Value::from(port));
                    }
                    fields.insert(
                        "vhost".to_string(),
                        Value::from(parsed.path().trim_start_matches('/')),
                    );
                    if !parsed.username().is_empty() {
                        fields.insert("user".to_string(), Value::from(parsed.username()));
                    }
                    if let Some(password) = parsed.password() {
                        fields.insert("password".to_string(), Value::from(password));
                    }
                }
            }
            fields.remove("url");
        }

        // The database name lives in "db"; the reported "name" is junk.
        Vendor::MongoDb => {
            if let Some(db) = fields.remove("db") {
                fields.insert("name".to_string(), db);
            }
        }

        // "name" carries no meaning for a key-value store.
        Vendor::Redis => {
            fields.remove("name");
        }

        Vendor::Other(_) => {}
    }

    fields
}
