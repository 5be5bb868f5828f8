//! Test doubles for lifecycle and orchestration tests: an in-memory
//! platform with per-operation call counters and a minimal fake relay
//! serving `/info` and `/services/<name>` over plain HTTP.

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use porthole_platform::{
    AppManifest, AppSnapshot, PlatformClient, PlatformError, ServiceInstance,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// --- fake relay ---

pub struct FakeRelay {
    pub version: String,
    pub services: HashMap<String, serde_json::Value>,
}

impl FakeRelay {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            services: HashMap::new(),
        }
    }

    pub fn with_service(mut self, name: &str, info: serde_json::Value) -> Self {
        self.services.insert(name.to_string(), info);
        self
    }
}

async fn info(State(state): State<Arc<FakeRelay>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": state.version }))
}

async fn service_info(
    State(state): State<Arc<FakeRelay>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.services.get(&name) {
        Some(info) => (StatusCode::OK, Json(info.clone())),
        None => (StatusCode::NOT_FOUND, Json(serde_json::Value::Null)),
    }
}

/// Start the fake relay on an ephemeral port; returns `host:port`.
pub async fn spawn_relay(state: Arc<FakeRelay>) -> String {
    let app = Router::new()
        .route("/info", get(info))
        .route("/services/{name}", get(service_info))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("127.0.0.1:{}", addr.port())
}

// --- fake platform ---

#[derive(Default)]
pub struct Calls {
    pub create: AtomicU32,
    pub upload: AtomicU32,
    pub start: AtomicU32,
    pub stop: AtomicU32,
    pub restart: AtomicU32,
    pub delete: AtomicU32,
    pub bind: AtomicU32,
}

impl Calls {
    /// Total mutating platform calls observed.
    pub fn mutations(&self) -> u32 {
        self.create.load(Ordering::SeqCst)
            + self.upload.load(Ordering::SeqCst)
            + self.start.load(Ordering::SeqCst)
            + self.stop.load(Ordering::SeqCst)
            + self.restart.load(Ordering::SeqCst)
            + self.delete.load(Ordering::SeqCst)
            + self.bind.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct FakeApp {
    pub env: Vec<String>,
    pub services: Vec<String>,
    pub healthy: bool,
}

/// In-memory platform holding at most one application, whose URL always
/// points at the spawned fake relay.
pub struct FakePlatform {
    relay_host: String,
    app: Mutex<Option<FakeApp>>,
    pub calls: Calls,
    pub fail_upload: AtomicBool,
    pub healthy_on_start: AtomicBool,
    /// Health polls reported unhealthy after a restart before the app
    /// recovers, simulating the reboot window.
    pub restart_recovery_polls: AtomicU32,
    recovery_remaining: AtomicU32,
    pub health_checks: AtomicU32,
}

impl FakePlatform {
    pub fn new(relay_host: &str) -> Self {
        Self {
            relay_host: relay_host.to_string(),
            app: Mutex::new(None),
            calls: Calls::default(),
            fail_upload: AtomicBool::new(false),
            healthy_on_start: AtomicBool::new(true),
            restart_recovery_polls: AtomicU32::new(0),
            recovery_remaining: AtomicU32::new(0),
            health_checks: AtomicU32::new(0),
        }
    }

    pub fn with_app(self, app: FakeApp) -> Self {
        *self.app.lock().unwrap() = Some(app);
        self
    }

    pub fn app(&self) -> Option<FakeApp> {
        self.app.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    fn target(&self) -> &str {
        "api.platform.example.com"
    }

    async fn list_services(&self) -> Result<Vec<ServiceInstance>, PlatformError> {
        Ok(vec![])
    }

    async fn app_exists(&self, _name: &str) -> Result<bool, PlatformError> {
        Ok(self.app.lock().unwrap().is_some())
    }

    async fn app_snapshot(&self, name: &str) -> Result<AppSnapshot, PlatformError> {
        match &*self.app.lock().unwrap() {
            Some(app) => Ok(AppSnapshot {
                url: self.relay_host.clone(),
                env: app.env.clone(),
                services: app.services.clone(),
            }),
            None => Err(PlatformError::AppNotFound(name.to_string())),
        }
    }

    async fn app_healthy(&self, name: &str) -> Result<bool, PlatformError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);

        let remaining = self.recovery_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.recovery_remaining.fetch_sub(1, Ordering::SeqCst);
            if remaining == 1 {
                if let Some(app) = &mut *self.app.lock().unwrap() {
                    app.healthy = true;
                }
            }
            return Ok(false);
        }

        match &*self.app.lock().unwrap() {
            Some(app) => Ok(app.healthy),
            None => Err(PlatformError::AppNotFound(name.to_string())),
        }
    }

    async fn create_app(&self, manifest: &AppManifest) -> Result<(), PlatformError> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        *self.app.lock().unwrap() = Some(FakeApp {
            env: manifest.env.clone(),
            services: manifest.services.clone(),
            healthy: false,
        });
        Ok(())
    }

    async fn upload_app(&self, _name: &str, _payload: &std::path::Path) -> Result<(), PlatformError> {
        self.calls.upload.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(PlatformError::UnexpectedResponse {
                status: 500,
                body: "upload rejected".to_string(),
            });
        }
        Ok(())
    }

    async fn start_app(&self, _name: &str) -> Result<(), PlatformError> {
        self.calls.start.fetch_add(1, Ordering::SeqCst);
        if let Some(app) = &mut *self.app.lock().unwrap() {
            app.healthy = self.healthy_on_start.load(Ordering::SeqCst);
        }
        Ok(())
    }

    async fn stop_app(&self, _name: &str) -> Result<(), PlatformError> {
        self.calls.stop.fetch_add(1, Ordering::SeqCst);
        if let Some(app) = &mut *self.app.lock().unwrap() {
            app.healthy = false;
        }
        Ok(())
    }

    async fn restart_app(&self, _name: &str) -> Result<(), PlatformError> {
        self.calls.restart.fetch_add(1, Ordering::SeqCst);

        let polls = self.restart_recovery_polls.load(Ordering::SeqCst);
        if polls > 0 {
            self.recovery_remaining.store(polls, Ordering::SeqCst);
            if let Some(app) = &mut *self.app.lock().unwrap() {
                app.healthy = false;
            }
        }
        Ok(())
    }

    async fn delete_app(&self, _name: &str) -> Result<(), PlatformError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        *self.app.lock().unwrap() = None;
        Ok(())
    }

    async fn bind_service(&self, _app: &str, service: &str) -> Result<(), PlatformError> {
        self.calls.bind.fetch_add(1, Ordering::SeqCst);
        if let Some(app) = &mut *self.app.lock().unwrap() {
            if !app.services.iter().any(|s| s == service) {
                app.services.push(service.to_string());
            }
        }
        Ok(())
    }
}
