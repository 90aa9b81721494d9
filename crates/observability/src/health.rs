//! Health-Check-Endpunkt fuer Mixcast
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Media-Engine-Verbindungsstatus

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub engine_connected: bool,
}

/// Prueft ob die Media-Engine erreichbar ist
pub type EnginePruefung = Arc<dyn Fn() -> bool + Send + Sync>;

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    engine_pruefung: EnginePruefung,
}

impl HealthState {
    /// Erstellt den Zustand mit einer Pruefung der Engine-Verbindung
    pub fn neu(engine_pruefung: EnginePruefung) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            engine_pruefung,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn engine_verbunden(&self) -> bool {
        (self.engine_pruefung)()
    }

    /// Baut die Health-Antwort aus dem aktuellen Zustand
    pub fn antwort(&self) -> HealthResponse {
        let engine_connected = self.engine_verbunden();
        // Ohne Engine kann keine Sitzung verhandelt werden
        let status = if engine_connected {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            engine_connected,
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();

    let http_status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}
