//! Prometheus-kompatible Metriken fuer Mixcast
//!
//! Registrierte Metriken:
//! - `mixcast_sessions_connected` – Gauge: Aktuell verbundene Sitzungen
//! - `mixcast_presenters_active` – Gauge: Presenter mit fertiger Verhandlung
//! - `mixcast_viewers_active` – Gauge: Viewer mit fertiger Verhandlung
//! - `mixcast_negotiations_total` – Counter: Verhandlungen (rolle, ergebnis)
//! - `mixcast_candidates_buffered_total` – Counter: Gepufferte ICE-Kandidaten
//! - `mixcast_release_failures_total` – Counter: Fehlgeschlagene Freigaben
//!
//! Unter Linux kommen die Prozess-Metriken (`process_*`) hinzu.

use anyhow::Result;
use axum::{extract::State, http, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Ergebnis-Label fuer `mixcast_negotiations_total`
pub const ERGEBNIS_ANGENOMMEN: &str = "accepted";
/// Ergebnis-Label fuer `mixcast_negotiations_total`
pub const ERGEBNIS_ABGELEHNT: &str = "rejected";

/// Alle Mixcast-Prometheus-Metriken
///
/// Clone teilt die Registry und alle Metriken.
#[derive(Clone)]
pub struct MixcastMetrics {
    pub registry: Arc<Registry>,

    // Sitzungs-Metriken
    pub sessions_connected: IntGauge,
    pub presenters_active: IntGauge,
    pub viewers_active: IntGauge,

    // Signaling-Metriken
    pub negotiations_total: IntCounterVec,
    pub candidates_buffered_total: IntCounter,
    pub release_failures_total: IntCounter,
}

impl MixcastMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Sitzungs-Metriken ---
        let sessions_connected = IntGauge::with_opts(Opts::new(
            "mixcast_sessions_connected",
            "Anzahl aktuell verbundener Sitzungen",
        ))?;
        registry.register(Box::new(sessions_connected.clone()))?;

        let presenters_active = IntGauge::with_opts(Opts::new(
            "mixcast_presenters_active",
            "Anzahl aktiver Presenter",
        ))?;
        registry.register(Box::new(presenters_active.clone()))?;

        let viewers_active = IntGauge::with_opts(Opts::new(
            "mixcast_viewers_active",
            "Anzahl aktiver Viewer",
        ))?;
        registry.register(Box::new(viewers_active.clone()))?;

        // --- Signaling-Metriken ---
        let negotiations_total = IntCounterVec::new(
            Opts::new(
                "mixcast_negotiations_total",
                "Gesamtanzahl abgeschlossener Verhandlungen",
            ),
            &["rolle", "ergebnis"],
        )?;
        registry.register(Box::new(negotiations_total.clone()))?;

        let candidates_buffered_total = IntCounter::with_opts(Opts::new(
            "mixcast_candidates_buffered_total",
            "ICE-Kandidaten die vor dem Endpunkt eintrafen",
        ))?;
        registry.register(Box::new(candidates_buffered_total.clone()))?;

        let release_failures_total = IntCounter::with_opts(Opts::new(
            "mixcast_release_failures_total",
            "Fehlgeschlagene Freigaben von Media-Objekten",
        ))?;
        registry.register(Box::new(release_failures_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_connected,
            presenters_active,
            viewers_active,
            negotiations_total,
            candidates_buffered_total,
            release_failures_total,
        })
    }

    /// Zaehlt eine abgeschlossene Verhandlung
    pub fn verhandlung_zaehlen(&self, rolle: &str, ergebnis: &str) {
        self.negotiations_total
            .with_label_values(&[rolle, ergebnis])
            .inc();
    }

    /// Aendert die Anzahl aktiver Sitzungen einer Rolle (`presenter` / `viewer`)
    pub fn aktive_aendern(&self, rolle: &str, delta: i64) {
        match rolle {
            "presenter" => self.presenters_active.add(delta),
            "viewer" => self.viewers_active.add(delta),
            _ => tracing::debug!(rolle, "Unbekannte Rolle fuer Aktiv-Metrik"),
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: MixcastMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<MixcastMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            http::StatusCode::OK,
            [(http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
