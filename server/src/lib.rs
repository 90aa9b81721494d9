//! mixcast-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use mixcast_media::{KurentoClient, ZeitbegrenzteEngine};
use mixcast_observability::{
    observability_server_starten, EnginePruefung, HealthState, MixcastMetrics,
};
use mixcast_signaling::{SignalingServer, SignalingState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Maximale Wartezeit auf das Ende aller Verbindungen beim Herunterfahren
const VERBINDUNGSENDE_TIMEOUT: Duration = Duration::from_secs(5);

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Verbindung zur Media-Engine herstellen
    /// 2. Observability-Server starten (optional)
    /// 3. WebSocket-Signaling starten
    /// 4. Auf Ctrl-C warten
    /// 5. Verbindungen schliessen, Mixer und Pipeline freigeben
    pub async fn starten(self) -> Result<()> {
        let cfg = &self.config;
        let signaling_addr: SocketAddr = cfg
            .signaling_bind_adresse()
            .parse()
            .context("Ungueltige Signaling-Bind-Adresse")?;

        tracing::info!(
            server_name = %cfg.server.name,
            adresse = %signaling_addr,
            pfad = %cfg.netzwerk.pfad,
            media = %cfg.media.ws_uri,
            "Server startet"
        );

        // --- Media-Engine ---
        let kurento = KurentoClient::verbinden(
            &cfg.media.ws_uri,
            Duration::from_millis(cfg.media.verbindungs_timeout_ms),
            Duration::from_secs(cfg.media.ping_intervall_sek),
        )
        .await
        .context("Media-Engine nicht erreichbar")?;
        let engine = ZeitbegrenzteEngine::neu(
            kurento.clone(),
            Duration::from_millis(cfg.media.aufruf_timeout_ms),
        );

        let metriken = MixcastMetrics::neu()?;
        let state = SignalingState::neu(cfg.signaling_config(), Arc::new(engine), metriken.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // --- Observability ---
        let observability = if cfg.observability.aktiviert {
            let addr: SocketAddr = cfg
                .observability_bind_adresse()
                .parse()
                .context("Ungueltige Observability-Bind-Adresse")?;
            let pruef_state = Arc::clone(&state);
            let pruefung: EnginePruefung =
                Arc::new(move || pruef_state.coordinator.engine_verbunden());
            Some(tokio::spawn(observability_server_starten(
                addr,
                metriken,
                HealthState::neu(pruefung),
                shutdown_rx.clone(),
            )))
        } else {
            None
        };

        // --- Signaling ---
        let signaling = SignalingServer::neu(Arc::clone(&state), signaling_addr);
        let mut signaling_task = tokio::spawn(signaling.starten(shutdown_rx.clone()));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        let vorzeitig = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                None
            }
            ergebnis = &mut signaling_task => {
                tracing::error!("Signaling-Server unerwartet beendet");
                Some(ergebnis)
            }
        };

        let _ = shutdown_tx.send(true);
        let signaling_ergebnis = match vorzeitig {
            Some(ergebnis) => ergebnis,
            None => signaling_task.await,
        };

        if !state.auf_verbindungsende_warten(VERBINDUNGSENDE_TIMEOUT).await {
            tracing::warn!(
                offen = state.verbindungs_anzahl(),
                "Nicht alle Verbindungen rechtzeitig beendet"
            );
        }
        state.coordinator.herunterfahren().await;
        kurento.trennen();

        if let Some(task) = observability {
            match task.await {
                Ok(Err(e)) => tracing::warn!(fehler = %e, "Observability-Server mit Fehler beendet"),
                Err(e) => tracing::warn!(fehler = %e, "Observability-Task abgebrochen"),
                Ok(Ok(())) => {}
            }
        }

        signaling_ergebnis
            .context("Signaling-Task abgebrochen")?
            .context("Signaling-Server fehlgeschlagen")?;

        tracing::info!(uptime_sek = state.uptime_sek(), "Server beendet");
        Ok(())
    }
}
