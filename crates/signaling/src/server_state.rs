//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Konfiguration, Coordinator und Sitzungs-ID-Vergabe als
//! Arc-Referenzen, die sicher zwischen tokio-Tasks geteilt werden koennen.

use mixcast_core::SessionIdGenerator;
use mixcast_media::MediaEngine;
use mixcast_observability::MixcastMetrics;
use mixcast_protocol::wire::DEFAULT_MAX_NACHRICHT_GROESSE;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::coordinator::BroadcastCoordinator;
use crate::outbound::OutboundRegistry;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// URL-Pfad des WebSocket-Endpunkts
    pub pfad: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_sessions: usize,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Ausgangs-Queue pro Verbindung
    pub sende_queue: usize,
    /// Maximale Groesse einer eingehenden Nachricht in Bytes
    pub max_nachricht_groesse: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            pfad: "/one2many".to_string(),
            max_sessions: 512,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            sende_queue: 64,
            max_nachricht_groesse: DEFAULT_MAX_NACHRICHT_GROESSE,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Signaling-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Zustandsmaschine fuer Presenter und Viewer
    pub coordinator: BroadcastCoordinator,
    /// Vergibt Sitzungs-IDs beim Verbindungsaufbau
    pub id_generator: SessionIdGenerator,
    /// Aktuell offene Verbindungen
    verbindungen: AtomicUsize,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

/// Belegt einen Verbindungsplatz bis zum Drop
pub struct VerbindungsPlatz {
    state: Arc<SignalingState>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.state.verbindungen.fetch_sub(1, Ordering::SeqCst);
        self.state.coordinator.metriken().sessions_connected.dec();
    }
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(
        config: SignalingConfig,
        engine: Arc<dyn MediaEngine>,
        metriken: MixcastMetrics,
    ) -> Arc<Self> {
        let ausgang = OutboundRegistry::neu(config.sende_queue);
        Arc::new(Self {
            config: Arc::new(config),
            coordinator: BroadcastCoordinator::neu(engine, ausgang, metriken),
            id_generator: SessionIdGenerator::neu(),
            verbindungen: AtomicUsize::new(0),
            start_time: Instant::now(),
        })
    }

    /// Reserviert einen Verbindungsplatz, `None` wenn der Server voll ist
    pub fn platz_reservieren(self: &Arc<Self>) -> Option<VerbindungsPlatz> {
        let vorher = self.verbindungen.fetch_add(1, Ordering::SeqCst);
        if vorher >= self.config.max_sessions {
            self.verbindungen.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        self.coordinator.metriken().sessions_connected.inc();
        Some(VerbindungsPlatz {
            state: Arc::clone(self),
        })
    }

    /// Anzahl offener Verbindungen
    pub fn verbindungs_anzahl(&self) -> usize {
        self.verbindungen.load(Ordering::SeqCst)
    }

    /// Wartet bis alle Verbindungen beendet sind oder `maximal` verstrichen ist
    ///
    /// Gibt `true` zurueck wenn keine Verbindung mehr offen ist.
    pub async fn auf_verbindungsende_warten(&self, maximal: Duration) -> bool {
        let ende = Instant::now() + maximal;
        while self.verbindungs_anzahl() > 0 {
            if Instant::now() >= ende {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        true
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
