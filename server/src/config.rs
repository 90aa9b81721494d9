//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use mixcast_core::{MixcastError, Result};
use mixcast_observability::logging::{log_format_gueltig, log_level_gueltig};
use mixcast_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen (WebSocket-Endpunkt)
    pub netzwerk: NetzwerkEinstellungen,
    /// Verbindung zur Media-Engine
    pub media: MediaEinstellungen,
    /// Verbindungs-Einstellungen des Signalings
    pub signaling: SignalingEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen
    pub max_sessions: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Mixcast Server".into(),
            max_sessions: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer HTTP/WebSocket
    pub bind_adresse: String,
    /// Port des WebSocket-Endpunkts
    pub port: u16,
    /// URL-Pfad des WebSocket-Endpunkts
    pub pfad: String,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8080,
            pfad: "/one2many".into(),
        }
    }
}

/// Verbindung zur Media-Engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaEinstellungen {
    /// WebSocket-URI der Media-Engine
    pub ws_uri: String,
    /// Zeitlimit pro Engine-Aufruf in Millisekunden
    pub aufruf_timeout_ms: u64,
    /// Zeitlimit fuer den Verbindungsaufbau in Millisekunden
    pub verbindungs_timeout_ms: u64,
    /// Ping-Intervall in Sekunden (0 = kein Ping)
    pub ping_intervall_sek: u64,
}

impl Default for MediaEinstellungen {
    fn default() -> Self {
        Self {
            ws_uri: "ws://localhost:8888/kurento".into(),
            aufruf_timeout_ms: 10_000,
            verbindungs_timeout_ms: 5_000,
            ping_intervall_sek: 240,
        }
    }
}

/// Verbindungs-Einstellungen des Signalings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Ausgangs-Queue pro Verbindung
    pub sende_queue: usize,
    /// Maximale Groesse einer eingehenden Nachricht in Bytes
    pub max_nachricht_groesse: usize,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let standard = SignalingConfig::default();
        Self {
            keepalive_sek: standard.keepalive_sek,
            verbindungs_timeout_sek: standard.verbindungs_timeout_sek,
            sende_queue: standard.sende_queue,
            max_nachricht_groesse: standard.max_nachricht_groesse,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| MixcastError::konfiguration(format!("'{pfad}': {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(MixcastError::konfiguration(format!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                )))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Parst eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(inhalt)
    }

    /// Prueft Werte die serde allein nicht abfangen kann
    pub fn pruefen(&self) -> Result<()> {
        if !self.netzwerk.pfad.starts_with('/') {
            return Err(MixcastError::konfiguration(format!(
                "netzwerk.pfad muss mit '/' beginnen: '{}'",
                self.netzwerk.pfad
            )));
        }
        if self.server.max_sessions == 0 {
            return Err(MixcastError::konfiguration(
                "server.max_sessions muss groesser als 0 sein",
            ));
        }
        if self.media.aufruf_timeout_ms == 0 {
            return Err(MixcastError::konfiguration(
                "media.aufruf_timeout_ms muss groesser als 0 sein",
            ));
        }
        if !log_level_gueltig(&self.logging.level) {
            tracing::warn!(level = %self.logging.level, "Unbekannter Log-Level, Filter wird direkt verwendet");
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(MixcastError::konfiguration(format!(
                "logging.format muss 'text' oder 'json' sein: '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse des WebSocket-Endpunkts zurueck
    pub fn signaling_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Baut die Konfiguration des Signaling-Service
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            pfad: self.netzwerk.pfad.clone(),
            max_sessions: self.server.max_sessions,
            keepalive_sek: self.signaling.keepalive_sek,
            verbindungs_timeout_sek: self.signaling.verbindungs_timeout_sek,
            sende_queue: self.signaling.sende_queue,
            max_nachricht_groesse: self.signaling.max_nachricht_groesse,
        }
    }
}
