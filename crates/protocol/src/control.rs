//! Control-Protokoll (WebSocket)
//!
//! Definiert alle Signaling-Nachrichten zwischen Client und Server.
//!
//! ## Design
//! - JSON-Serialisierung via serde, ein Text-Frame pro Nachricht
//! - Tagged Enums (`kind`) fuer typsichere Nachrichtentypen
//! - ICE-Kandidaten sind fuer den Server opak und werden unveraendert
//!   zwischen Client und Media-Engine weitergereicht

use mixcast_core::Rolle;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ICE-Kandidaten
// ---------------------------------------------------------------------------

/// Netzwerk-Kandidat (ICE) wie ihn der Browser erzeugt
///
/// Felder die der Server nicht kennt bleiben in `weitere` erhalten und
/// werden unveraendert weitergegeben.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// SDP-Attributzeile des Kandidaten
    pub candidate: String,
    /// Media-Stream-Identifikation
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index der m-Zeile im SDP
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u32>,
    /// Unbekannte Zusatzfelder
    #[serde(flatten)]
    pub weitere: serde_json::Map<String, serde_json::Value>,
}

impl CandidateRecord {
    /// Erstellt einen Kandidaten ohne Zusatzfelder
    pub fn neu(candidate: impl Into<String>, sdp_mid: Option<String>, sdp_m_line_index: Option<u32>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_m_line_index,
            weitere: serde_json::Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Eingehende Nachrichten (Client -> Server)
// ---------------------------------------------------------------------------

/// Nachricht vom Client an den Server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Client moechte als Presenter senden
    Presenter {
        #[serde(rename = "sdpOffer")]
        sdp_offer: String,
    },
    /// Client moechte den gemischten Stream empfangen
    Viewer {
        #[serde(rename = "sdpOffer")]
        sdp_offer: String,
    },
    /// Sitzung beenden
    Stop,
    /// ICE-Kandidat des Clients
    OnIceCandidate { candidate: CandidateRecord },
}

impl ClientMessage {
    /// Alle gueltigen Werte des `kind`-Felds
    pub const ARTEN: [&'static str; 4] = ["presenter", "viewer", "stop", "onIceCandidate"];

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Ausgehende Nachrichten (Server -> Client)
// ---------------------------------------------------------------------------

/// Ergebnis einer Verhandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntwortStatus {
    Accepted,
    Rejected,
}

/// Antwort auf eine Presenter- oder Viewer-Anfrage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationResponse {
    pub response: AntwortStatus,
    #[serde(rename = "sdpAnswer", default, skip_serializing_if = "Option::is_none")]
    pub sdp_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Nachricht vom Server an den Client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ServerMessage {
    PresenterResponse(NegotiationResponse),
    ViewerResponse(NegotiationResponse),
    /// ICE-Kandidat der Media-Engine fuer den Client
    IceCandidate { candidate: CandidateRecord },
    /// Protokollfehler – die Verbindung bleibt offen
    Error { message: String },
}

impl ServerMessage {
    /// Erstellt eine positive Verhandlungsantwort mit SDP-Answer
    pub fn angenommen(rolle: Rolle, sdp_answer: impl Into<String>) -> Self {
        Self::antwort(
            rolle,
            NegotiationResponse {
                response: AntwortStatus::Accepted,
                sdp_answer: Some(sdp_answer.into()),
                message: None,
            },
        )
    }

    /// Erstellt eine Ablehnung mit Begruendung
    pub fn abgelehnt(rolle: Rolle, message: impl Into<String>) -> Self {
        Self::antwort(
            rolle,
            NegotiationResponse {
                response: AntwortStatus::Rejected,
                sdp_answer: None,
                message: Some(message.into()),
            },
        )
    }

    /// Erstellt eine Fehler-Nachricht
    pub fn fehler(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Verpackt einen ICE-Kandidaten der Media-Engine
    pub fn ice_kandidat(candidate: CandidateRecord) -> Self {
        Self::IceCandidate { candidate }
    }

    fn antwort(rolle: Rolle, antwort: NegotiationResponse) -> Self {
        match rolle {
            Rolle::Presenter => Self::PresenterResponse(antwort),
            Rolle::Viewer => Self::ViewerResponse(antwort),
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
