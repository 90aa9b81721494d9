//! Message-Dispatcher – Routet Client-Nachrichten an den Coordinator
//!
//! `presenter` und `viewer` reservieren die Rolle sofort und laufen dann als
//! eigener Task weiter, damit `onIceCandidate` und `stop` derselben
//! Verbindung waehrend der Verhandlung gelesen (und gepuffert bzw.
//! vorgemerkt) werden. `onIceCandidate` und `stop` werden in
//! Eingangsreihenfolge direkt verarbeitet.

use mixcast_core::{Rolle, SessionId};
use mixcast_protocol::wire::nachricht_dekodieren_mit_limit;
use mixcast_protocol::{ClientMessage, ServerMessage};
use std::sync::Arc;

use crate::server_state::SignalingState;

/// Maximale Laenge des Payloads in einer Fehlermeldung
const MAX_PAYLOAD_ECHO: usize = 1024;

/// Zentraler Message-Dispatcher einer Verbindung
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet einen eingehenden Text-Frame
    ///
    /// Ungueltige Nachrichten werden mit einer `error`-Nachricht beantwortet;
    /// die Verbindung bleibt offen.
    pub async fn dispatch(&self, session_id: SessionId, text: &str) {
        let nachricht =
            match nachricht_dekodieren_mit_limit(text, self.state.config.max_nachricht_groesse) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, fehler = %e, "Ungueltige Nachricht");
                    self.state.coordinator.ausgang().an_session_senden(
                        session_id,
                        ServerMessage::fehler(format!("Invalid message {}", payload_kuerzen(text))),
                    );
                    return;
                }
            };

        let coordinator = &self.state.coordinator;
        match nachricht {
            ClientMessage::Presenter { sdp_offer } => {
                self.verhandlung_starten(session_id, Rolle::Presenter, sdp_offer)
            }
            ClientMessage::Viewer { sdp_offer } => {
                self.verhandlung_starten(session_id, Rolle::Viewer, sdp_offer)
            }
            ClientMessage::Stop => coordinator.stoppen(session_id).await,
            ClientMessage::OnIceCandidate { candidate } => {
                coordinator.kandidat_einreichen(session_id, candidate).await
            }
        }
    }

    fn verhandlung_starten(&self, session_id: SessionId, rolle: Rolle, sdp_offer: String) {
        tracing::debug!(session_id = %session_id, rolle = %rolle, "Verhandlung angefordert");

        // Ablehnungen sind bereits an den Client gemeldet
        let Ok(verhandlung) = self
            .state
            .coordinator
            .verhandlung_vorbereiten(session_id, rolle, sdp_offer)
        else {
            return;
        };

        tokio::spawn(async move {
            let _ = verhandlung.ausfuehren().await;
        });
    }

    /// Baut die Sitzung beim Verbindungsende ab
    pub async fn client_cleanup(&self, session_id: SessionId) {
        self.state.coordinator.stoppen(session_id).await;
        self.state.coordinator.ausgang().client_entfernen(session_id);
    }
}

/// Kuerzt den Payload fuer die Fehlermeldung auf eine Zeichengrenze
fn payload_kuerzen(text: &str) -> &str {
    if text.len() <= MAX_PAYLOAD_ECHO {
        return text;
    }
    let mut ende = MAX_PAYLOAD_ECHO;
    while !text.is_char_boundary(ende) {
        ende -= 1;
    }
    &text[..ende]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kurzer_payload_bleibt() {
        assert_eq!(payload_kuerzen("{\"kind\":\"x\"}"), "{\"kind\":\"x\"}");
    }

    #[test]
    fn langer_payload_wird_an_zeichengrenze_gekuerzt() {
        let text = "ä".repeat(MAX_PAYLOAD_ECHO);
        let gekuerzt = payload_kuerzen(&text);
        assert!(gekuerzt.len() <= MAX_PAYLOAD_ECHO);
        assert!(gekuerzt.chars().all(|c| c == 'ä'));
    }
}
