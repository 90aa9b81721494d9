//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Eingehende Text-Frames gehen an den `MessageDispatcher`,
//! ausgehende Nachrichten kommen ueber die Ausgangs-Queue der Sitzung.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen WebSocket-Ping
//! - Kommt innerhalb von `verbindungs_timeout_sek` kein Frame, wird getrennt
//!
//! Beim Verbindungsende wird die Sitzung genau einmal gestoppt. Das gilt
//! auch, wenn die Ausgangs-Queue ueberlaeuft und abgemeldet wird.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use mixcast_core::SessionId;
use mixcast_protocol::wire::nachricht_kodieren;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dispatcher::MessageDispatcher;
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    session_id: SessionId,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<SignalingState>, session_id: SessionId, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            session_id,
            peer_addr,
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht.
    pub async fn verarbeiten(
        self,
        socket: WebSocket,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let session_id = self.session_id;
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        tracing::info!(session_id = %session_id, peer = %peer_addr, "Neue Verbindung");

        let (mut sender, mut empfaenger) = socket.split();
        let mut ausgang_rx = self
            .state
            .coordinator
            .ausgang()
            .client_registrieren(session_id);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        // Zeitpunkt des naechsten Ping
        let mut naechster_ping = Instant::now() + keepalive_intervall;

        loop {
            let jetzt = Instant::now();

            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                tracing::warn!(session_id = %session_id, peer = %peer_addr, "Verbindungs-Timeout");
                break;
            }

            let ping_verzoegerung = if jetzt < naechster_ping {
                naechster_ping.duration_since(jetzt)
            } else {
                Duration::from_millis(1)
            };

            tokio::select! {
                // Eingehender Frame vom Client
                frame = empfaenger.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(session_id = %session_id, bytes = text.len(), "Nachricht empfangen");
                            dispatcher.dispatch(session_id, &text).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(session_id = %session_id, peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            letzter_empfang = Instant::now();
                            tracing::debug!(session_id = %session_id, "Binaer-Frame ignoriert");
                        }
                        Some(Ok(_)) => {
                            // Ping/Pong zaehlen als Lebenszeichen
                            letzter_empfang = Instant::now();
                        }
                        Some(Err(e)) => {
                            tracing::warn!(session_id = %session_id, peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht der Sitzung
                ausgehend = ausgang_rx.recv() => {
                    let Some(ausgehend) = ausgehend else {
                        // Queue abgemeldet (Ueberlauf)
                        tracing::warn!(session_id = %session_id, peer = %peer_addr, "Ausgangs-Queue geschlossen – Verbindung wird getrennt");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    };
                    let text = match nachricht_kodieren(&ausgehend) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(session_id = %session_id, fehler = %e, "Kodieren fehlgeschlagen");
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Message::Text(text)).await {
                        tracing::warn!(session_id = %session_id, fehler = %e, "Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if jetzt >= naechster_ping {
                        if let Err(e) = sender.send(Message::Ping(Vec::new())).await {
                            tracing::warn!(session_id = %session_id, fehler = %e, "Ping-Senden fehlgeschlagen");
                            break;
                        }
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(session_id = %session_id, "Shutdown-Signal – Verbindung wird getrennt");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }

        dispatcher.client_cleanup(session_id).await;
        tracing::info!(session_id = %session_id, peer = %peer_addr, "Verbindungs-Task beendet");
    }
}
