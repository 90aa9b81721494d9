//! Ausgangs-Queues – Nachrichten an verbundene Clients
//!
//! Jede Verbindung registriert beim Start eine begrenzte Queue. Der
//! Signaling-Kern und die Kandidaten-Handler der Media-Engine senden
//! nicht-blockierend hinein; der Verbindungs-Task schreibt sie auf den
//! WebSocket.
//!
//! Laeuft eine Queue ueber, wird der Client abgemeldet. Der Verbindungs-Task
//! leert die Queue noch, sieht dann das Kanalende und trennt die Verbindung,
//! sodass die Sitzung abgebaut wird statt ohne Antwort weiterzulaufen.

use dashmap::DashMap;
use mixcast_core::SessionId;
use mixcast_protocol::ServerMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Ergebnis eines Sendeversuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendeErgebnis {
    Eingereiht,
    /// Queue voll, Nachricht verworfen
    Voll,
    /// Client bereits getrennt
    Geschlossen,
}

/// Handle auf die Ausgangs-Queue eines verbundenen Clients
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub session_id: SessionId,
    pub tx: mpsc::Sender<ServerMessage>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    pub fn senden(&self, nachricht: ServerMessage) -> SendeErgebnis {
        match self.tx.try_send(nachricht) {
            Ok(()) => SendeErgebnis::Eingereiht,
            Err(mpsc::error::TrySendError::Full(_)) => SendeErgebnis::Voll,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(session_id = %self.session_id, "Send-Queue geschlossen (Client getrennt)");
                SendeErgebnis::Geschlossen
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OutboundRegistry
// ---------------------------------------------------------------------------

/// Ausgangs-Queues aller verbundenen Clients
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct OutboundRegistry {
    inner: Arc<OutboundInner>,
}

struct OutboundInner {
    clients: DashMap<SessionId, ClientSender>,
    queue_groesse: usize,
}

impl OutboundRegistry {
    /// Erstellt eine Registry mit der angegebenen Queue-Groesse pro Client
    pub fn neu(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(OutboundInner {
                clients: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert einen Client und gibt seine Empfangs-Queue zurueck
    pub fn client_registrieren(&self, session_id: SessionId) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        self.inner
            .clients
            .insert(session_id, ClientSender { session_id, tx });
        tracing::debug!(session_id = %session_id, "Client-Queue registriert");
        rx
    }

    /// Entfernt einen Client
    pub fn client_entfernen(&self, session_id: SessionId) {
        self.inner.clients.remove(&session_id);
        tracing::debug!(session_id = %session_id, "Client-Queue entfernt");
    }

    /// Sendet eine Nachricht an einen einzelnen Client
    ///
    /// Gibt `true` zurueck wenn der Client gefunden und die Nachricht eingereiht wurde.
    /// Bei voller Queue wird der Client abgemeldet.
    pub fn an_session_senden(&self, session_id: SessionId, nachricht: ServerMessage) -> bool {
        // Sender klonen, damit der DashMap-Eintrag nicht waehrend des Sendens gesperrt bleibt
        let Some(sender) = self.inner.clients.get(&session_id).map(|s| s.clone()) else {
            tracing::debug!(session_id = %session_id, "Senden an unbekannten Client");
            return false;
        };

        match sender.senden(nachricht) {
            SendeErgebnis::Eingereiht => true,
            SendeErgebnis::Voll => {
                tracing::warn!(
                    session_id = %session_id,
                    queue = self.inner.queue_groesse,
                    "Send-Queue voll – Client wird getrennt"
                );
                self.inner
                    .clients
                    .remove_if(&session_id, |_, s| s.tx.same_channel(&sender.tx));
                false
            }
            SendeErgebnis::Geschlossen => false,
        }
    }

    /// Gibt die Anzahl der registrierten Clients zurueck
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    /// Prueft ob ein Client registriert ist
    pub fn ist_registriert(&self, session_id: SessionId) -> bool {
        self.inner.clients.contains_key(&session_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_registrieren_und_senden() {
        let ausgang = OutboundRegistry::neu(8);
        let id = SessionId(1);

        let mut rx = ausgang.client_registrieren(id);
        assert!(ausgang.ist_registriert(id));
        assert!(ausgang.an_session_senden(id, ServerMessage::fehler("x")));

        let empfangen = rx.try_recv().expect("Nachricht muss vorhanden sein");
        assert_eq!(empfangen, ServerMessage::fehler("x"));
    }

    #[test]
    fn volle_queue_meldet_client_ab() {
        let ausgang = OutboundRegistry::neu(1);
        let id = SessionId(2);
        let mut rx = ausgang.client_registrieren(id);

        assert!(ausgang.an_session_senden(id, ServerMessage::fehler("1")));
        assert!(!ausgang.an_session_senden(id, ServerMessage::fehler("2")));
        assert!(!ausgang.ist_registriert(id));

        // Bereits eingereihte Nachrichten bleiben lesbar, danach ist der Kanal zu
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::fehler("1"));
        assert_eq!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        );
    }

    #[test]
    fn geschlossene_queue_bleibt_registriert() {
        let ausgang = OutboundRegistry::neu(1);
        let id = SessionId(4);
        drop(ausgang.client_registrieren(id));

        assert!(!ausgang.an_session_senden(id, ServerMessage::fehler("x")));
        assert!(ausgang.ist_registriert(id));
    }

    #[test]
    fn unbekannter_client() {
        let ausgang = OutboundRegistry::neu(4);
        assert!(!ausgang.an_session_senden(SessionId(9), ServerMessage::fehler("x")));
    }

    #[test]
    fn entfernen_schliesst_queue() {
        let ausgang = OutboundRegistry::neu(4);
        let id = SessionId(3);
        let mut rx = ausgang.client_registrieren(id);
        ausgang.client_entfernen(id);

        assert_eq!(ausgang.client_anzahl(), 0);
        assert!(rx.try_recv().is_err());
    }
}
