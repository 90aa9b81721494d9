//! KurentoClient – JSON-RPC-Verbindung zu einem Kurento Media Server
//!
//! Eine WebSocket-Verbindung pro Prozess. Ein Sende-Task schreibt Frames
//! aus einer Queue, ein Empfangs-Task ordnet Antworten ihren ausstehenden
//! Aufrufen zu und leitet `IceCandidateFound`-Ereignisse an die
//! registrierten Handler weiter.
//!
//! Bricht die Verbindung ab, scheitern alle ausstehenden und folgenden
//! Aufrufe mit `MediaError::Verbindung`.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use mixcast_protocol::CandidateRecord;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::jsonrpc::{
    create_params, eingang_klassifizieren, invoke_params, kandidat_von_engine,
    kandidat_zu_engine, mit_sitzung, release_params, sitzung_aus_ergebnis, subscribe_params,
    wert_als_string, Eingang, EngineEreignis, RpcAnfrage, EREIGNIS_KANDIDAT_GEFUNDEN,
};
use crate::engine::{CandidateHandler, MediaEngine};
use crate::error::{MediaError, MediaResult};
use crate::handle::{Endpoint, Mixer, MixerPort, ObjectId, Pipeline};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type AntwortSender = oneshot::Sender<Result<Value, MediaError>>;

// ---------------------------------------------------------------------------
// KurentoClient
// ---------------------------------------------------------------------------

/// Media-Engine-Client fuer Kurento (JSON-RPC 2.0 ueber WebSocket)
///
/// Clone teilt die Verbindung.
#[derive(Clone)]
pub struct KurentoClient {
    inner: Arc<KurentoInner>,
}

struct KurentoInner {
    url: String,
    tx: mpsc::UnboundedSender<Message>,
    naechste_id: AtomicU64,
    /// Ausstehende Aufrufe, indiziert nach JSON-RPC-ID
    ausstehend: DashMap<u64, AntwortSender>,
    /// Von Kurento vergebene Sitzungs-ID
    sitzung: Mutex<Option<String>>,
    /// Kandidaten-Handler, indiziert nach Endpunkt-ID
    abonnements: DashMap<String, CandidateHandler>,
    verbunden: AtomicBool,
}

/// Entfernt einen ausstehenden Aufruf, auch wenn der Aufrufer abbricht (Timeout)
struct AusstehendGuard<'a> {
    ausstehend: &'a DashMap<u64, AntwortSender>,
    id: u64,
}

impl Drop for AusstehendGuard<'_> {
    fn drop(&mut self) {
        self.ausstehend.remove(&self.id);
    }
}

impl KurentoClient {
    /// Baut die Verbindung zur Media-Engine auf
    ///
    /// Ein `ping_intervall` von null deaktiviert den Keepalive.
    pub async fn verbinden(
        url: &str,
        verbindungs_timeout: Duration,
        ping_intervall: Duration,
    ) -> MediaResult<Self> {
        let (stream, _) = tokio::time::timeout(verbindungs_timeout, connect_async(url))
            .await
            .map_err(|_| MediaError::verbindung(format!("timed out connecting to {url}")))?
            .map_err(|e| MediaError::verbindung(format!("{url}: {e}")))?;

        let (schreiber, leser) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let inner = Arc::new(KurentoInner {
            url: url.to_string(),
            tx,
            naechste_id: AtomicU64::new(1),
            ausstehend: DashMap::new(),
            sitzung: Mutex::new(None),
            abonnements: DashMap::new(),
            verbunden: AtomicBool::new(true),
        });

        tokio::spawn(sende_task(schreiber, rx));
        tokio::spawn(empfangs_task(leser, Arc::clone(&inner)));
        if !ping_intervall.is_zero() {
            tokio::spawn(ping_task(Arc::downgrade(&inner), ping_intervall));
        }

        tracing::info!(url = %url, "Verbindung zur Media-Engine hergestellt");
        Ok(Self { inner })
    }

    /// Schliesst die Verbindung zur Media-Engine
    pub fn trennen(&self) {
        let _ = self.inner.tx.send(Message::Close(None));
    }

    /// Gibt die URL der Media-Engine zurueck
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    async fn erstellen(&self, typ: &str, constructor_params: Value) -> MediaResult<ObjectId> {
        let ergebnis = self
            .inner
            .aufrufen("create", create_params(typ, constructor_params))
            .await?;
        let id = wert_als_string(&ergebnis)?;
        tracing::debug!(typ, objekt = %id, "Media-Objekt erstellt");
        Ok(ObjectId(id))
    }

    async fn ausfuehren(
        &self,
        objekt: &ObjectId,
        operation: &str,
        operation_params: Value,
    ) -> MediaResult<Value> {
        self.inner
            .aufrufen(
                "invoke",
                invoke_params(objekt.als_str(), operation, operation_params),
            )
            .await
    }
}

impl KurentoInner {
    async fn aufrufen(&self, methode: &str, params: Value) -> MediaResult<Value> {
        if !self.verbunden.load(Ordering::SeqCst) {
            return Err(MediaError::verbindung("connection to media server lost"));
        }

        let id = self.naechste_id.fetch_add(1, Ordering::SeqCst);
        let sitzung = self.sitzung.lock().clone();
        let anfrage = RpcAnfrage::neu(id, methode, mit_sitzung(params, sitzung.as_deref()));
        let text = serde_json::to_string(&anfrage)
            .map_err(|e| MediaError::ungueltige_antwort(format!("request not serializable: {e}")))?;

        let (antwort_tx, antwort_rx) = oneshot::channel();
        self.ausstehend.insert(id, antwort_tx);
        let _guard = AusstehendGuard {
            ausstehend: &self.ausstehend,
            id,
        };

        tracing::trace!(id, methode, "JSON-RPC-Anfrage");
        self.tx
            .send(Message::Text(text))
            .map_err(|_| MediaError::verbindung("send task stopped"))?;

        let ergebnis = antwort_rx
            .await
            .map_err(|_| MediaError::verbindung("connection lost during call"))??;

        if let Some(neue_sitzung) = sitzung_aus_ergebnis(&ergebnis) {
            let mut sitzung = self.sitzung.lock();
            if sitzung.is_none() {
                *sitzung = Some(neue_sitzung);
            }
        }

        Ok(ergebnis)
    }

    fn eingang_verarbeiten(&self, text: &str) {
        match eingang_klassifizieren(text) {
            Ok(Eingang::Antwort { id, ergebnis }) => match self.ausstehend.remove(&id) {
                Some((_, tx)) => {
                    let _ = tx.send(ergebnis.map_err(MediaError::from));
                }
                None => tracing::debug!(id, "Antwort ohne ausstehenden Aufruf verworfen"),
            },
            Ok(Eingang::Ereignis(ereignis)) => self.ereignis_verarbeiten(ereignis),
            Ok(Eingang::Sonstiges) => tracing::trace!("Unbekannte Nachricht der Media-Engine"),
            Err(e) => tracing::warn!(fehler = %e, "Ungueltige Nachricht der Media-Engine"),
        }
    }

    fn ereignis_verarbeiten(&self, ereignis: EngineEreignis) {
        if ereignis.typ != EREIGNIS_KANDIDAT_GEFUNDEN {
            tracing::trace!(typ = %ereignis.typ, "Ereignis ignoriert");
            return;
        }

        let handler = self
            .abonnements
            .get(&ereignis.objekt)
            .map(|h| Arc::clone(h.value()));
        let Some(handler) = handler else {
            tracing::debug!(objekt = %ereignis.objekt, "Kandidat fuer nicht abonnierten Endpunkt");
            return;
        };

        match ereignis
            .daten
            .get("candidate")
            .cloned()
            .map(kandidat_von_engine)
        {
            Some(Ok(kandidat)) => handler(kandidat),
            Some(Err(e)) => {
                tracing::warn!(objekt = %ereignis.objekt, fehler = %e, "Ungueltiger Kandidat")
            }
            None => tracing::warn!(objekt = %ereignis.objekt, "Kandidaten-Ereignis ohne Kandidat"),
        }
    }

    fn alle_ausstehenden_abbrechen(&self) {
        let ids: Vec<u64> = self.ausstehend.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.ausstehend.remove(&id) {
                let _ = tx.send(Err(MediaError::verbindung(
                    "connection to media server lost",
                )));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Hintergrund-Tasks
// ---------------------------------------------------------------------------

async fn sende_task(mut schreiber: SplitSink<WsStream, Message>, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(nachricht) = rx.recv().await {
        let schliessen = matches!(nachricht, Message::Close(_));
        if let Err(e) = schreiber.send(nachricht).await {
            tracing::warn!(fehler = %e, "Senden an Media-Engine fehlgeschlagen");
            break;
        }
        if schliessen {
            break;
        }
    }
    tracing::debug!("Media-Engine Sende-Task beendet");
}

async fn empfangs_task(mut leser: SplitStream<WsStream>, inner: Arc<KurentoInner>) {
    while let Some(nachricht) = leser.next().await {
        match nachricht {
            Ok(Message::Text(text)) => inner.eingang_verarbeiten(&text),
            Ok(Message::Close(_)) => {
                tracing::info!("Media-Engine hat die Verbindung geschlossen");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(fehler = %e, "Lesefehler auf der Media-Engine-Verbindung");
                break;
            }
        }
    }

    inner.verbunden.store(false, Ordering::SeqCst);
    inner.alle_ausstehenden_abbrechen();
    tracing::error!(url = %inner.url, "Verbindung zur Media-Engine verloren");
}

async fn ping_task(inner: Weak<KurentoInner>, intervall: Duration) {
    loop {
        tokio::time::sleep(intervall).await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.verbunden.load(Ordering::SeqCst) {
            break;
        }
        let ping = inner.aufrufen("ping", json!({ "interval": intervall.as_millis() as u64 }));
        match tokio::time::timeout(intervall, ping).await {
            Ok(Ok(_)) => tracing::trace!("Media-Engine Ping beantwortet"),
            Ok(Err(e)) => tracing::warn!(fehler = %e, "Media-Engine Ping fehlgeschlagen"),
            Err(_) => tracing::warn!("Media-Engine Ping unbeantwortet"),
        }
    }
}

// ---------------------------------------------------------------------------
// MediaEngine-Implementierung
// ---------------------------------------------------------------------------

#[async_trait]
impl MediaEngine for KurentoClient {
    async fn pipeline_erstellen(&self) -> MediaResult<Pipeline> {
        Ok(Pipeline::neu(self.erstellen("MediaPipeline", json!({})).await?))
    }

    async fn mixer_erstellen(&self, pipeline: &Pipeline) -> MediaResult<Mixer> {
        let id = self
            .erstellen("Composite", json!({ "mediaPipeline": pipeline.id().als_str() }))
            .await?;
        Ok(Mixer::neu(id))
    }

    async fn endpoint_erstellen(&self, pipeline: &Pipeline) -> MediaResult<Endpoint> {
        let id = self
            .erstellen(
                "WebRtcEndpoint",
                json!({ "mediaPipeline": pipeline.id().als_str() }),
            )
            .await?;
        Ok(Endpoint::neu(id))
    }

    async fn mixer_port_erstellen(&self, mixer: &Mixer) -> MediaResult<MixerPort> {
        let id = self
            .erstellen("HubPort", json!({ "hub": mixer.id().als_str() }))
            .await?;
        Ok(MixerPort::neu(id))
    }

    async fn verbinden(&self, quelle: &ObjectId, ziel: &ObjectId) -> MediaResult<()> {
        self.ausfuehren(quelle, "connect", json!({ "sink": ziel.als_str() }))
            .await?;
        Ok(())
    }

    async fn angebot_verarbeiten(
        &self,
        endpoint: &Endpoint,
        sdp_offer: &str,
    ) -> MediaResult<String> {
        let ergebnis = self
            .ausfuehren(endpoint.id(), "processOffer", json!({ "offer": sdp_offer }))
            .await?;
        wert_als_string(&ergebnis)
    }

    async fn kandidaten_sammeln(&self, endpoint: &Endpoint) -> MediaResult<()> {
        self.ausfuehren(endpoint.id(), "gatherCandidates", json!({}))
            .await?;
        Ok(())
    }

    async fn kandidat_hinzufuegen(
        &self,
        endpoint: &Endpoint,
        kandidat: CandidateRecord,
    ) -> MediaResult<()> {
        self.ausfuehren(
            endpoint.id(),
            "addIceCandidate",
            json!({ "candidate": kandidat_zu_engine(&kandidat) }),
        )
        .await?;
        Ok(())
    }

    async fn freigeben(&self, objekt: &ObjectId) -> MediaResult<()> {
        self.inner.abonnements.remove(objekt.als_str());
        self.inner
            .aufrufen("release", release_params(objekt.als_str()))
            .await?;
        tracing::debug!(objekt = %objekt, "Media-Objekt freigegeben");
        Ok(())
    }

    async fn kandidaten_abonnieren(
        &self,
        endpoint: &Endpoint,
        handler: CandidateHandler,
    ) -> MediaResult<()> {
        // Handler vor dem Subscribe registrieren, damit kein fruehes Ereignis verloren geht
        self.inner
            .abonnements
            .insert(endpoint.id().als_str().to_string(), handler);

        let ergebnis = self
            .inner
            .aufrufen(
                "subscribe",
                subscribe_params(endpoint.id().als_str(), EREIGNIS_KANDIDAT_GEFUNDEN),
            )
            .await;

        if let Err(e) = ergebnis {
            self.inner.abonnements.remove(endpoint.id().als_str());
            return Err(e);
        }
        Ok(())
    }

    fn ist_verbunden(&self) -> bool {
        self.inner.verbunden.load(Ordering::SeqCst)
    }
}
