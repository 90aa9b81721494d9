//! BroadcastCoordinator – Zustandsmaschine des Signalings
//!
//! Fuehrt die Verhandlung einer Sitzung als lineare Folge abhaengiger
//! Engine-Aufrufe aus. Jeder erstellte Handle wird sofort in der
//! `SessionRegistry` eingetragen; schlaegt ein Schritt fehl oder kommt ein
//! Stop dazwischen, baut `abbauen` genau das ab, was bis dahin eingetragen
//! wurde.
//!
//! ## Ablauf einer Verhandlung
//! ```text
//! vorbereiten   Rolle reservieren (synchron, vor jedem .await)
//!   |
//! Mix           Presenter: holen oder erstellen / Viewer: nur lesen
//! Endpunkt      erstellen, eintragen
//! Mixer-Port    erstellen, eintragen
//! verbinden     Presenter: Endpunkt -> Port / Viewer: Port -> Endpunkt
//! Puffer        gepufferte Kandidaten in Eingangsreihenfolge anwenden
//! abonnieren    Engine-Kandidaten -> `iceCandidate` an den Client
//! Angebot       SDP-Answer erzeugen, Antwort an den Client
//! sammeln       Kandidatensuche starten
//! abschliessen  Phase `Bereit`
//! ```
//!
//! Zwischen zwei Schritten wird geprueft, ob ein Stop vorgemerkt wurde.

use mixcast_core::{Rolle, SessionId};
use mixcast_media::{CandidateHandler, MediaEngine, ObjectId};
use mixcast_observability::{MixcastMetrics, ERGEBNIS_ABGELEHNT, ERGEBNIS_ANGENOMMEN};
use mixcast_protocol::{CandidateRecord, ServerMessage};
use std::sync::Arc;

use crate::error::{SignalingError, SignalingResult};
use crate::mix::{PresenterMix, SharedMix};
use crate::outbound::OutboundRegistry;
use crate::registry::{
    KandidatZiel, SessionEintrag, SessionPhase, SessionRegistry, StopAktion, Versuch,
};

// ---------------------------------------------------------------------------
// Freigabe
// ---------------------------------------------------------------------------

/// Gibt ein Media-Objekt frei und protokolliert Fehler, statt sie weiterzugeben
pub(crate) async fn best_effort_freigeben(
    engine: &dyn MediaEngine,
    metriken: &MixcastMetrics,
    objekt: &ObjectId,
    session_id: Option<SessionId>,
) {
    if let Err(e) = engine.freigeben(objekt).await {
        metriken.release_failures_total.inc();
        match session_id {
            Some(id) => tracing::warn!(
                session_id = %id,
                objekt = %objekt,
                fehler = %e,
                "Freigabe fehlgeschlagen"
            ),
            None => tracing::warn!(objekt = %objekt, fehler = %e, "Freigabe fehlgeschlagen"),
        }
    }
}

// ---------------------------------------------------------------------------
// BroadcastCoordinator
// ---------------------------------------------------------------------------

/// Koordiniert Presenter- und Viewer-Sitzungen gegen die Media-Engine
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct BroadcastCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    engine: Arc<dyn MediaEngine>,
    registry: SessionRegistry,
    mix: PresenterMix,
    ausgang: OutboundRegistry,
    metriken: MixcastMetrics,
}

/// Eine reservierte, noch nicht ausgefuehrte Verhandlung
///
/// Entsteht synchron in `verhandlung_vorbereiten`, damit ein direkt
/// folgender Stop derselben Verbindung die Sitzung bereits vorfindet.
pub struct Verhandlung {
    coordinator: BroadcastCoordinator,
    session_id: SessionId,
    versuch: Versuch,
    rolle: Rolle,
    sdp_offer: String,
    /// Mix-Schnappschuss eines Viewers zum Zeitpunkt der Anfrage
    viewer_mix: Option<SharedMix>,
}

impl Verhandlung {
    /// Sitzung dieser Verhandlung
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Rolle dieser Verhandlung
    pub fn rolle(&self) -> Rolle {
        self.rolle
    }

    /// Fuehrt die Verhandlung aus und liefert die SDP-Answer
    ///
    /// Die Antwort an den Client (angenommen oder abgelehnt) wird dabei
    /// bereits ueber die Ausgangs-Queue verschickt.
    pub async fn ausfuehren(self) -> SignalingResult<String> {
        let Verhandlung {
            coordinator,
            session_id,
            versuch,
            rolle,
            sdp_offer,
            viewer_mix,
        } = self;

        let ergebnis = coordinator
            .aufbauen(session_id, versuch, rolle, &sdp_offer, viewer_mix)
            .await;

        if let Err(ref e) = ergebnis {
            tracing::debug!(session_id = %session_id, rolle = %rolle, fehler = %e, "Verhandlung abgebrochen");
            // Eine gestoppte Sitzung erhaelt keine Antwort mehr
            if !coordinator.abbauen(session_id, versuch).await {
                coordinator.ablehnung_melden(session_id, rolle, e);
            }
        }
        ergebnis
    }
}

impl BroadcastCoordinator {
    /// Erstellt einen neuen Coordinator
    pub fn neu(
        engine: Arc<dyn MediaEngine>,
        ausgang: OutboundRegistry,
        metriken: MixcastMetrics,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                engine,
                registry: SessionRegistry::neu(),
                mix: PresenterMix::neu(),
                ausgang,
                metriken,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Operationen
    // -----------------------------------------------------------------------

    /// Verhandelt eine Presenter-Sitzung
    pub async fn presenter_beginnen(
        &self,
        session_id: SessionId,
        sdp_offer: impl Into<String>,
    ) -> SignalingResult<String> {
        self.beginnen(session_id, Rolle::Presenter, sdp_offer.into())
            .await
    }

    /// Verhandelt eine Viewer-Sitzung
    ///
    /// Ohne aktiven Presenter wird sofort abgelehnt, ohne die Engine aufzurufen.
    pub async fn viewer_beginnen(
        &self,
        session_id: SessionId,
        sdp_offer: impl Into<String>,
    ) -> SignalingResult<String> {
        self.beginnen(session_id, Rolle::Viewer, sdp_offer.into())
            .await
    }

    async fn beginnen(
        &self,
        session_id: SessionId,
        rolle: Rolle,
        sdp_offer: String,
    ) -> SignalingResult<String> {
        self.verhandlung_vorbereiten(session_id, rolle, sdp_offer)?
            .ausfuehren()
            .await
    }

    /// Reserviert die Rolle einer Sitzung und liefert die auszufuehrende Verhandlung
    ///
    /// Laeuft vollstaendig synchron. Bei Ablehnung ist die Antwort an den
    /// Client bereits verschickt.
    pub fn verhandlung_vorbereiten(
        &self,
        session_id: SessionId,
        rolle: Rolle,
        sdp_offer: String,
    ) -> SignalingResult<Verhandlung> {
        let vorbereitet = self.reservieren(session_id, rolle);
        match vorbereitet {
            Ok((versuch, viewer_mix)) => Ok(Verhandlung {
                coordinator: self.clone(),
                session_id,
                versuch,
                rolle,
                sdp_offer,
                viewer_mix,
            }),
            Err(e) => {
                tracing::debug!(session_id = %session_id, rolle = %rolle, fehler = %e, "Verhandlung abgelehnt");
                self.ablehnung_melden(session_id, rolle, &e);
                Err(e)
            }
        }
    }

    fn reservieren(
        &self,
        session_id: SessionId,
        rolle: Rolle,
    ) -> SignalingResult<(Versuch, Option<SharedMix>)> {
        let viewer_mix = match rolle {
            Rolle::Presenter => None,
            Rolle::Viewer => {
                // Rollenkonflikt hat Vorrang vor "kein Presenter"
                if let Some(vorhanden) = self.inner.registry.aktive_rolle(session_id) {
                    return Err(SignalingError::RolleBereitsFestgelegt(vorhanden));
                }
                Some(self.inner.mix.aktuell().ok_or(SignalingError::KeinPresenter)?)
            }
        };
        let versuch = self
            .inner
            .registry
            .ausstehend_registrieren(session_id, rolle)?;
        Ok((versuch, viewer_mix))
    }

    /// Baut eine Sitzung ab (idempotent)
    ///
    /// Laeuft die Verhandlung noch, wird der Stop vorgemerkt und von der
    /// Verhandlung selbst ausgefuehrt, sobald ihr aktueller Engine-Aufruf
    /// zurueckkehrt.
    pub async fn stoppen(&self, session_id: SessionId) {
        match self.inner.registry.stop_anfordern(session_id) {
            StopAktion::Vorgemerkt => {
                tracing::debug!(session_id = %session_id, "Stop vorgemerkt – Verhandlung laeuft");
            }
            StopAktion::Abbauen(eintrag) => {
                tracing::info!(session_id = %session_id, rolle = %eintrag.rolle, "Sitzung wird gestoppt");
                self.handles_freigeben(session_id, eintrag).await;
            }
            StopAktion::Nichts => {
                tracing::trace!(session_id = %session_id, "Stop ohne aktive Sitzung");
            }
        }
    }

    /// Reicht einen ICE-Kandidaten des Clients ein
    ///
    /// Ist der Endpunkt der Sitzung bereit, wird der Kandidat sofort
    /// angewendet, sonst gepuffert.
    pub async fn kandidat_einreichen(&self, session_id: SessionId, kandidat: CandidateRecord) {
        match self.inner.registry.kandidat_einreichen(session_id, kandidat) {
            KandidatZiel::Anwenden(endpoint, kandidat) => {
                if let Err(e) = self
                    .inner
                    .engine
                    .kandidat_hinzufuegen(&endpoint, kandidat)
                    .await
                {
                    tracing::warn!(session_id = %session_id, fehler = %e, "Kandidat konnte nicht angewendet werden");
                }
            }
            KandidatZiel::Gepuffert => {
                self.inner.metriken.candidates_buffered_total.inc();
                tracing::trace!(session_id = %session_id, "Kandidat gepuffert");
            }
        }
    }

    /// Stoppt alle Sitzungen und gibt Mixer und Pipeline frei
    pub async fn herunterfahren(&self) {
        for session_id in self.inner.registry.sitzungen() {
            self.stoppen(session_id).await;
        }
        self.inner
            .mix
            .herunterfahren(self.inner.engine.as_ref(), &self.inner.metriken)
            .await;
    }

    // -----------------------------------------------------------------------
    // Zugriff
    // -----------------------------------------------------------------------

    /// Session-Registry (Rollen und Handles)
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Geteilter Mix-Zustand
    pub fn mix(&self) -> &PresenterMix {
        &self.inner.mix
    }

    /// Ausgangs-Queues der Clients
    pub fn ausgang(&self) -> &OutboundRegistry {
        &self.inner.ausgang
    }

    /// Metriken
    pub fn metriken(&self) -> &MixcastMetrics {
        &self.inner.metriken
    }

    /// Gibt an, ob die Media-Engine erreichbar ist
    pub fn engine_verbunden(&self) -> bool {
        self.inner.engine.ist_verbunden()
    }

    // -----------------------------------------------------------------------
    // Verhandlungsschritte
    // -----------------------------------------------------------------------

    async fn aufbauen(
        &self,
        session_id: SessionId,
        versuch: Versuch,
        rolle: Rolle,
        sdp_offer: &str,
        viewer_mix: Option<SharedMix>,
    ) -> SignalingResult<String> {
        let engine = self.inner.engine.as_ref();
        let registry = &self.inner.registry;

        let mix = match viewer_mix {
            Some(mix) => mix,
            None => {
                self.inner
                    .mix
                    .holen_oder_erstellen(engine, &self.inner.metriken)
                    .await?
            }
        };
        registry.stop_pruefen(session_id, versuch)?;

        let endpoint = engine.endpoint_erstellen(&mix.pipeline).await?;
        registry.endpoint_setzen(session_id, versuch, endpoint.clone())?;

        // Mix kann waehrend des Aufrufs freigegeben worden sein
        if !self.inner.mix.ist_aktuell(&mix) {
            return Err(match rolle {
                Rolle::Presenter => SignalingError::MixFreigegeben,
                Rolle::Viewer => SignalingError::KeinPresenter,
            });
        }

        let port = engine.mixer_port_erstellen(&mix.mixer).await?;
        registry.port_setzen(session_id, versuch, port.clone())?;

        match rolle {
            Rolle::Presenter => engine.verbinden(endpoint.id(), port.id()).await?,
            Rolle::Viewer => engine.verbinden(port.id(), endpoint.id()).await?,
        }
        registry.stop_pruefen(session_id, versuch)?;

        let mut angewendet = 0usize;
        while let Some(kandidat) = registry.naechster_gepufferter_kandidat(session_id, versuch)? {
            engine.kandidat_hinzufuegen(&endpoint, kandidat).await?;
            angewendet += 1;
        }
        if angewendet > 0 {
            tracing::debug!(session_id = %session_id, anzahl = angewendet, "Gepufferte Kandidaten angewendet");
        }

        engine
            .kandidaten_abonnieren(&endpoint, self.kandidaten_handler(session_id))
            .await?;
        registry.stop_pruefen(session_id, versuch)?;

        let sdp_answer = engine.angebot_verarbeiten(&endpoint, sdp_offer).await?;
        registry.stop_pruefen(session_id, versuch)?;

        // Antwort vor dem Sammeln, damit sie vor dem ersten `iceCandidate` ankommt
        self.inner.ausgang.an_session_senden(
            session_id,
            ServerMessage::angenommen(rolle, sdp_answer.clone()),
        );

        engine.kandidaten_sammeln(&endpoint).await?;
        registry.abschliessen(session_id, versuch)?;

        self.inner.metriken.aktive_aendern(rolle.als_str(), 1);
        self.inner
            .metriken
            .verhandlung_zaehlen(rolle.als_str(), ERGEBNIS_ANGENOMMEN);
        tracing::info!(
            session_id = %session_id,
            rolle = %rolle,
            endpoint = %endpoint,
            "Verhandlung abgeschlossen"
        );
        Ok(sdp_answer)
    }

    fn kandidaten_handler(&self, session_id: SessionId) -> CandidateHandler {
        let ausgang = self.inner.ausgang.clone();
        Arc::new(move |kandidat: CandidateRecord| {
            ausgang.an_session_senden(session_id, ServerMessage::ice_kandidat(kandidat));
        })
    }

    /// Entfernt die Verhandlung und gibt ihre Handles frei (nach Fehler oder vorgemerktem Stop)
    ///
    /// Gibt `true` zurueck, wenn die Sitzung gestoppt worden war.
    async fn abbauen(&self, session_id: SessionId, versuch: Versuch) -> bool {
        match self
            .inner
            .registry
            .verhandlung_entfernen(session_id, versuch)
        {
            Some(eintrag) => {
                let gestoppt = eintrag.stop_vorgemerkt;
                self.handles_freigeben(session_id, eintrag).await;
                gestoppt
            }
            None => true,
        }
    }

    /// Gibt erst den Mixer-Port, dann den Endpunkt frei
    async fn handles_freigeben(&self, session_id: SessionId, eintrag: SessionEintrag) {
        let engine = self.inner.engine.as_ref();
        let metriken = &self.inner.metriken;

        if let Some(port) = &eintrag.port {
            best_effort_freigeben(engine, metriken, port.id(), Some(session_id)).await;
        }
        if let Some(endpoint) = &eintrag.endpoint {
            best_effort_freigeben(engine, metriken, endpoint.id(), Some(session_id)).await;
        }
        if eintrag.phase == SessionPhase::Bereit {
            self.inner.metriken.aktive_aendern(eintrag.rolle.als_str(), -1);
        }
        tracing::debug!(session_id = %session_id, rolle = %eintrag.rolle, "Sitzung abgebaut");
    }

    fn ablehnung_melden(&self, session_id: SessionId, rolle: Rolle, fehler: &SignalingError) {
        if !fehler.client_melden() {
            return;
        }
        self.inner
            .metriken
            .verhandlung_zaehlen(rolle.als_str(), ERGEBNIS_ABGELEHNT);
        self.inner.ausgang.an_session_senden(
            session_id,
            ServerMessage::abgelehnt(rolle, fehler.to_string()),
        );
    }
}
