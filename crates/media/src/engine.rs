//! MediaEngine-Trait – Faehigkeiten die der Signaling-Kern benoetigt
//!
//! Jeder Aufruf ist asynchron und kann unabhaengig von anderen Aufrufen
//! fehlschlagen. Zwischen zwei nebenlaeufigen Aufrufen gibt es keine
//! Reihenfolgegarantie, solange der Aufrufer sie nicht selbst serialisiert.

use async_trait::async_trait;
use mixcast_protocol::CandidateRecord;
use std::sync::Arc;

use crate::error::MediaResult;
use crate::handle::{Endpoint, Mixer, MixerPort, ObjectId, Pipeline};

/// Callback fuer ICE-Kandidaten die die Media-Engine fuer einen Endpunkt findet
pub type CandidateHandler = Arc<dyn Fn(CandidateRecord) + Send + Sync>;

/// Schnittstelle zur Media-Engine
///
/// Implementierungen muessen `Send + Sync` sein, damit sie als
/// `Arc<dyn MediaEngine>` zwischen Verbindungs-Tasks geteilt werden koennen.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    /// Erstellt eine neue Pipeline
    async fn pipeline_erstellen(&self) -> MediaResult<Pipeline>;

    /// Erstellt einen Mixer (Compositor) in der Pipeline
    async fn mixer_erstellen(&self, pipeline: &Pipeline) -> MediaResult<Mixer>;

    /// Erstellt einen WebRTC-Endpunkt in der Pipeline
    async fn endpoint_erstellen(&self, pipeline: &Pipeline) -> MediaResult<Endpoint>;

    /// Erstellt einen Port am Mixer
    async fn mixer_port_erstellen(&self, mixer: &Mixer) -> MediaResult<MixerPort>;

    /// Verbindet den Medienausgang von `quelle` mit dem Eingang von `ziel`
    async fn verbinden(&self, quelle: &ObjectId, ziel: &ObjectId) -> MediaResult<()>;

    /// Verarbeitet ein SDP-Offer und liefert die SDP-Answer
    async fn angebot_verarbeiten(&self, endpoint: &Endpoint, sdp_offer: &str)
        -> MediaResult<String>;

    /// Startet die Kandidatensuche des Endpunkts
    async fn kandidaten_sammeln(&self, endpoint: &Endpoint) -> MediaResult<()>;

    /// Uebergibt einen Kandidaten des Clients an den Endpunkt
    async fn kandidat_hinzufuegen(
        &self,
        endpoint: &Endpoint,
        kandidat: CandidateRecord,
    ) -> MediaResult<()>;

    /// Gibt ein beliebiges Media-Objekt frei
    async fn freigeben(&self, objekt: &ObjectId) -> MediaResult<()>;

    /// Registriert einen Handler fuer vom Endpunkt gefundene Kandidaten
    async fn kandidaten_abonnieren(
        &self,
        endpoint: &Endpoint,
        handler: CandidateHandler,
    ) -> MediaResult<()>;

    /// Gibt an, ob die Verbindung zur Media-Engine besteht (fuer Health-Checks)
    fn ist_verbunden(&self) -> bool {
        true
    }
}
