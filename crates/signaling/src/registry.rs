//! Session-Registry – Rollen und Media-Handles aller Sitzungen
//!
//! Presenter- und Viewer-Eintraege liegen in getrennten Maps; eine
//! `SessionId` steht hoechstens in einer davon. Der Kandidaten-Puffer liegt
//! unter derselben Sperre, damit ein Kandidat entweder gepuffert oder
//! direkt angewendet wird, nie beides und nie keins.
//!
//! ## Phasen
//! ```text
//! (nicht registriert) --beginnen--> Ausstehend --abschliessen--> Bereit
//!                                       |                          |
//!                           stop: vormerken               stop: entfernen
//! ```
//!
//! Jede Verhandlung traegt einen `Versuch`. Beginnt eine Sitzung neu, waehrend
//! ihr gestoppter Vorgaenger noch auf einen Engine-Aufruf wartet, wird der
//! alte Eintrag abgeloest: er wandert unter seinem Versuch in eine eigene
//! Map und wird von seiner Verhandlung abgebaut, sobald sie zurueckkehrt.
//!
//! Die Sperre ist ein `parking_lot::Mutex` und wird nie ueber ein `.await`
//! gehalten.

use mixcast_core::{Rolle, SessionId};
use mixcast_media::{Endpoint, MixerPort};
use mixcast_protocol::CandidateRecord;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::candidates::CandidateBuffer;
use crate::error::{SignalingError, SignalingResult};

// ---------------------------------------------------------------------------
// Eintraege
// ---------------------------------------------------------------------------

/// Kennung einer einzelnen Verhandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Versuch(pub u64);

/// Phase einer Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Verhandlung laeuft
    Ausstehend,
    /// Verhandlung abgeschlossen
    Bereit,
}

/// Zustand einer verhandelnden oder aktiven Sitzung
#[derive(Debug)]
pub struct SessionEintrag {
    pub versuch: Versuch,
    pub rolle: Rolle,
    pub phase: SessionPhase,
    /// Stop kam waehrend der Verhandlung
    pub stop_vorgemerkt: bool,
    pub endpoint: Option<Endpoint>,
    pub port: Option<MixerPort>,
    /// Gepufferte Kandidaten sind abgearbeitet, neue gehen direkt an den Endpunkt
    pub endpoint_bereit: bool,
}

impl SessionEintrag {
    fn neu(versuch: Versuch, rolle: Rolle) -> Self {
        Self {
            versuch,
            rolle,
            phase: SessionPhase::Ausstehend,
            stop_vorgemerkt: false,
            endpoint: None,
            port: None,
            endpoint_bereit: false,
        }
    }
}

/// Wohin ein eingereichter Kandidat geht
#[derive(Debug)]
pub enum KandidatZiel {
    /// Endpunkt ist bereit, Kandidat sofort anwenden
    Anwenden(Endpoint, CandidateRecord),
    /// Kandidat wurde gepuffert
    Gepuffert,
}

/// Ergebnis einer Stop-Anforderung
#[derive(Debug)]
pub enum StopAktion {
    /// Verhandlung laeuft noch, Abbau erfolgt durch die Verhandlung selbst
    Vorgemerkt,
    /// Eintrag wurde entfernt, Handles muessen freigegeben werden
    Abbauen(SessionEintrag),
    /// Keine Sitzung (nie verhandelt oder bereits abgebaut)
    Nichts,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryInner {
    presenter: HashMap<SessionId, SessionEintrag>,
    viewer: HashMap<SessionId, SessionEintrag>,
    /// Gestoppte Verhandlungen, deren Sitzung bereits neu begonnen hat
    abgeloest: HashMap<Versuch, SessionEintrag>,
    kandidaten: CandidateBuffer,
    letzter_versuch: u64,
}

impl RegistryInner {
    /// Sucht den Eintrag, Presenter zuerst
    fn eintrag_mut(&mut self, id: SessionId) -> Option<&mut SessionEintrag> {
        if self.presenter.contains_key(&id) {
            self.presenter.get_mut(&id)
        } else {
            self.viewer.get_mut(&id)
        }
    }

    fn eintrag(&self, id: SessionId) -> Option<&SessionEintrag> {
        self.presenter.get(&id).or_else(|| self.viewer.get(&id))
    }

    fn entfernen(&mut self, id: SessionId) -> Option<SessionEintrag> {
        self.kandidaten.entfernen(id);
        self.presenter
            .remove(&id)
            .or_else(|| self.viewer.remove(&id))
    }

    /// Eintrag einer bestimmten Verhandlung, aktuell oder abgeloest
    fn verhandlung_mut(&mut self, id: SessionId, versuch: Versuch) -> Option<&mut SessionEintrag> {
        let aktuell = self.eintrag(id).is_some_and(|e| e.versuch == versuch);
        if aktuell {
            self.eintrag_mut(id)
        } else {
            self.abgeloest.get_mut(&versuch)
        }
    }

    fn laufend_mut(
        &mut self,
        id: SessionId,
        versuch: Versuch,
    ) -> SignalingResult<&mut SessionEintrag> {
        match self.verhandlung_mut(id, versuch) {
            Some(e) if !e.stop_vorgemerkt => Ok(e),
            _ => Err(SignalingError::SitzungGestoppt),
        }
    }
}

/// Autoritative Zuordnung Sitzung -> Rolle und Media-Handles
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert eine Sitzung mit ausstehender Verhandlung
    ///
    /// Schlaegt fehl, wenn die Sitzung bereits eine Rolle hat. Ein Eintrag
    /// mit vorgemerktem Stop zaehlt nicht mehr und wird abgeloest.
    pub fn ausstehend_registrieren(&self, id: SessionId, rolle: Rolle) -> SignalingResult<Versuch> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let vorhanden = inner.eintrag(id).map(|e| (e.rolle, e.stop_vorgemerkt));
        match vorhanden {
            Some((festgelegt, false)) => {
                return Err(SignalingError::RolleBereitsFestgelegt(festgelegt));
            }
            Some((_, true)) => {
                let alt = inner
                    .presenter
                    .remove(&id)
                    .or_else(|| inner.viewer.remove(&id));
                if let Some(alt) = alt {
                    tracing::debug!(session_id = %id, versuch = alt.versuch.0, "Gestoppte Verhandlung abgeloest");
                    inner.abgeloest.insert(alt.versuch, alt);
                }
            }
            None => {}
        }

        inner.letzter_versuch += 1;
        let versuch = Versuch(inner.letzter_versuch);
        let eintrag = SessionEintrag::neu(versuch, rolle);
        match rolle {
            Rolle::Presenter => inner.presenter.insert(id, eintrag),
            Rolle::Viewer => inner.viewer.insert(id, eintrag),
        };
        Ok(versuch)
    }

    /// Traegt den erstellten Endpunkt ein
    ///
    /// Der Endpunkt wird auch bei vorgemerktem Stop eingetragen, damit der
    /// anschliessende Abbau ihn freigibt. Der Fehler signalisiert den Abbruch.
    pub fn endpoint_setzen(
        &self,
        id: SessionId,
        versuch: Versuch,
        endpoint: Endpoint,
    ) -> SignalingResult<()> {
        let mut inner = self.inner.lock();
        let eintrag = inner
            .verhandlung_mut(id, versuch)
            .ok_or(SignalingError::SitzungGestoppt)?;
        eintrag.endpoint = Some(endpoint);
        if eintrag.stop_vorgemerkt {
            return Err(SignalingError::SitzungGestoppt);
        }
        Ok(())
    }

    /// Traegt den erstellten Mixer-Port ein (gleiche Semantik wie `endpoint_setzen`)
    pub fn port_setzen(
        &self,
        id: SessionId,
        versuch: Versuch,
        port: MixerPort,
    ) -> SignalingResult<()> {
        let mut inner = self.inner.lock();
        let eintrag = inner
            .verhandlung_mut(id, versuch)
            .ok_or(SignalingError::SitzungGestoppt)?;
        eintrag.port = Some(port);
        if eintrag.stop_vorgemerkt {
            return Err(SignalingError::SitzungGestoppt);
        }
        Ok(())
    }

    /// Prueft ob die Verhandlung fortgesetzt werden darf
    pub fn stop_pruefen(&self, id: SessionId, versuch: Versuch) -> SignalingResult<()> {
        self.inner.lock().laufend_mut(id, versuch).map(|_| ())
    }

    /// Entnimmt den naechsten gepufferten Kandidaten
    ///
    /// Ist der Puffer leer, wird der Endpunkt als bereit markiert und der
    /// Puffer-Eintrag geloescht; ab dann gehen Kandidaten direkt an den Endpunkt.
    pub fn naechster_gepufferter_kandidat(
        &self,
        id: SessionId,
        versuch: Versuch,
    ) -> SignalingResult<Option<CandidateRecord>> {
        let mut inner = self.inner.lock();
        inner.laufend_mut(id, versuch)?;

        if let Some(kandidat) = inner.kandidaten.entnehmen(id) {
            return Ok(Some(kandidat));
        }

        inner.kandidaten.entfernen(id);
        inner.laufend_mut(id, versuch)?.endpoint_bereit = true;
        Ok(None)
    }

    /// Leitet einen Kandidaten an den Endpunkt weiter oder puffert ihn
    pub fn kandidat_einreichen(&self, id: SessionId, kandidat: CandidateRecord) -> KandidatZiel {
        let mut inner = self.inner.lock();
        let bereit = inner
            .eintrag(id)
            .filter(|e| e.endpoint_bereit && !e.stop_vorgemerkt)
            .and_then(|e| e.endpoint.clone());

        match bereit {
            Some(endpoint) => KandidatZiel::Anwenden(endpoint, kandidat),
            None => {
                inner.kandidaten.anhaengen(id, kandidat);
                KandidatZiel::Gepuffert
            }
        }
    }

    /// Schliesst die Verhandlung ab (Phase `Bereit`)
    pub fn abschliessen(&self, id: SessionId, versuch: Versuch) -> SignalingResult<()> {
        let mut inner = self.inner.lock();
        inner.laufend_mut(id, versuch)?.phase = SessionPhase::Bereit;
        Ok(())
    }

    /// Fordert den Abbau einer Sitzung an
    ///
    /// Der Kandidaten-Puffer der Sitzung wird in jedem Fall geloescht.
    pub fn stop_anfordern(&self, id: SessionId) -> StopAktion {
        let mut inner = self.inner.lock();
        inner.kandidaten.entfernen(id);

        match inner.eintrag(id).map(|e| e.phase) {
            Some(SessionPhase::Ausstehend) => {
                if let Some(eintrag) = inner.eintrag_mut(id) {
                    eintrag.stop_vorgemerkt = true;
                }
                StopAktion::Vorgemerkt
            }
            Some(SessionPhase::Bereit) => inner
                .entfernen(id)
                .map_or(StopAktion::Nichts, StopAktion::Abbauen),
            None => StopAktion::Nichts,
        }
    }

    /// Entfernt den Eintrag einer Verhandlung unabhaengig von ihrer Phase
    ///
    /// Ein abgeloester Eintrag wird entfernt, ohne die neue Verhandlung
    /// derselben Sitzung oder deren Kandidaten-Puffer zu beruehren.
    pub fn verhandlung_entfernen(&self, id: SessionId, versuch: Versuch) -> Option<SessionEintrag> {
        let mut inner = self.inner.lock();
        if inner.eintrag(id).is_some_and(|e| e.versuch == versuch) {
            inner.entfernen(id)
        } else {
            inner.abgeloest.remove(&versuch)
        }
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    /// Rolle einer Sitzung
    pub fn rolle(&self, id: SessionId) -> Option<Rolle> {
        self.inner.lock().eintrag(id).map(|e| e.rolle)
    }

    /// Rolle einer Sitzung, sofern sie nicht bereits gestoppt wurde
    pub fn aktive_rolle(&self, id: SessionId) -> Option<Rolle> {
        self.inner
            .lock()
            .eintrag(id)
            .filter(|e| !e.stop_vorgemerkt)
            .map(|e| e.rolle)
    }

    /// Phase einer Sitzung
    pub fn phase(&self, id: SessionId) -> Option<SessionPhase> {
        self.inner.lock().eintrag(id).map(|e| e.phase)
    }

    /// Prueft ob die Sitzung im Presenter-Zustand eingetragen ist
    pub fn ist_presenter(&self, id: SessionId) -> bool {
        self.inner.lock().presenter.contains_key(&id)
    }

    /// Prueft ob die Sitzung in der Viewer-Registry steht
    pub fn ist_viewer(&self, id: SessionId) -> bool {
        self.inner.lock().viewer.contains_key(&id)
    }

    /// Endpunkt einer Sitzung
    pub fn endpoint(&self, id: SessionId) -> Option<Endpoint> {
        self.inner
            .lock()
            .eintrag(id)
            .and_then(|e| e.endpoint.clone())
    }

    /// Mixer-Port einer Sitzung
    pub fn port(&self, id: SessionId) -> Option<MixerPort> {
        self.inner.lock().eintrag(id).and_then(|e| e.port.clone())
    }

    /// Anzahl der Presenter-Eintraege (alle Phasen)
    pub fn presenter_anzahl(&self) -> usize {
        self.inner.lock().presenter.len()
    }

    /// Anzahl der Viewer-Eintraege (alle Phasen)
    pub fn viewer_anzahl(&self) -> usize {
        self.inner.lock().viewer.len()
    }

    /// Anzahl abgeloester Verhandlungen, deren Abbau noch aussteht
    pub fn abgeloeste_anzahl(&self) -> usize {
        self.inner.lock().abgeloest.len()
    }

    /// Anzahl gepufferter Kandidaten einer Sitzung
    pub fn gepufferte_kandidaten(&self, id: SessionId) -> usize {
        self.inner.lock().kandidaten.anzahl(id)
    }

    /// Prueft ob fuer die Sitzung ein Puffer-Eintrag existiert
    pub fn hat_puffer(&self, id: SessionId) -> bool {
        self.inner.lock().kandidaten.hat_eintrag(id)
    }

    /// Alle registrierten Sitzungen
    pub fn sitzungen(&self) -> Vec<SessionId> {
        let inner = self.inner.lock();
        inner
            .presenter
            .keys()
            .chain(inner.viewer.keys())
            .copied()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kandidat(n: u32) -> CandidateRecord {
        CandidateRecord::neu(format!("candidate:{n}"), None, None)
    }

    #[test]
    fn rolle_wird_nur_einmal_festgelegt() {
        let registry = SessionRegistry::neu();
        let id = SessionId(1);
        registry.ausstehend_registrieren(id, Rolle::Presenter).unwrap();

        let err = registry
            .ausstehend_registrieren(id, Rolle::Viewer)
            .unwrap_err();
        assert!(matches!(
            err,
            SignalingError::RolleBereitsFestgelegt(Rolle::Presenter)
        ));
        assert!(registry.ist_presenter(id));
        assert!(!registry.ist_viewer(id));
    }

    #[test]
    fn kandidaten_vor_endpunkt_werden_gepuffert() {
        let registry = SessionRegistry::neu();
        let id = SessionId(2);

        assert!(matches!(
            registry.kandidat_einreichen(id, kandidat(1)),
            KandidatZiel::Gepuffert
        ));
        let versuch = registry.ausstehend_registrieren(id, Rolle::Viewer).unwrap();
        registry.endpoint_setzen(id, versuch, Endpoint::neu("ep")).unwrap();
        assert!(matches!(
            registry.kandidat_einreichen(id, kandidat(2)),
            KandidatZiel::Gepuffert
        ));
        assert_eq!(registry.gepufferte_kandidaten(id), 2);
    }

    #[test]
    fn puffer_leeren_markiert_endpunkt_bereit() {
        let registry = SessionRegistry::neu();
        let id = SessionId(3);
        registry.kandidat_einreichen(id, kandidat(1));
        let versuch = registry.ausstehend_registrieren(id, Rolle::Presenter).unwrap();
        registry.endpoint_setzen(id, versuch, Endpoint::neu("ep")).unwrap();

        let erster = registry.naechster_gepufferter_kandidat(id, versuch).unwrap();
        assert_eq!(erster.map(|k| k.candidate).as_deref(), Some("candidate:1"));
        assert!(registry
            .naechster_gepufferter_kandidat(id, versuch)
            .unwrap()
            .is_none());
        assert!(!registry.hat_puffer(id));

        match registry.kandidat_einreichen(id, kandidat(2)) {
            KandidatZiel::Anwenden(endpoint, k) => {
                assert_eq!(endpoint.id().als_str(), "ep");
                assert_eq!(k.candidate, "candidate:2");
            }
            KandidatZiel::Gepuffert => panic!("Endpunkt ist bereit"),
        }
    }

    #[test]
    fn stop_waehrend_verhandlung_wird_vorgemerkt() {
        let registry = SessionRegistry::neu();
        let id = SessionId(4);
        let versuch = registry.ausstehend_registrieren(id, Rolle::Presenter).unwrap();
        registry.kandidat_einreichen(id, kandidat(1));

        assert!(matches!(registry.stop_anfordern(id), StopAktion::Vorgemerkt));
        assert!(!registry.hat_puffer(id));
        assert!(matches!(
            registry.stop_pruefen(id, versuch),
            Err(SignalingError::SitzungGestoppt)
        ));
        assert!(registry.aktive_rolle(id).is_none());

        // Endpunkt wird trotzdem eingetragen, damit der Abbau ihn findet
        assert!(registry
            .endpoint_setzen(id, versuch, Endpoint::neu("ep"))
            .is_err());
        let eintrag = registry.verhandlung_entfernen(id, versuch).unwrap();
        assert_eq!(eintrag.endpoint.map(|e| e.id().to_string()).as_deref(), Some("ep"));
    }

    #[test]
    fn stop_auf_bereite_sitzung_entfernt_eintrag() {
        let registry = SessionRegistry::neu();
        let id = SessionId(5);
        let versuch = registry.ausstehend_registrieren(id, Rolle::Viewer).unwrap();
        registry.endpoint_setzen(id, versuch, Endpoint::neu("ep")).unwrap();
        registry
            .port_setzen(id, versuch, MixerPort::neu("port"))
            .unwrap();
        registry.abschliessen(id, versuch).unwrap();

        let StopAktion::Abbauen(eintrag) = registry.stop_anfordern(id) else {
            panic!("Erwartet Abbau");
        };
        assert_eq!(eintrag.rolle, Rolle::Viewer);
        assert!(eintrag.port.is_some());
        assert!(!registry.ist_viewer(id));
        assert!(matches!(registry.stop_anfordern(id), StopAktion::Nichts));
    }

    #[test]
    fn stop_ohne_sitzung_loescht_puffer() {
        let registry = SessionRegistry::neu();
        let id = SessionId(6);
        registry.kandidat_einreichen(id, kandidat(1));
        assert!(matches!(registry.stop_anfordern(id), StopAktion::Nichts));
        assert!(!registry.hat_puffer(id));
    }

    #[test]
    fn neubeginn_nach_stop_loest_alte_verhandlung_ab() {
        let registry = SessionRegistry::neu();
        let id = SessionId(7);
        let alt = registry.ausstehend_registrieren(id, Rolle::Presenter).unwrap();
        assert!(matches!(registry.stop_anfordern(id), StopAktion::Vorgemerkt));

        let neu = registry.ausstehend_registrieren(id, Rolle::Viewer).unwrap();
        assert_ne!(alt, neu);
        assert_eq!(registry.abgeloeste_anzahl(), 1);
        assert_eq!(registry.aktive_rolle(id), Some(Rolle::Viewer));
        assert!(!registry.ist_presenter(id));

        // Die alte Verhandlung sieht nur ihren eigenen, gestoppten Eintrag
        assert!(registry
            .endpoint_setzen(id, alt, Endpoint::neu("ep-alt"))
            .is_err());
        registry
            .endpoint_setzen(id, neu, Endpoint::neu("ep-neu"))
            .unwrap();
        registry.kandidat_einreichen(id, kandidat(1));

        let alter_eintrag = registry.verhandlung_entfernen(id, alt).unwrap();
        assert_eq!(
            alter_eintrag.endpoint.map(|e| e.id().to_string()).as_deref(),
            Some("ep-alt")
        );
        assert_eq!(registry.abgeloeste_anzahl(), 0);
        assert_eq!(registry.gepufferte_kandidaten(id), 1);
        assert_eq!(
            registry.endpoint(id).map(|e| e.id().to_string()).as_deref(),
            Some("ep-neu")
        );
    }
}
