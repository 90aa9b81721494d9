//! MockEngine – In-Memory Media-Engine fuer Tests
//!
//! Erzeugt Objekte mit fortlaufenden IDs, fuehrt ein Journal aller Aufrufe
//! und erkennt doppelte Freigaben. Fehler koennen pro Operation injiziert
//! werden, `angebot_verarbeiten` kann angehalten werden um laufende
//! Verhandlungen zu simulieren.
//!
//! Jeder Aufruf gibt die Kontrolle einmal an den Scheduler ab, damit
//! nebenlaeufige Sitzungen sich wie gegen eine echte Engine verschraenken.

use async_trait::async_trait;
use mixcast_protocol::CandidateRecord;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

use crate::engine::{CandidateHandler, MediaEngine};
use crate::error::{MediaError, MediaResult};
use crate::handle::{Endpoint, Mixer, MixerPort, ObjectId, Pipeline};

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Art einer Operation (fuer Fehlerinjektion und Zaehlung)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PipelineErstellen,
    MixerErstellen,
    EndpointErstellen,
    MixerPortErstellen,
    Verbinden,
    AngebotVerarbeiten,
    KandidatenSammeln,
    KandidatHinzufuegen,
    Freigeben,
    KandidatenAbonnieren,
}

/// Ein aufgezeichneter Aufruf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAufruf {
    PipelineErstellen,
    MixerErstellen { pipeline: ObjectId },
    EndpointErstellen { pipeline: ObjectId },
    MixerPortErstellen { mixer: ObjectId },
    Verbinden { quelle: ObjectId, ziel: ObjectId },
    AngebotVerarbeiten { endpoint: ObjectId },
    KandidatenSammeln { endpoint: ObjectId },
    KandidatHinzufuegen { endpoint: ObjectId, kandidat: String },
    Freigeben { objekt: ObjectId },
    KandidatenAbonnieren { endpoint: ObjectId },
}

impl EngineAufruf {
    /// Ordnet den Aufruf seiner Operation zu
    pub fn operation(&self) -> Operation {
        match self {
            Self::PipelineErstellen => Operation::PipelineErstellen,
            Self::MixerErstellen { .. } => Operation::MixerErstellen,
            Self::EndpointErstellen { .. } => Operation::EndpointErstellen,
            Self::MixerPortErstellen { .. } => Operation::MixerPortErstellen,
            Self::Verbinden { .. } => Operation::Verbinden,
            Self::AngebotVerarbeiten { .. } => Operation::AngebotVerarbeiten,
            Self::KandidatenSammeln { .. } => Operation::KandidatenSammeln,
            Self::KandidatHinzufuegen { .. } => Operation::KandidatHinzufuegen,
            Self::Freigeben { .. } => Operation::Freigeben,
            Self::KandidatenAbonnieren { .. } => Operation::KandidatenAbonnieren,
        }
    }
}

// ---------------------------------------------------------------------------
// AngebotsSperre
// ---------------------------------------------------------------------------

/// Haelt `angebot_verarbeiten` an, bis `oeffnen` aufgerufen wird
///
/// Wird die Sperre fallengelassen ohne sie zu oeffnen, bleiben angehaltene
/// Aufrufe haengen (nuetzlich fuer Timeout-Tests).
pub struct AngebotsSperre {
    semaphore: Arc<Semaphore>,
}

impl AngebotsSperre {
    /// Laesst alle angehaltenen und zukuenftigen Aufrufe passieren
    pub fn oeffnen(&self) {
        self.semaphore.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

// ---------------------------------------------------------------------------
// MockEngine
// ---------------------------------------------------------------------------

/// In-Memory Media-Engine
///
/// Clone teilt den inneren Zustand, sodass Tests die Engine an den
/// Signaling-Kern uebergeben und trotzdem weiter beobachten koennen.
#[derive(Clone, Default)]
pub struct MockEngine {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    zaehler: AtomicU64,
    journal: Mutex<Vec<EngineAufruf>>,
    /// Lebende Objekte mit ihrem Typnamen
    lebend: Mutex<HashMap<ObjectId, &'static str>>,
    doppelte_freigaben: AtomicUsize,
    /// Verbleibende injizierte Fehler pro Operation
    fehler: Mutex<HashMap<Operation, usize>>,
    handler: Mutex<HashMap<ObjectId, CandidateHandler>>,
    angebot_sperre: Mutex<Option<Arc<Semaphore>>>,
    angebot_erreicht: Notify,
}

impl MockEngine {
    /// Erstellt eine neue, leere MockEngine
    pub fn neu() -> Self {
        Self::default()
    }

    /// Laesst die naechsten `anzahl` Aufrufe von `operation` fehlschlagen
    pub fn fehlschlagen_lassen(&self, operation: Operation, anzahl: usize) {
        *self.inner.fehler.lock().entry(operation).or_insert(0) += anzahl;
    }

    /// Haelt alle folgenden `angebot_verarbeiten`-Aufrufe an
    pub fn angebot_anhalten(&self) -> AngebotsSperre {
        let semaphore = Arc::new(Semaphore::new(0));
        *self.inner.angebot_sperre.lock() = Some(Arc::clone(&semaphore));
        AngebotsSperre { semaphore }
    }

    /// Wartet bis ein `angebot_verarbeiten`-Aufruf begonnen hat
    pub async fn angebot_erreicht(&self) {
        self.inner.angebot_erreicht.notified().await;
    }

    /// Simuliert einen von der Engine gefundenen Kandidaten
    ///
    /// Gibt `false` zurueck wenn fuer den Endpunkt kein Handler registriert ist.
    pub fn kandidat_ausloesen(&self, endpoint: &ObjectId, kandidat: CandidateRecord) -> bool {
        let handler = self.inner.handler.lock().get(endpoint).cloned();
        match handler {
            Some(h) => {
                h(kandidat);
                true
            }
            None => false,
        }
    }

    /// Kopie des Aufruf-Journals
    pub fn journal(&self) -> Vec<EngineAufruf> {
        self.inner.journal.lock().clone()
    }

    /// Anzahl der Aufrufe einer Operation
    pub fn anzahl(&self, operation: Operation) -> usize {
        self.inner
            .journal
            .lock()
            .iter()
            .filter(|a| a.operation() == operation)
            .count()
    }

    /// Anzahl lebender (nicht freigegebener) Objekte
    pub fn lebende_objekte(&self) -> usize {
        self.inner.lebend.lock().len()
    }

    /// Anzahl lebender Objekte eines Typs (`"Pipeline"`, `"Mixer"`, `"Endpoint"`, `"MixerPort"`)
    pub fn lebende_objekte_vom_typ(&self, typ: &str) -> usize {
        self.inner
            .lebend
            .lock()
            .values()
            .filter(|t| **t == typ)
            .count()
    }

    /// Prueft ob ein Objekt noch lebt
    pub fn ist_lebendig(&self, id: &ObjectId) -> bool {
        self.inner.lebend.lock().contains_key(id)
    }

    /// Anzahl der Freigaben bereits freigegebener oder unbekannter Objekte
    pub fn doppelte_freigaben(&self) -> usize {
        self.inner.doppelte_freigaben.load(Ordering::SeqCst)
    }

    /// Kandidaten die einem Endpunkt hinzugefuegt wurden, in Aufrufreihenfolge
    pub fn angewendete_kandidaten(&self, endpoint: &ObjectId) -> Vec<String> {
        self.inner
            .journal
            .lock()
            .iter()
            .filter_map(|a| match a {
                EngineAufruf::KandidatHinzufuegen {
                    endpoint: ep,
                    kandidat,
                } if ep == endpoint => Some(kandidat.clone()),
                _ => None,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Interne Helfer
    // -----------------------------------------------------------------------

    async fn aufzeichnen(&self, aufruf: EngineAufruf) -> MediaResult<()> {
        tokio::task::yield_now().await;
        let operation = aufruf.operation();
        self.inner.journal.lock().push(aufruf);

        let mut fehler = self.inner.fehler.lock();
        if let Some(verbleibend) = fehler.get_mut(&operation) {
            if *verbleibend > 0 {
                *verbleibend -= 1;
                return Err(MediaError::Rpc {
                    code: -1,
                    message: format!("injected failure: {operation:?}"),
                });
            }
        }
        Ok(())
    }

    fn objekt_anlegen(&self, typ: &'static str) -> ObjectId {
        let nr = self.inner.zaehler.fetch_add(1, Ordering::SeqCst) + 1;
        let id = ObjectId(format!("mock-{nr}/{typ}"));
        self.inner.lebend.lock().insert(id.clone(), typ);
        id
    }

    fn lebendig_pruefen(&self, id: &ObjectId) -> MediaResult<()> {
        if self.ist_lebendig(id) {
            Ok(())
        } else {
            Err(MediaError::UnbekanntesObjekt(id.to_string()))
        }
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn pipeline_erstellen(&self) -> MediaResult<Pipeline> {
        self.aufzeichnen(EngineAufruf::PipelineErstellen).await?;
        Ok(Pipeline::neu(self.objekt_anlegen("Pipeline")))
    }

    async fn mixer_erstellen(&self, pipeline: &Pipeline) -> MediaResult<Mixer> {
        self.aufzeichnen(EngineAufruf::MixerErstellen {
            pipeline: pipeline.id().clone(),
        })
        .await?;
        self.lebendig_pruefen(pipeline.id())?;
        Ok(Mixer::neu(self.objekt_anlegen("Mixer")))
    }

    async fn endpoint_erstellen(&self, pipeline: &Pipeline) -> MediaResult<Endpoint> {
        self.aufzeichnen(EngineAufruf::EndpointErstellen {
            pipeline: pipeline.id().clone(),
        })
        .await?;
        self.lebendig_pruefen(pipeline.id())?;
        Ok(Endpoint::neu(self.objekt_anlegen("Endpoint")))
    }

    async fn mixer_port_erstellen(&self, mixer: &Mixer) -> MediaResult<MixerPort> {
        self.aufzeichnen(EngineAufruf::MixerPortErstellen {
            mixer: mixer.id().clone(),
        })
        .await?;
        self.lebendig_pruefen(mixer.id())?;
        Ok(MixerPort::neu(self.objekt_anlegen("MixerPort")))
    }

    async fn verbinden(&self, quelle: &ObjectId, ziel: &ObjectId) -> MediaResult<()> {
        self.aufzeichnen(EngineAufruf::Verbinden {
            quelle: quelle.clone(),
            ziel: ziel.clone(),
        })
        .await?;
        self.lebendig_pruefen(quelle)?;
        self.lebendig_pruefen(ziel)
    }

    async fn angebot_verarbeiten(
        &self,
        endpoint: &Endpoint,
        sdp_offer: &str,
    ) -> MediaResult<String> {
        let sperre = self.inner.angebot_sperre.lock().clone();
        if let Some(semaphore) = sperre {
            self.inner.angebot_erreicht.notify_one();
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| MediaError::verbindung("offer gate closed"))?;
        }

        self.aufzeichnen(EngineAufruf::AngebotVerarbeiten {
            endpoint: endpoint.id().clone(),
        })
        .await?;
        self.lebendig_pruefen(endpoint.id())?;
        Ok(format!("answer[{}]:{}", endpoint.id(), sdp_offer))
    }

    async fn kandidaten_sammeln(&self, endpoint: &Endpoint) -> MediaResult<()> {
        self.aufzeichnen(EngineAufruf::KandidatenSammeln {
            endpoint: endpoint.id().clone(),
        })
        .await?;
        self.lebendig_pruefen(endpoint.id())
    }

    async fn kandidat_hinzufuegen(
        &self,
        endpoint: &Endpoint,
        kandidat: CandidateRecord,
    ) -> MediaResult<()> {
        self.aufzeichnen(EngineAufruf::KandidatHinzufuegen {
            endpoint: endpoint.id().clone(),
            kandidat: kandidat.candidate,
        })
        .await?;
        self.lebendig_pruefen(endpoint.id())
    }

    async fn freigeben(&self, objekt: &ObjectId) -> MediaResult<()> {
        self.aufzeichnen(EngineAufruf::Freigeben {
            objekt: objekt.clone(),
        })
        .await?;
        self.inner.handler.lock().remove(objekt);
        if self.inner.lebend.lock().remove(objekt).is_none() {
            self.inner.doppelte_freigaben.fetch_add(1, Ordering::SeqCst);
            return Err(MediaError::UnbekanntesObjekt(objekt.to_string()));
        }
        Ok(())
    }

    async fn kandidaten_abonnieren(
        &self,
        endpoint: &Endpoint,
        handler: CandidateHandler,
    ) -> MediaResult<()> {
        self.aufzeichnen(EngineAufruf::KandidatenAbonnieren {
            endpoint: endpoint.id().clone(),
        })
        .await?;
        self.lebendig_pruefen(endpoint.id())?;
        self.inner
            .handler
            .lock()
            .insert(endpoint.id().clone(), handler);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
