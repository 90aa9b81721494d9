//! Zeitlimit pro Media-Engine-Aufruf
//!
//! `ZeitbegrenzteEngine` umhuellt eine beliebige `MediaEngine` und bricht
//! jeden Aufruf nach der konfigurierten Dauer mit `MediaError::Zeitlimit` ab.
//! Fuer den Aufrufer ist ein Timeout ein gewoehnlicher Engine-Fehler.

use async_trait::async_trait;
use mixcast_protocol::CandidateRecord;
use std::future::Future;
use std::time::Duration;

use crate::engine::{CandidateHandler, MediaEngine};
use crate::error::{MediaError, MediaResult};
use crate::handle::{Endpoint, Mixer, MixerPort, ObjectId, Pipeline};

/// Decorator der jeden Aufruf zeitlich begrenzt
pub struct ZeitbegrenzteEngine<E> {
    inner: E,
    dauer: Duration,
}

impl<E: MediaEngine> ZeitbegrenzteEngine<E> {
    /// Erstellt einen neuen Decorator
    pub fn neu(inner: E, dauer: Duration) -> Self {
        Self { inner, dauer }
    }

    /// Gibt die umhuellte Engine zurueck
    pub fn inner(&self) -> &E {
        &self.inner
    }

    async fn begrenzt<T>(
        &self,
        operation: &'static str,
        aufruf: impl Future<Output = MediaResult<T>> + Send,
    ) -> MediaResult<T> {
        match tokio::time::timeout(self.dauer, aufruf).await {
            Ok(ergebnis) => ergebnis,
            Err(_) => {
                tracing::warn!(
                    operation,
                    millis = self.dauer.as_millis() as u64,
                    "Media-Engine-Aufruf ueberschreitet Zeitlimit"
                );
                Err(MediaError::Zeitlimit {
                    operation,
                    millis: self.dauer.as_millis() as u64,
                })
            }
        }
    }
}

#[async_trait]
impl<E: MediaEngine> MediaEngine for ZeitbegrenzteEngine<E> {
    async fn pipeline_erstellen(&self) -> MediaResult<Pipeline> {
        self.begrenzt("pipeline_erstellen", self.inner.pipeline_erstellen())
            .await
    }

    async fn mixer_erstellen(&self, pipeline: &Pipeline) -> MediaResult<Mixer> {
        self.begrenzt("mixer_erstellen", self.inner.mixer_erstellen(pipeline))
            .await
    }

    async fn endpoint_erstellen(&self, pipeline: &Pipeline) -> MediaResult<Endpoint> {
        self.begrenzt("endpoint_erstellen", self.inner.endpoint_erstellen(pipeline))
            .await
    }

    async fn mixer_port_erstellen(&self, mixer: &Mixer) -> MediaResult<MixerPort> {
        self.begrenzt("mixer_port_erstellen", self.inner.mixer_port_erstellen(mixer))
            .await
    }

    async fn verbinden(&self, quelle: &ObjectId, ziel: &ObjectId) -> MediaResult<()> {
        self.begrenzt("verbinden", self.inner.verbinden(quelle, ziel))
            .await
    }

    async fn angebot_verarbeiten(
        &self,
        endpoint: &Endpoint,
        sdp_offer: &str,
    ) -> MediaResult<String> {
        self.begrenzt(
            "angebot_verarbeiten",
            self.inner.angebot_verarbeiten(endpoint, sdp_offer),
        )
        .await
    }

    async fn kandidaten_sammeln(&self, endpoint: &Endpoint) -> MediaResult<()> {
        self.begrenzt("kandidaten_sammeln", self.inner.kandidaten_sammeln(endpoint))
            .await
    }

    async fn kandidat_hinzufuegen(
        &self,
        endpoint: &Endpoint,
        kandidat: CandidateRecord,
    ) -> MediaResult<()> {
        self.begrenzt(
            "kandidat_hinzufuegen",
            self.inner.kandidat_hinzufuegen(endpoint, kandidat),
        )
        .await
    }

    async fn freigeben(&self, objekt: &ObjectId) -> MediaResult<()> {
        self.begrenzt("freigeben", self.inner.freigeben(objekt)).await
    }

    async fn kandidaten_abonnieren(
        &self,
        endpoint: &Endpoint,
        handler: CandidateHandler,
    ) -> MediaResult<()> {
        self.begrenzt(
            "kandidaten_abonnieren",
            self.inner.kandidaten_abonnieren(endpoint, handler),
        )
        .await
    }

    fn ist_verbunden(&self) -> bool {
        self.inner.ist_verbunden()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;

    #[tokio::test]
    async fn schneller_aufruf_passiert() {
        let engine = ZeitbegrenzteEngine::neu(MockEngine::neu(), Duration::from_secs(5));
        let pipeline = engine.pipeline_erstellen().await.unwrap();
        assert!(engine.inner().ist_lebendig(pipeline.id()));
    }

    #[tokio::test]
    async fn haengender_aufruf_wird_abgebrochen() {
        let mock = MockEngine::neu();
        let _sperre = mock.angebot_anhalten();
        let engine = ZeitbegrenzteEngine::neu(mock, Duration::from_millis(20));

        let pipeline = engine.pipeline_erstellen().await.unwrap();
        let endpoint = engine.endpoint_erstellen(&pipeline).await.unwrap();
        let err = engine
            .angebot_verarbeiten(&endpoint, "offer")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MediaError::Zeitlimit {
                operation: "angebot_verarbeiten",
                millis: 20
            }
        ));
    }
}
