//! Geteilter Mix-Zustand – eine Pipeline und ein Mixer pro Prozess
//!
//! Beide Objekte werden bei der ersten Presenter-Verhandlung angelegt und
//! von allen folgenden Sitzungen geteilt. Die Erstellung laeuft unter einem
//! `tokio::sync::Mutex`, sodass nebenlaeufige Presenter auf dieselbe
//! Erstellung warten statt eigene Objekte anzulegen.
//!
//! Viewer lesen nur den Schnappschuss `aktuell` und warten nie auf eine
//! laufende Erstellung.

use mixcast_media::{MediaEngine, MediaResult, Mixer, Pipeline};
use mixcast_observability::MixcastMetrics;
use parking_lot::Mutex;

use crate::coordinator::best_effort_freigeben;

/// Pipeline und Mixer des Prozesses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedMix {
    pub pipeline: Pipeline,
    pub mixer: Mixer,
}

/// Verwaltet die einmalige Erstellung von Pipeline und Mixer
#[derive(Default)]
pub struct PresenterMix {
    init: tokio::sync::Mutex<Option<SharedMix>>,
    aktuell: Mutex<Option<SharedMix>>,
}

impl PresenterMix {
    /// Erstellt einen leeren Mix-Zustand
    pub fn neu() -> Self {
        Self::default()
    }

    /// Liefert den bestehenden Mix oder erstellt ihn
    ///
    /// Schlaegt die Mixer-Erstellung fehl, wird die bereits erstellte
    /// Pipeline wieder freigegeben; der naechste Aufrufer versucht es erneut.
    pub async fn holen_oder_erstellen(
        &self,
        engine: &dyn MediaEngine,
        metriken: &MixcastMetrics,
    ) -> MediaResult<SharedMix> {
        let mut init = self.init.lock().await;
        if let Some(mix) = init.as_ref() {
            return Ok(mix.clone());
        }

        let pipeline = engine.pipeline_erstellen().await?;
        let mixer = match engine.mixer_erstellen(&pipeline).await {
            Ok(mixer) => mixer,
            Err(e) => {
                best_effort_freigeben(engine, metriken, pipeline.id(), None).await;
                return Err(e);
            }
        };

        let mix = SharedMix { pipeline, mixer };
        *init = Some(mix.clone());
        *self.aktuell.lock() = Some(mix.clone());

        tracing::info!(
            pipeline = %mix.pipeline,
            mixer = %mix.mixer,
            "Pipeline und Mixer erstellt"
        );
        Ok(mix)
    }

    /// Schnappschuss des aktuellen Mix (ohne zu warten)
    pub fn aktuell(&self) -> Option<SharedMix> {
        self.aktuell.lock().clone()
    }

    /// Prueft ob `mix` noch der aktive Mix ist
    pub fn ist_aktuell(&self, mix: &SharedMix) -> bool {
        self.aktuell.lock().as_ref() == Some(mix)
    }

    /// Gibt Mixer und Pipeline frei (in dieser Reihenfolge)
    ///
    /// Gibt `false` zurueck wenn kein Mix existierte.
    pub async fn herunterfahren(&self, engine: &dyn MediaEngine, metriken: &MixcastMetrics) -> bool {
        let mut init = self.init.lock().await;
        self.aktuell.lock().take();
        let Some(mix) = init.take() else {
            return false;
        };

        best_effort_freigeben(engine, metriken, mix.mixer.id(), None).await;
        best_effort_freigeben(engine, metriken, mix.pipeline.id(), None).await;
        tracing::info!("Pipeline und Mixer freigegeben");
        true
    }
}
