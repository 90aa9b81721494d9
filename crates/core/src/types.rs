//! Gemeinsame Identifikationstypen fuer Mixcast
//!
//! Sitzungs-IDs verwenden das Newtype-Pattern um Verwechslungen mit
//! anderen Zahlenwerten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Eindeutige Sitzungs-ID einer Client-Verbindung
///
/// Monoton steigend und fuer die Prozesslaufzeit eindeutig. Wird nie
/// wiederverwendet und nicht persistiert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Gibt den inneren Zaehlerwert zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Vergibt Sitzungs-IDs (atomar, thread-safe)
///
/// Beginnt bei 1 und inkrementiert monoton.
#[derive(Debug)]
pub struct SessionIdGenerator {
    zaehler: AtomicU64,
}

impl SessionIdGenerator {
    /// Erstellt einen neuen Generator
    pub fn neu() -> Self {
        Self {
            zaehler: AtomicU64::new(1),
        }
    }

    /// Weist die naechste Sitzungs-ID zu
    pub fn naechste(&self) -> SessionId {
        SessionId(self.zaehler.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::neu()
    }
}

/// Rolle einer Sitzung im Broadcast
///
/// Wird beim Beginn der Verhandlung festgelegt und aendert sich danach nicht.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rolle {
    /// Veroeffentlicht einen Stream in den Mixer
    Presenter,
    /// Empfaengt den gemischten Stream
    Viewer,
}

impl Rolle {
    /// Kurzname fuer Logs und Metrik-Labels
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Presenter => "presenter",
            Self::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for Rolle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_streng_monoton() {
        let generator = SessionIdGenerator::neu();
        let a = generator.naechste();
        let b = generator.naechste();
        let c = generator.naechste();
        assert!(a < b && b < c);
        assert_eq!(a.inner(), 1);
    }

    #[test]
    fn session_ids_nebenlaeufig_eindeutig() {
        let generator = std::sync::Arc::new(SessionIdGenerator::neu());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let g = std::sync::Arc::clone(&generator);
                std::thread::spawn(move || (0..250).map(|_| g.naechste()).collect::<Vec<_>>())
            })
            .collect();

        let mut alle: Vec<SessionId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        alle.sort();
        alle.dedup();
        assert_eq!(alle.len(), 1000, "Keine ID darf doppelt vergeben werden");
    }

    #[test]
    fn session_id_display() {
        assert_eq!(SessionId(7).to_string(), "session:7");
    }

    #[test]
    fn rolle_serde_kleingeschrieben() {
        let json = serde_json::to_string(&Rolle::Viewer).unwrap();
        assert_eq!(json, "\"viewer\"");
    }
}
