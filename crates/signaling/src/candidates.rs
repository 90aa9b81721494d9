//! Kandidaten-Puffer – ICE-Kandidaten die vor ihrem Endpunkt eintreffen
//!
//! Pro Sitzung eine FIFO-Queue. Der Puffer selbst ist nicht synchronisiert;
//! die `SessionRegistry` haelt ihn unter derselben Sperre wie die
//! Sitzungseintraege, damit "Endpunkt bereit" und "Puffer leer" atomar
//! zusammen wechseln.

use mixcast_core::SessionId;
use mixcast_protocol::CandidateRecord;
use std::collections::{HashMap, VecDeque};

/// Gepufferte Kandidaten, indiziert nach Sitzung
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    queues: HashMap<SessionId, VecDeque<CandidateRecord>>,
}

impl CandidateBuffer {
    /// Erstellt einen leeren Puffer
    pub fn neu() -> Self {
        Self::default()
    }

    /// Haengt einen Kandidaten an die Queue der Sitzung an
    pub fn anhaengen(&mut self, session_id: SessionId, kandidat: CandidateRecord) {
        self.queues.entry(session_id).or_default().push_back(kandidat);
    }

    /// Entnimmt den aeltesten Kandidaten einer Sitzung
    ///
    /// Eine leer gewordene Queue bleibt bestehen, bis `entfernen` sie loescht.
    pub fn entnehmen(&mut self, session_id: SessionId) -> Option<CandidateRecord> {
        self.queues.get_mut(&session_id)?.pop_front()
    }

    /// Loescht die Queue einer Sitzung und gibt die Anzahl verworfener Kandidaten zurueck
    pub fn entfernen(&mut self, session_id: SessionId) -> usize {
        self.queues
            .remove(&session_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Anzahl gepufferter Kandidaten einer Sitzung
    pub fn anzahl(&self, session_id: SessionId) -> usize {
        self.queues.get(&session_id).map(|q| q.len()).unwrap_or(0)
    }

    /// Prueft ob fuer die Sitzung ein Puffer-Eintrag existiert
    pub fn hat_eintrag(&self, session_id: SessionId) -> bool {
        self.queues.contains_key(&session_id)
    }

    /// Anzahl der Sitzungen mit Puffer-Eintrag
    pub fn sitzungen(&self) -> usize {
        self.queues.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
