//! Fehlertypen fuer die Media-Engine-Anbindung
//!
//! Die Texte erreichen als Ablehnungsgrund den Client und sind daher Englisch.

use thiserror::Error;

/// Fehlertyp fuer Aufrufe an die Media-Engine
#[derive(Debug, Clone, Error)]
pub enum MediaError {
    /// Verbindung zur Media-Engine fehlt oder wurde getrennt
    #[error("Media server unreachable: {0}")]
    Verbindung(String),

    /// Aufruf wurde nicht rechtzeitig beantwortet
    #[error("Media server call '{operation}' timed out after {millis} ms")]
    Zeitlimit {
        operation: &'static str,
        millis: u64,
    },

    /// Die Media-Engine hat den Aufruf mit einem Fehler beantwortet
    #[error("Media server error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Antwort hat nicht das erwartete Format
    #[error("Invalid media server response: {0}")]
    UngueltigeAntwort(String),

    /// Das referenzierte Objekt existiert nicht (mehr)
    #[error("Unknown media object: {0}")]
    UnbekanntesObjekt(String),
}

impl MediaError {
    /// Erstellt einen Verbindungsfehler
    pub fn verbindung(msg: impl Into<String>) -> Self {
        Self::Verbindung(msg.into())
    }

    /// Erstellt einen Fehler fuer eine ungueltige Antwort
    pub fn ungueltige_antwort(msg: impl Into<String>) -> Self {
        Self::UngueltigeAntwort(msg.into())
    }
}

/// Result-Typ fuer Media-Engine-Aufrufe
pub type MediaResult<T> = Result<T, MediaError>;
