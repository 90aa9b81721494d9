//! Fehlertypen fuer den Signaling-Service
//!
//! Die Anzeigetexte gehen als `message` an den Client und sind Englisch wie
//! das uebrige Leitungsprotokoll.

use mixcast_core::Rolle;
use mixcast_media::MediaError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Viewer-Anfrage ohne aktiven Presenter
    #[error("No active presenter. Try again later...")]
    KeinPresenter,

    /// Aufruf an die Media-Engine fehlgeschlagen
    #[error("{0}")]
    Engine(#[from] MediaError),

    /// Die Sitzung hat bereits eine Rolle
    #[error("Session is already registered as {0}")]
    RolleBereitsFestgelegt(Rolle),

    /// Die Sitzung wurde waehrend der Verhandlung gestoppt
    #[error("Session was stopped")]
    SitzungGestoppt,

    /// Der geteilte Mixer wurde waehrend der Verhandlung freigegeben
    #[error("Mixer was released. Try again later...")]
    MixFreigegeben,
}

impl SignalingError {
    /// Gibt an, ob der Client eine Ablehnung erhalten soll
    ///
    /// Eine gestoppte Sitzung wird nicht mehr beantwortet.
    pub fn client_melden(&self) -> bool {
        !matches!(self, Self::SitzungGestoppt)
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kein_presenter_meldung() {
        assert_eq!(
            SignalingError::KeinPresenter.to_string(),
            "No active presenter. Try again later..."
        );
    }

    #[test]
    fn engine_fehler_traegt_ursache() {
        let err: SignalingError = MediaError::verbindung("weg").into();
        assert!(err.to_string().contains("weg"));
        assert!(err.client_melden());
    }

    #[test]
    fn rollenkonflikt_meldung() {
        assert_eq!(
            SignalingError::RolleBereitsFestgelegt(Rolle::Presenter).to_string(),
            "Session is already registered as presenter"
        );
    }

    #[test]
    fn gestoppte_sitzung_wird_nicht_gemeldet() {
        assert!(!SignalingError::SitzungGestoppt.client_melden());
        assert!(SignalingError::RolleBereitsFestgelegt(Rolle::Viewer).client_melden());
    }
}
