//! Wire-Format fuer WebSocket-Text-Frames
//!
//! Jede Nachricht ist genau ein Text-Frame mit einem JSON-Objekt. Das Feld
//! `kind` bestimmt den Nachrichtentyp. Aeltere Clients senden stattdessen
//! `id`; beide Schreibweisen werden beim Dekodieren akzeptiert.

use serde_json::Value;
use thiserror::Error;

use crate::control::{ClientMessage, ServerMessage};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Nachrichtengroesse (1 MB)
pub const DEFAULT_MAX_NACHRICHT_GROESSE: usize = 1024 * 1024;

/// Feldname des Nachrichtentyps
const ART_FELD: &str = "kind";

/// Feldname des Nachrichtentyps bei aelteren Clients
const ALTES_ART_FELD: &str = "id";

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Dekodieren oder Kodieren einer Nachricht
#[derive(Debug, Error)]
pub enum WireError {
    /// Kein gueltiges JSON oder Felder passen nicht zum Typ
    #[error("Ungueltiges JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON ist kein Objekt
    #[error("Nachricht ist kein JSON-Objekt")]
    KeinObjekt,

    /// `kind` fehlt oder ist kein String
    #[error("Nachrichtentyp fehlt")]
    FehlendeArt,

    /// `kind` hat einen unbekannten Wert
    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannteArt(String),

    /// Nachricht ueberschreitet die maximale Groesse
    #[error("Nachricht zu gross: {groesse} Bytes (Maximum: {maximum} Bytes)")]
    ZuGross { groesse: usize, maximum: usize },
}

// ---------------------------------------------------------------------------
// Dekodieren / Kodieren
// ---------------------------------------------------------------------------

/// Dekodiert einen Text-Frame mit Standard-Groessenlimit
pub fn nachricht_dekodieren(text: &str) -> Result<ClientMessage, WireError> {
    nachricht_dekodieren_mit_limit(text, DEFAULT_MAX_NACHRICHT_GROESSE)
}

/// Dekodiert einen Text-Frame zu einer `ClientMessage`
///
/// # Fehler
/// - `ZuGross` wenn der Frame das Limit ueberschreitet
/// - `FehlendeArt` / `UnbekannteArt` bei fehlendem oder unbekanntem `kind`
/// - `Json` wenn Pflichtfelder fehlen
pub fn nachricht_dekodieren_mit_limit(
    text: &str,
    max_groesse: usize,
) -> Result<ClientMessage, WireError> {
    if text.len() > max_groesse {
        return Err(WireError::ZuGross {
            groesse: text.len(),
            maximum: max_groesse,
        });
    }

    let mut wert: Value = serde_json::from_str(text)?;
    let objekt = wert.as_object_mut().ok_or(WireError::KeinObjekt)?;

    if !objekt.contains_key(ART_FELD) {
        if let Some(alt) = objekt.remove(ALTES_ART_FELD) {
            objekt.insert(ART_FELD.to_string(), alt);
        }
    }

    let art = objekt
        .get(ART_FELD)
        .and_then(Value::as_str)
        .ok_or(WireError::FehlendeArt)?;

    if !ClientMessage::ARTEN.contains(&art) {
        return Err(WireError::UnbekannteArt(art.to_string()));
    }

    Ok(serde_json::from_value(wert)?)
}

/// Kodiert eine `ServerMessage` als Text-Frame
pub fn nachricht_kodieren(nachricht: &ServerMessage) -> Result<String, WireError> {
    Ok(nachricht.to_json()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mixcast_core::Rolle;

    #[test]
    fn viewer_dekodieren() {
        let msg = nachricht_dekodieren(r#"{"kind":"viewer","sdpOffer":"offer"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Viewer {
                sdp_offer: "offer".into()
            }
        );
    }

    #[test]
    fn altes_id_feld_wird_akzeptiert() {
        let msg = nachricht_dekodieren(r#"{"id":"stop"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Stop);
    }

    #[test]
    fn kind_hat_vorrang_vor_id() {
        let msg = nachricht_dekodieren(r#"{"kind":"stop","id":"presenter"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Stop);
    }

    #[test]
    fn unbekannte_art() {
        let err = nachricht_dekodieren(r#"{"kind":"dance"}"#).unwrap_err();
        assert!(matches!(err, WireError::UnbekannteArt(ref a) if a == "dance"));
    }

    #[test]
    fn fehlende_art() {
        assert!(matches!(
            nachricht_dekodieren(r#"{"sdpOffer":"x"}"#),
            Err(WireError::FehlendeArt)
        ));
        assert!(matches!(
            nachricht_dekodieren(r#"{"kind":5}"#),
            Err(WireError::FehlendeArt)
        ));
    }

    #[test]
    fn kein_objekt() {
        assert!(matches!(
            nachricht_dekodieren("[1,2]"),
            Err(WireError::KeinObjekt)
        ));
    }

    #[test]
    fn kaputtes_json() {
        assert!(matches!(nachricht_dekodieren("{kind"), Err(WireError::Json(_))));
    }

    #[test]
    fn presenter_ohne_angebot_ist_ungueltig() {
        assert!(matches!(
            nachricht_dekodieren(r#"{"kind":"presenter"}"#),
            Err(WireError::Json(_))
        ));
    }

    #[test]
    fn zu_grosse_nachricht() {
        let text = format!(r#"{{"kind":"presenter","sdpOffer":"{}"}}"#, "a".repeat(64));
        let err = nachricht_dekodieren_mit_limit(&text, 32).unwrap_err();
        assert!(matches!(err, WireError::ZuGross { maximum: 32, .. }));
    }

    #[test]
    fn kodieren_erzeugt_kind_feld() {
        let text = nachricht_kodieren(&ServerMessage::angenommen(Rolle::Viewer, "a")).unwrap();
        assert!(text.contains(r#""kind":"viewerResponse""#));
    }
}
