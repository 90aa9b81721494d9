//! JSON-RPC 2.0 Nachrichten des Kurento-Protokolls
//!
//! Anfragen: `create`, `invoke`, `subscribe`, `release`, `ping`.
//! Eingehend: Antworten (mit `id`) und `onEvent`-Benachrichtigungen.

use mixcast_protocol::CandidateRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::MediaError;

/// Modul-Kennung fuer komplexe Kurento-Typen
const KURENTO_MODUL: &str = "kurento";

/// Typname eines ICE-Kandidaten in Kurento
const ICE_KANDIDAT_TYP: &str = "IceCandidate";

/// Ereignistyp fuer gefundene ICE-Kandidaten
pub const EREIGNIS_KANDIDAT_GEFUNDEN: &str = "IceCandidateFound";

// ---------------------------------------------------------------------------
// Ausgehend
// ---------------------------------------------------------------------------

/// JSON-RPC-Anfrage
#[derive(Debug, Serialize)]
pub struct RpcAnfrage<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> RpcAnfrage<'a> {
    pub fn neu(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// Haengt die Kurento-Sitzungs-ID an die Parameter an (falls bekannt)
pub fn mit_sitzung(mut params: Value, sitzung: Option<&str>) -> Value {
    if let (Some(s), Some(obj)) = (sitzung, params.as_object_mut()) {
        obj.insert("sessionId".into(), Value::String(s.to_string()));
    }
    params
}

/// Parameter fuer `create`
pub fn create_params(typ: &str, constructor_params: Value) -> Value {
    json!({
        "type": typ,
        "constructorParams": constructor_params,
        "properties": {},
    })
}

/// Parameter fuer `invoke`
pub fn invoke_params(objekt: &str, operation: &str, operation_params: Value) -> Value {
    json!({
        "object": objekt,
        "operation": operation,
        "operationParams": operation_params,
    })
}

/// Parameter fuer `subscribe`
pub fn subscribe_params(objekt: &str, typ: &str) -> Value {
    json!({
        "type": typ,
        "object": objekt,
    })
}

/// Parameter fuer `release`
pub fn release_params(objekt: &str) -> Value {
    json!({ "object": objekt })
}

// ---------------------------------------------------------------------------
// Eingehend
// ---------------------------------------------------------------------------

/// Fehlerobjekt einer JSON-RPC-Antwort
#[derive(Debug, Clone, Deserialize)]
pub struct RpcFehler {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<RpcFehler> for MediaError {
    fn from(f: RpcFehler) -> Self {
        MediaError::Rpc {
            code: f.code,
            message: f.message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RohEingang {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFehler>,
}

/// Von der Engine gemeldetes Ereignis
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEreignis {
    /// Ereignistyp, z.B. `IceCandidateFound`
    pub typ: String,
    /// Objekt das das Ereignis ausgeloest hat
    pub objekt: String,
    /// Ereignisdaten
    pub daten: Value,
}

/// Klassifizierte eingehende Nachricht
#[derive(Debug)]
pub enum Eingang {
    /// Antwort auf eine eigene Anfrage
    Antwort {
        id: u64,
        ergebnis: Result<Value, RpcFehler>,
    },
    /// Ereignis-Benachrichtigung
    Ereignis(EngineEreignis),
    /// Alles andere (wird ignoriert)
    Sonstiges,
}

/// Ordnet einen eingehenden Text-Frame ein
pub fn eingang_klassifizieren(text: &str) -> serde_json::Result<Eingang> {
    let roh: RohEingang = serde_json::from_str(text)?;

    if let Some(id) = roh.id {
        if let Some(fehler) = roh.error {
            return Ok(Eingang::Antwort {
                id,
                ergebnis: Err(fehler),
            });
        }
        if let Some(result) = roh.result {
            return Ok(Eingang::Antwort {
                id,
                ergebnis: Ok(result),
            });
        }
    }

    if roh.method.as_deref() == Some("onEvent") {
        let wert = roh
            .params
            .as_ref()
            .and_then(|p| p.get("value"))
            .cloned()
            .unwrap_or(Value::Null);
        let typ = wert.get("type").and_then(Value::as_str);
        let objekt = wert.get("object").and_then(Value::as_str);
        if let (Some(typ), Some(objekt)) = (typ, objekt) {
            return Ok(Eingang::Ereignis(EngineEreignis {
                typ: typ.to_string(),
                objekt: objekt.to_string(),
                daten: wert.get("data").cloned().unwrap_or(Value::Null),
            }));
        }
    }

    Ok(Eingang::Sonstiges)
}

/// Liest das `value`-Feld eines Ergebnisses als String
pub fn wert_als_string(ergebnis: &Value) -> Result<String, MediaError> {
    ergebnis
        .get("value")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MediaError::ungueltige_antwort(format!("missing 'value': {ergebnis}")))
}

/// Liest die Kurento-Sitzungs-ID eines Ergebnisses (falls vorhanden)
pub fn sitzung_aus_ergebnis(ergebnis: &Value) -> Option<String> {
    ergebnis
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// ICE-Kandidaten-Konvertierung
// ---------------------------------------------------------------------------

/// Wandelt einen Browser-Kandidaten in den Kurento-Typ `IceCandidate`
pub fn kandidat_zu_engine(kandidat: &CandidateRecord) -> Value {
    let mut wert = serde_json::to_value(kandidat).unwrap_or_else(|_| Value::Object(Map::new()));
    if let Some(obj) = wert.as_object_mut() {
        obj.insert("__module__".into(), Value::String(KURENTO_MODUL.into()));
        obj.insert("__type__".into(), Value::String(ICE_KANDIDAT_TYP.into()));
    }
    wert
}

/// Wandelt einen Kurento-`IceCandidate` in das Browser-Format
pub fn kandidat_von_engine(mut wert: Value) -> serde_json::Result<CandidateRecord> {
    if let Some(obj) = wert.as_object_mut() {
        obj.remove("__module__");
        obj.remove("__type__");
    }
    serde_json::from_value(wert)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anfrage_serialisierung() {
        let anfrage = RpcAnfrage::neu(
            3,
            "create",
            mit_sitzung(create_params("MediaPipeline", json!({})), Some("s1")),
        );
        let wert = serde_json::to_value(&anfrage).unwrap();
        assert_eq!(wert["jsonrpc"], "2.0");
        assert_eq!(wert["id"], 3);
        assert_eq!(wert["params"]["type"], "MediaPipeline");
        assert_eq!(wert["params"]["sessionId"], "s1");
    }

    #[test]
    fn ohne_sitzung_kein_feld() {
        let params = mit_sitzung(release_params("x"), None);
        assert!(params.get("sessionId").is_none());
    }

    #[test]
    fn erfolgreiche_antwort() {
        let eingang = eingang_klassifizieren(
            r#"{"jsonrpc":"2.0","id":7,"result":{"value":"p1","sessionId":"abc"}}"#,
        )
        .unwrap();
        let Eingang::Antwort { id, ergebnis } = eingang else {
            panic!("Erwartet Antwort");
        };
        assert_eq!(id, 7);
        let ergebnis = ergebnis.unwrap();
        assert_eq!(wert_als_string(&ergebnis).unwrap(), "p1");
        assert_eq!(sitzung_aus_ergebnis(&ergebnis).as_deref(), Some("abc"));
    }

    #[test]
    fn fehler_antwort() {
        let eingang = eingang_klassifizieren(
            r#"{"jsonrpc":"2.0","id":8,"error":{"code":40101,"message":"Object not found"}}"#,
        )
        .unwrap();
        let Eingang::Antwort { ergebnis, .. } = eingang else {
            panic!("Erwartet Antwort");
        };
        let fehler: MediaError = ergebnis.unwrap_err().into();
        assert!(matches!(fehler, MediaError::Rpc { code: 40101, .. }));
    }

    #[test]
    fn kandidat_ereignis() {
        let text = r#"{"jsonrpc":"2.0","method":"onEvent","params":{"value":{"data":{"candidate":{"__module__":"kurento","__type__":"IceCandidate","candidate":"candidate:1","sdpMid":"0","sdpMLineIndex":0},"source":"ep1","type":"IceCandidateFound"},"object":"ep1","type":"IceCandidateFound"}}}"#;
        let Eingang::Ereignis(ereignis) = eingang_klassifizieren(text).unwrap() else {
            panic!("Erwartet Ereignis");
        };
        assert_eq!(ereignis.typ, EREIGNIS_KANDIDAT_GEFUNDEN);
        assert_eq!(ereignis.objekt, "ep1");

        let kandidat = kandidat_von_engine(ereignis.daten["candidate"].clone()).unwrap();
        assert_eq!(kandidat.candidate, "candidate:1");
        assert_eq!(kandidat.sdp_m_line_index, Some(0));
        assert!(kandidat.weitere.is_empty());
    }

    #[test]
    fn kandidat_zu_engine_ergaenzt_typ() {
        let wert = kandidat_zu_engine(&CandidateRecord::neu("candidate:2", Some("1".into()), Some(1)));
        assert_eq!(wert["__type__"], "IceCandidate");
        assert_eq!(wert["__module__"], "kurento");
        assert_eq!(wert["candidate"], "candidate:2");
        assert_eq!(wert["sdpMid"], "1");
    }

    #[test]
    fn unbekannte_nachricht_wird_ignoriert() {
        assert!(matches!(
            eingang_klassifizieren(r#"{"jsonrpc":"2.0","method":"other"}"#).unwrap(),
            Eingang::Sonstiges
        ));
    }
}
