//! Typisierte Handles auf entfernte Media-Objekte
//!
//! Die Media-Engine identifiziert jedes Objekt ueber eine opake
//! Zeichenkette. Die Newtypes verhindern, dass z.B. ein Mixer-Port dort
//! uebergeben wird wo ein Endpunkt erwartet wird.

use serde::{Deserialize, Serialize};

/// Opake Objekt-ID der Media-Engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl ObjectId {
    /// Gibt die ID als String-Slice zurueck
    pub fn als_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

macro_rules! media_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(ObjectId);

        impl $name {
            /// Umhuellt eine Objekt-ID
            pub fn neu(id: impl Into<ObjectId>) -> Self {
                Self(id.into())
            }

            /// Gibt die Objekt-ID zurueck
            pub fn id(&self) -> &ObjectId {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

media_handle!(
    /// Verarbeitungskontext der Media-Engine (einmal pro Prozess)
    Pipeline
);
media_handle!(
    /// Compositor der alle Presenter-Streams mischt
    Mixer
);
media_handle!(
    /// WebRTC-Endpunkt eines einzelnen Clients
    Endpoint
);
media_handle!(
    /// Ein- oder Ausgang des Mixers fuer genau eine Sitzung
    MixerPort
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_gibt_id_zurueck() {
        let ep = Endpoint::neu("abc/WebRtcEndpoint");
        assert_eq!(ep.id().als_str(), "abc/WebRtcEndpoint");
        assert_eq!(ep.to_string(), "abc/WebRtcEndpoint");
    }

    #[test]
    fn verschiedene_handles_gleicher_id_sind_gleich_pro_typ() {
        assert_eq!(MixerPort::neu("x"), MixerPort::neu(String::from("x")));
    }
}
