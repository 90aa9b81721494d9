//! Fehlertypen fuer Mixcast
//!
//! Zentraler Fehler-Enum fuer crate-uebergreifende Fehlerzustaende.
//! Untermodule definieren eigene Fehler und konvertieren bei Bedarf.

use thiserror::Error;

/// Globaler Result-Alias fuer Mixcast
pub type Result<T> = std::result::Result<T, MixcastError>;

/// Crate-uebergreifende Fehler im Mixcast-System
#[derive(Debug, Error)]
pub enum MixcastError {
    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- IO ---
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl MixcastError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}
