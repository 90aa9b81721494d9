//! mixcast-protocol – Signaling-Protokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichten die zwischen Browser-Client und
//! Signaling-Server ueber die WebSocket-Verbindung ausgetauscht werden.

pub mod control;
pub mod wire;

pub use control::{
    AntwortStatus, CandidateRecord, ClientMessage, NegotiationResponse, ServerMessage,
};
pub use wire::{nachricht_dekodieren, nachricht_kodieren, WireError};
