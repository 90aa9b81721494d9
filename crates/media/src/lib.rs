//! mixcast-media – Schnittstelle zur Media-Engine
//!
//! Die Media-Engine (Pipeline, Mixer, WebRTC-Endpunkte) laeuft als externer
//! Prozess. Dieses Crate beschreibt die Faehigkeiten die der Signaling-Kern
//! von ihr benoetigt und stellt Implementierungen bereit.
//!
//! ## Architektur
//!
//! ```text
//! MediaEngine (Trait)
//!     |
//!     +-- ZeitbegrenzteEngine  (Decorator: Timeout pro Aufruf)
//!     +-- KurentoClient        (JSON-RPC 2.0 ueber WebSocket)
//!     +-- MockEngine           (In-Memory, Feature `mock`)
//! ```

pub mod engine;
pub mod error;
pub mod handle;
pub mod kurento;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod timeout;

// Bequeme Re-Exporte
pub use engine::{CandidateHandler, MediaEngine};
pub use error::{MediaError, MediaResult};
pub use handle::{Endpoint, Mixer, MixerPort, ObjectId, Pipeline};
pub use kurento::KurentoClient;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockEngine;
pub use timeout::ZeitbegrenzteEngine;
