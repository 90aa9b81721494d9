//! mixcast-signaling – WebSocket-Signaling fuer One-to-Many-Broadcast
//!
//! Dieser Crate nimmt Browser-Verbindungen entgegen, verhandelt fuer jede
//! Sitzung einen WebRTC-Endpunkt an der Media-Engine und haengt ihn an den
//! gemeinsamen Mixer. Presenter senden in den Mix, Viewer empfangen ihn.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket-Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     v
//! BroadcastCoordinator
//!     +-- SessionRegistry  (Rolle, Phase, Handles, Kandidaten-Puffer)
//!     +-- PresenterMix     (Pipeline + Mixer, einmal pro Prozess)
//!     +-- OutboundRegistry (Ausgangs-Queue pro Sitzung)
//! ```

pub mod candidates;
pub mod connection;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod mix;
pub mod outbound;
pub mod registry;
pub mod server;
pub mod server_state;

// Bequeme Re-Exporte
pub use candidates::CandidateBuffer;
pub use connection::ClientConnection;
pub use coordinator::{BroadcastCoordinator, Verhandlung};
pub use dispatcher::MessageDispatcher;
pub use error::{SignalingError, SignalingResult};
pub use mix::{PresenterMix, SharedMix};
pub use outbound::OutboundRegistry;
pub use registry::{SessionPhase, SessionRegistry, Versuch};
pub use server::SignalingServer;
pub use server_state::{SignalingConfig, SignalingState};
