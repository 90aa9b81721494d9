//! WebSocket-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bedient einen einzigen Pfad (Standard `/one2many`).
//! Jede akzeptierte WebSocket-Verbindung erhaelt eine neue Sitzungs-ID und
//! laeuft als eigene `ClientConnection`.

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::ClientConnection;
use crate::server_state::SignalingState;

#[derive(Clone)]
struct AppState {
    state: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
}

impl SignalingServer {
    /// Erstellt einen neuen SignalingServer
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Bindet den Socket und bedient Verbindungen
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.mit_listener_starten(listener, shutdown_rx).await
    }

    /// Bedient Verbindungen auf einem bereits gebundenen Listener
    pub async fn mit_listener_starten(
        self,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        let pfad = self.state.config.pfad.clone();

        tracing::info!(adresse = %lokale_addr, pfad = %pfad, "Signaling-Server gestartet");

        let app = router(Arc::clone(&self.state), shutdown_rx.clone());
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_abwarten(shutdown_rx))
        .await?;

        tracing::info!("Signaling-Server gestoppt");
        Ok(())
    }

    /// Gibt die Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

/// Router mit dem WebSocket-Endpunkt
pub fn router(state: Arc<SignalingState>, shutdown_rx: watch::Receiver<bool>) -> Router {
    let pfad = state.config.pfad.clone();
    Router::new()
        .route(&pfad, get(ws_handler))
        .with_state(AppState { state, shutdown_rx })
}

async fn ws_handler(
    State(app): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(platz) = app.state.platz_reservieren() else {
        tracing::warn!(
            peer = %peer_addr,
            max = app.state.config.max_sessions,
            "Server voll – Verbindung abgelehnt"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Server voll").into_response();
    };

    let session_id = app.state.id_generator.naechste();
    tracing::debug!(session_id = %session_id, peer = %peer_addr, "Verbindung akzeptiert");

    let verbindung = ClientConnection::neu(Arc::clone(&app.state), session_id, peer_addr);
    let shutdown_rx = app.shutdown_rx.clone();

    ws.on_upgrade(move |socket| async move {
        let _platz = platz;
        verbindung.verarbeiten(socket, shutdown_rx).await;
    })
}

async fn shutdown_abwarten(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
    tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
}
