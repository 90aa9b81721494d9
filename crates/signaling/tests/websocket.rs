//! End-to-End-Tests ueber echte WebSocket-Verbindungen (MockEngine)

use futures_util::{SinkExt, StreamExt};
use mixcast_media::MockEngine;
use mixcast_observability::MixcastMetrics;
use mixcast_signaling::{SignalingConfig, SignalingServer, SignalingState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: Arc<SignalingState>,
    engine: MockEngine,
    shutdown_tx: watch::Sender<bool>,
}

async fn server_starten(config: SignalingConfig) -> TestServer {
    let engine = MockEngine::neu();
    let state = SignalingState::neu(
        config,
        Arc::new(engine.clone()),
        MixcastMetrics::neu().unwrap(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = SignalingServer::neu(Arc::clone(&state), addr);
    tokio::spawn(async move {
        let _ = server.mit_listener_starten(listener, shutdown_rx).await;
    });

    TestServer {
        addr,
        state,
        engine,
        shutdown_tx,
    }
}

async fn verbinden(server: &TestServer) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/one2many", server.addr))
        .await
        .unwrap();
    ws
}

async fn senden(ws: &mut Client, wert: Value) {
    ws.send(Message::Text(wert.to_string())).await.unwrap();
}

/// Liest die naechste Text-Nachricht als JSON
async fn empfangen(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timeout beim Empfangen")
            .expect("Verbindung geschlossen")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn warten_bis(bedingung: impl Fn() -> bool) {
    for _ in 0..250 {
        if bedingung() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Bedingung nicht erfuellt");
}

#[tokio::test]
async fn viewer_ohne_presenter_erhaelt_ablehnung() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut ws = verbinden(&server).await;

    senden(&mut ws, json!({"kind": "viewer", "sdpOffer": "o"})).await;
    let antwort = empfangen(&mut ws).await;

    assert_eq!(antwort["kind"], "viewerResponse");
    assert_eq!(antwort["response"], "rejected");
    assert_eq!(antwort["message"], "No active presenter. Try again later...");
    assert!(server.engine.journal().is_empty());
}

#[tokio::test]
async fn ungueltige_nachricht_laesst_verbindung_offen() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut ws = verbinden(&server).await;

    senden(&mut ws, json!({"kind": "tanzen"})).await;
    let antwort = empfangen(&mut ws).await;
    assert_eq!(antwort["kind"], "error");
    assert!(antwort["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid message "));
    assert!(antwort["message"].as_str().unwrap().contains("tanzen"));

    // Verbindung bleibt nutzbar
    senden(&mut ws, json!({"kind": "viewer", "sdpOffer": "o"})).await;
    assert_eq!(empfangen(&mut ws).await["kind"], "viewerResponse");
}

#[tokio::test]
async fn presenter_mit_altem_id_feld_wird_angenommen() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut ws = verbinden(&server).await;

    senden(&mut ws, json!({"id": "presenter", "sdpOffer": "offer-p"})).await;
    let antwort = empfangen(&mut ws).await;

    assert_eq!(antwort["kind"], "presenterResponse");
    assert_eq!(antwort["response"], "accepted");
    assert!(antwort["sdpAnswer"]
        .as_str()
        .unwrap()
        .ends_with(":offer-p"));
}

#[tokio::test]
async fn presenter_und_viewer_ueber_websocket() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut presenter = verbinden(&server).await;
    let mut viewer = verbinden(&server).await;

    senden(
        &mut presenter,
        json!({"kind": "onIceCandidate", "candidate": {"candidate": "c1", "sdpMid": "0", "sdpMLineIndex": 0}}),
    )
    .await;
    senden(&mut presenter, json!({"kind": "presenter", "sdpOffer": "O1"})).await;
    assert_eq!(empfangen(&mut presenter).await["response"], "accepted");

    senden(&mut viewer, json!({"kind": "viewer", "sdpOffer": "O2"})).await;
    let antwort = empfangen(&mut viewer).await;
    assert_eq!(antwort["kind"], "viewerResponse");
    assert_eq!(antwort["response"], "accepted");

    let coordinator = &server.state.coordinator;
    assert_eq!(coordinator.registry().presenter_anzahl(), 1);
    assert_eq!(coordinator.registry().viewer_anzahl(), 1);

    senden(&mut viewer, json!({"kind": "stop"})).await;
    warten_bis(|| coordinator.registry().viewer_anzahl() == 0).await;
    assert_eq!(coordinator.registry().presenter_anzahl(), 1);
}

#[tokio::test]
async fn engine_kandidaten_erreichen_den_client() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut ws = verbinden(&server).await;

    senden(&mut ws, json!({"kind": "presenter", "sdpOffer": "o"})).await;
    assert_eq!(empfangen(&mut ws).await["response"], "accepted");

    let coordinator = &server.state.coordinator;
    let sitzung = coordinator.registry().sitzungen()[0];
    let endpoint = coordinator.registry().endpoint(sitzung).unwrap();
    server.engine.kandidat_ausloesen(
        endpoint.id(),
        mixcast_protocol::CandidateRecord::neu("srv-1", Some("0".to_string()), Some(0)),
    );

    let nachricht = empfangen(&mut ws).await;
    assert_eq!(nachricht["kind"], "iceCandidate");
    assert_eq!(nachricht["candidate"]["candidate"], "srv-1");
    assert_eq!(nachricht["candidate"]["sdpMLineIndex"], 0);
}

#[tokio::test]
async fn verbindungsende_baut_sitzung_ab() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut ws = verbinden(&server).await;

    senden(&mut ws, json!({"kind": "presenter", "sdpOffer": "o"})).await;
    assert_eq!(empfangen(&mut ws).await["response"], "accepted");
    assert_eq!(server.engine.lebende_objekte_vom_typ("Endpoint"), 1);

    ws.close(None).await.unwrap();
    drop(ws);

    let state = Arc::clone(&server.state);
    warten_bis(|| state.verbindungs_anzahl() == 0).await;
    warten_bis(|| server.engine.lebende_objekte_vom_typ("Endpoint") == 0).await;
    assert_eq!(server.engine.lebende_objekte_vom_typ("MixerPort"), 0);
    assert_eq!(server.engine.doppelte_freigaben(), 0);
    assert_eq!(state.coordinator.ausgang().client_anzahl(), 0);
}

#[tokio::test]
async fn volle_server_lehnen_verbindungen_ab() {
    let server = server_starten(SignalingConfig {
        max_sessions: 1,
        ..Default::default()
    })
    .await;

    let _erste = verbinden(&server).await;
    let zweite = connect_async(format!("ws://{}/one2many", server.addr)).await;
    assert!(zweite.is_err());
}

#[tokio::test]
async fn shutdown_schliesst_verbindungen() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut ws = verbinden(&server).await;
    warten_bis(|| server.state.verbindungs_anzahl() == 1).await;

    server.shutdown_tx.send(true).unwrap();

    let ende = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ende.is_ok());
    assert!(server
        .state
        .auf_verbindungsende_warten(Duration::from_secs(5))
        .await);
}

#[tokio::test]
async fn ueberlaufende_queue_trennt_verbindung_und_baut_ab() {
    let server = server_starten(SignalingConfig {
        sende_queue: 2,
        ..Default::default()
    })
    .await;
    let mut ws = verbinden(&server).await;

    senden(&mut ws, json!({"kind": "presenter", "sdpOffer": "o"})).await;
    assert_eq!(empfangen(&mut ws).await["response"], "accepted");

    let coordinator = &server.state.coordinator;
    let sitzung = coordinator.registry().sitzungen()[0];
    let endpoint = coordinator.registry().endpoint(sitzung).unwrap();

    // Mehr Kandidaten als die Queue fasst, ohne dass der Verbindungs-Task dazwischen laeuft
    for n in 0..5 {
        server.engine.kandidat_ausloesen(
            endpoint.id(),
            mixcast_protocol::CandidateRecord::neu(format!("srv-{n}"), Some("0".to_string()), Some(0)),
        );
    }
    assert!(!coordinator.ausgang().ist_registriert(sitzung));

    // Eingereihte Kandidaten kommen noch an, danach wird geschlossen
    let empfangene = tokio::time::timeout(Duration::from_secs(5), async {
        let mut empfangene = Vec::new();
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let wert: Value = serde_json::from_str(&text).unwrap();
                    assert_eq!(wert["kind"], "iceCandidate");
                    empfangene.push(wert["candidate"]["candidate"].as_str().unwrap().to_string());
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
        empfangene
    })
    .await
    .expect("Verbindung wurde nicht geschlossen");
    assert_eq!(empfangene, vec!["srv-0", "srv-1"]);

    let state = Arc::clone(&server.state);
    warten_bis(|| state.verbindungs_anzahl() == 0).await;
    warten_bis(|| server.engine.lebende_objekte_vom_typ("Endpoint") == 0).await;
    assert_eq!(server.engine.lebende_objekte_vom_typ("MixerPort"), 0);
    assert_eq!(server.engine.doppelte_freigaben(), 0);
    assert_eq!(state.coordinator.registry().presenter_anzahl(), 0);
}
