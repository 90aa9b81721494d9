//! Integrationstests: KurentoClient gegen einen lokalen JSON-RPC-Server
//!
//! Der Testserver beantwortet `create` mit fortlaufenden Objekt-IDs,
//! vergibt beim ersten Aufruf eine Sitzungs-ID und sendet nach einem
//! `subscribe` sofort ein `IceCandidateFound`-Ereignis.

use futures_util::{SinkExt, StreamExt};
use mixcast_media::{KurentoClient, MediaEngine, MediaError};
use mixcast_protocol::CandidateRecord;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const SITZUNG: &str = "kms-sitzung-1";

/// Startet den Testserver und liefert URL sowie alle empfangenen Anfragen
async fn testserver_starten() -> (String, Arc<Mutex<Vec<Value>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let adresse = listener.local_addr().unwrap();
    let anfragen = Arc::new(Mutex::new(Vec::new()));
    let protokoll = Arc::clone(&anfragen);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut schreiber, mut leser) = ws.split();
        let mut zaehler = 0u32;

        while let Some(Ok(nachricht)) = leser.next().await {
            let Message::Text(text) = nachricht else {
                continue;
            };
            let anfrage: Value = serde_json::from_str(&text).unwrap();
            protokoll.lock().unwrap().push(anfrage.clone());

            let id = anfrage["id"].clone();
            let params = &anfrage["params"];
            let antwort = match anfrage["method"].as_str().unwrap() {
                "create" => {
                    zaehler += 1;
                    let typ = params["type"].as_str().unwrap();
                    json!({"jsonrpc":"2.0","id":id,"result":{"value":format!("obj{zaehler}/{typ}"),"sessionId":SITZUNG}})
                }
                "invoke" => match params["operation"].as_str().unwrap() {
                    "processOffer" => {
                        let offer = params["operationParams"]["offer"].as_str().unwrap();
                        json!({"jsonrpc":"2.0","id":id,"result":{"value":format!("answer:{offer}"),"sessionId":SITZUNG}})
                    }
                    "addIceCandidate" => {
                        json!({"jsonrpc":"2.0","id":id,"error":{"code":40101,"message":"Object not found"}})
                    }
                    _ => json!({"jsonrpc":"2.0","id":id,"result":{"sessionId":SITZUNG}}),
                },
                "subscribe" => {
                    let objekt = params["object"].as_str().unwrap().to_string();
                    let bestaetigung = json!({"jsonrpc":"2.0","id":id,"result":{"value":"sub1","sessionId":SITZUNG}});
                    schreiber
                        .send(Message::Text(bestaetigung.to_string()))
                        .await
                        .unwrap();
                    json!({
                        "jsonrpc":"2.0",
                        "method":"onEvent",
                        "params":{"value":{
                            "type":"IceCandidateFound",
                            "object":objekt,
                            "data":{"candidate":{
                                "__module__":"kurento",
                                "__type__":"IceCandidate",
                                "candidate":"candidate:kms",
                                "sdpMid":"0",
                                "sdpMLineIndex":0
                            }}
                        }}
                    })
                }
                "release" => {
                    // Verbindung schliessen, um den Abbruch-Pfad zu testen
                    if params["object"] == "trennen" {
                        let _ = schreiber.send(Message::Close(None)).await;
                        break;
                    }
                    json!({"jsonrpc":"2.0","id":id,"result":{"sessionId":SITZUNG}})
                }
                _ => json!({"jsonrpc":"2.0","id":id,"result":{}}),
            };
            schreiber
                .send(Message::Text(antwort.to_string()))
                .await
                .unwrap();
        }
    });

    (format!("ws://{adresse}"), anfragen)
}

async fn verbinden(url: &str) -> KurentoClient {
    KurentoClient::verbinden(url, Duration::from_secs(2), Duration::ZERO)
        .await
        .unwrap()
}

#[tokio::test]
async fn objekte_erstellen_und_sitzung_wiederverwenden() {
    let (url, anfragen) = testserver_starten().await;
    let client = verbinden(&url).await;

    let pipeline = client.pipeline_erstellen().await.unwrap();
    let mixer = client.mixer_erstellen(&pipeline).await.unwrap();
    assert_eq!(pipeline.id().als_str(), "obj1/MediaPipeline");
    assert_eq!(mixer.id().als_str(), "obj2/Composite");

    let anfragen = anfragen.lock().unwrap().clone();
    assert!(anfragen[0]["params"].get("sessionId").is_none());
    assert_eq!(anfragen[1]["params"]["sessionId"], SITZUNG);
    assert_eq!(
        anfragen[1]["params"]["constructorParams"]["mediaPipeline"],
        "obj1/MediaPipeline"
    );
}

#[tokio::test]
async fn angebot_liefert_answer() {
    let (url, anfragen) = testserver_starten().await;
    let client = verbinden(&url).await;

    let pipeline = client.pipeline_erstellen().await.unwrap();
    let endpoint = client.endpoint_erstellen(&pipeline).await.unwrap();
    let answer = client.angebot_verarbeiten(&endpoint, "v=0").await.unwrap();
    assert_eq!(answer, "answer:v=0");

    let port_mixer = client.mixer_erstellen(&pipeline).await.unwrap();
    let port = client.mixer_port_erstellen(&port_mixer).await.unwrap();
    client.verbinden(endpoint.id(), port.id()).await.unwrap();

    let anfragen = anfragen.lock().unwrap().clone();
    let connect = anfragen.last().unwrap();
    assert_eq!(connect["method"], "invoke");
    assert_eq!(connect["params"]["operation"], "connect");
    assert_eq!(connect["params"]["object"], endpoint.id().als_str());
    assert_eq!(connect["params"]["operationParams"]["sink"], port.id().als_str());
}

#[tokio::test]
async fn rpc_fehler_wird_weitergereicht() {
    let (url, anfragen) = testserver_starten().await;
    let client = verbinden(&url).await;

    let pipeline = client.pipeline_erstellen().await.unwrap();
    let endpoint = client.endpoint_erstellen(&pipeline).await.unwrap();
    let fehler = client
        .kandidat_hinzufuegen(&endpoint, CandidateRecord::neu("candidate:1", Some("0".into()), Some(0)))
        .await
        .unwrap_err();
    assert!(matches!(fehler, MediaError::Rpc { code: 40101, .. }));

    let anfragen = anfragen.lock().unwrap().clone();
    let kandidat = &anfragen.last().unwrap()["params"]["operationParams"]["candidate"];
    assert_eq!(kandidat["__type__"], "IceCandidate");
    assert_eq!(kandidat["candidate"], "candidate:1");
}

#[tokio::test]
async fn kandidaten_ereignis_erreicht_handler() {
    let (url, _) = testserver_starten().await;
    let client = verbinden(&url).await;

    let pipeline = client.pipeline_erstellen().await.unwrap();
    let endpoint = client.endpoint_erstellen(&pipeline).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .kandidaten_abonnieren(
            &endpoint,
            Arc::new(move |k: CandidateRecord| {
                let _ = tx.send(k);
            }),
        )
        .await
        .unwrap();

    let kandidat = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kandidat.candidate, "candidate:kms");
    assert_eq!(kandidat.sdp_mid.as_deref(), Some("0"));
    assert!(kandidat.weitere.is_empty());
}

#[tokio::test]
async fn verbindungsabbruch_beendet_ausstehende_aufrufe() {
    let (url, _) = testserver_starten().await;
    let client = verbinden(&url).await;
    assert!(client.ist_verbunden());

    let fehler = client.freigeben(&"trennen".into()).await.unwrap_err();
    assert!(matches!(fehler, MediaError::Verbindung(_)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!client.ist_verbunden());
    assert!(matches!(
        client.pipeline_erstellen().await,
        Err(MediaError::Verbindung(_))
    ));
}

#[tokio::test]
async fn verbindung_zu_unerreichbarem_server_scheitert() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let adresse = listener.local_addr().unwrap();
    drop(listener);

    let ergebnis =
        KurentoClient::verbinden(&format!("ws://{adresse}"), Duration::from_secs(1), Duration::ZERO)
            .await;
    assert!(matches!(ergebnis, Err(MediaError::Verbindung(_))));
}
