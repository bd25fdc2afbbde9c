//! WebRTC 실시간 퀴즈 서버

mod config;
mod error;
mod handlers;
mod protocol;
mod quiz;
mod state;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use config::Config;
use futures::{SinkExt, Stream, StreamExt};
use protocol::{SignalEnvelope, SignalMessage};
use quiz::QuestionBank;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webrtc::peer_connection::RTCPeerConnection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 문제 은행 로드
    let questions = match &config.quiz.questions_file {
        Some(path) => QuestionBank::from_file(path)
            .with_context(|| format!("loading question bank from {path}"))?,
        None => QuestionBank::builtin(),
    };
    if questions.is_empty() {
        tracing::warn!("Question bank is empty, every player will receive end immediately");
    }
    tracing::info!(questions = questions.len(), "Question bank loaded");

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, questions));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!("🚀 Quiz Server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("serving")?;

    Ok(())
}

/// 라우터 설정
fn app(state: Arc<AppState>) -> Router {
    // CORS 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Quiz Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "rtc-quiz-server",
        "players": state.room.player_count(),
        "questions": state.room.questions().len(),
        "timestamp": std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, remote_addr))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, remote_addr: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SignalMessage>();

    // 연결 처리
    let player_id = handlers::handle_connection(remote_addr);

    let handlers::PeerLink { pc, mut failed } =
        match handlers::create_peer(state.clone(), &player_id, tx.clone()).await {
            Ok(link) => link,
            Err(e) => {
                tracing::error!(player_id = %player_id, error = %e, "Peer setup failed");
                return;
            }
        };

    // 송신 태스크 (answer와 ICE 후보 모두 여기서만 기록)
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // 수신 처리
    let exit = relay_signals(
        &pc,
        &tx,
        &player_id,
        &mut ws_receiver,
        &mut failed,
        &mut send_task,
    )
    .await;
    tracing::info!(player_id = %player_id, reason = ?exit, "Signaling loop ended");

    // 연결 해제
    handlers::handle_disconnect(&state, &player_id, &pc).await;
    send_task.abort();
}

/// 시그널링 수신 루프 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// 클라이언트가 닫았거나 읽기 실패
    ClientClosed,
    /// 소켓 쓰기 실패로 송신 태스크 종료
    WriterClosed,
    PeerFailed,
    SignalingFailed,
}

/// 소켓 메시지를 하나씩 피어 연결에 적용
async fn relay_signals<S>(
    pc: &RTCPeerConnection,
    tx: &mpsc::UnboundedSender<SignalMessage>,
    player_id: &str,
    incoming: &mut S,
    failed: &mut mpsc::UnboundedReceiver<()>,
    writer: &mut JoinHandle<()>,
) -> LoopExit
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let result = tokio::select! {
            result = incoming.next() => result,
            Some(()) = failed.recv() => {
                tracing::error!(player_id = %player_id, error = %error::SignalingError::PeerFailed, "Closing connection");
                return LoopExit::PeerFailed;
            }
            _ = &mut *writer => {
                tracing::warn!(player_id = %player_id, "Signaling socket write failed");
                return LoopExit::WriterClosed;
            }
        };

        match result {
            Some(Ok(Message::Text(text))) => {
                let envelope = match serde_json::from_str::<SignalEnvelope>(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::warn!(player_id = %player_id, error = %e, "Malformed signaling message dropped");
                        continue;
                    }
                };
                if let Err(e) = handlers::handle_signal(pc, tx, player_id, envelope).await {
                    tracing::error!(player_id = %player_id, error = %e, "Signaling failed");
                    return LoopExit::SignalingFailed;
                }
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return LoopExit::ClientClosed,
            Some(Ok(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::{SinkExt, StreamExt};
    use tokio::time::{timeout, Duration};
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use webrtc::api::setting_engine::SettingEngine;
    use webrtc::api::{APIBuilder, API};
    use webrtc::data_channel::data_channel_message::DataChannelMessage;
    use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
    use webrtc::peer_connection::configuration::RTCConfiguration;

    fn test_state() -> Arc<AppState> {
        let config = Config {
            ice_servers: Vec::new(),
            ..Config::default()
        };
        Arc::new(AppState::new(config, QuestionBank::builtin()))
    }

    #[tokio::test]
    async fn health_reports_room() {
        let state = test_state();
        state.room.join("p1");

        let response = app(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["players"], 1);
        assert_eq!(value["questions"], 3);
    }

    #[tokio::test]
    async fn socket_answers_offer_after_garbage() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = app(test_state()).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, service).await.unwrap();
        });

        let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        let client = APIBuilder::new()
            .build()
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        client.create_data_channel("quiz", None).await.unwrap();
        let offer = client.create_offer(None).await.unwrap();

        socket
            .send(WsMessage::Text("not json".to_string()))
            .await
            .unwrap();
        socket
            .send(WsMessage::Text(
                serde_json::json!({"type": "offer", "data": offer}).to_string(),
            ))
            .await
            .unwrap();

        let answer = timeout(Duration::from_secs(10), async {
            while let Some(Ok(msg)) = socket.next().await {
                if let WsMessage::Text(text) = msg {
                    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                    if value["type"] == "answer" {
                        return Some(value);
                    }
                }
            }
            None
        })
        .await
        .unwrap()
        .expect("answer message");

        assert_eq!(answer["data"]["type"], "answer");
        assert!(answer["data"]["sdp"].as_str().unwrap().starts_with("v=0"));

        client.close().await.unwrap();
    }

    fn loopback_api() -> API {
        let mut settings = SettingEngine::default();
        settings.set_include_loopback_candidate(true);
        APIBuilder::new().with_setting_engine(settings).build()
    }

    async fn serve(state: Arc<AppState>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = app(state).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, service).await.unwrap();
        });
        addr
    }

    enum Step {
        LocalCandidate(RTCIceCandidateInit),
        Signal(String),
        Data(String),
        Closed,
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn quiz_runs_over_negotiated_data_channel() {
        let config = Config {
            ice_servers: Vec::new(),
            ice_include_loopback: true,
            ..Config::default()
        };
        let state = Arc::new(AppState::new(config, QuestionBank::builtin()));
        let addr = serve(state.clone()).await;
        let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        let client = loopback_api()
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();

        let (candidate_tx, mut candidate_rx) = mpsc::unbounded_channel();
        client.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(init) = candidate.and_then(|c| c.to_json().ok()) {
                let _ = candidate_tx.send(init);
            }
            Box::pin(async {})
        }));

        let dc = client.create_data_channel("quiz", None).await.unwrap();
        let (data_tx, mut data_rx) = mpsc::unbounded_channel();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            if let Ok(text) = String::from_utf8(msg.data.to_vec()) {
                let _ = data_tx.send(text);
            }
            Box::pin(async {})
        }));

        let offer = client.create_offer(None).await.unwrap();
        client.set_local_description(offer.clone()).await.unwrap();
        socket
            .send(WsMessage::Text(json!({"type": "offer", "data": offer}).to_string()))
            .await
            .unwrap();

        let mut answered = false;
        let mut early_candidates = Vec::new();
        let mut saw_candidate = false;
        let mut question: Option<Value> = None;

        timeout(Duration::from_secs(30), async {
            while question.is_none() || !saw_candidate {
                let step = tokio::select! {
                    Some(init) = candidate_rx.recv() => Step::LocalCandidate(init),
                    Some(Ok(WsMessage::Text(text))) = socket.next() => Step::Signal(text),
                    Some(text) = data_rx.recv() => Step::Data(text),
                    else => Step::Closed,
                };

                match step {
                    Step::LocalCandidate(init) => {
                        socket
                            .send(WsMessage::Text(
                                json!({"type": "candidate", "data": init}).to_string(),
                            ))
                            .await
                            .unwrap();
                    }
                    Step::Signal(text) => {
                        let value: Value = serde_json::from_str(&text).unwrap();
                        if value["type"] == "answer" {
                            let answer = serde_json::from_value(value["data"].clone()).unwrap();
                            client.set_remote_description(answer).await.unwrap();
                            answered = true;
                            for init in early_candidates.drain(..) {
                                let _ = client.add_ice_candidate(init).await;
                            }
                        } else if value["type"] == "candidate" {
                            saw_candidate = true;
                            let init: RTCIceCandidateInit =
                                serde_json::from_value(value["data"].clone()).unwrap();
                            if answered {
                                let _ = client.add_ice_candidate(init).await;
                            } else {
                                early_candidates.push(init);
                            }
                        }
                    }
                    Step::Data(text) => {
                        let value: Value = serde_json::from_str(&text).unwrap();
                        if value["type"] == "question" {
                            question = Some(value);
                        }
                    }
                    Step::Closed => panic!("all channels closed before the first question"),
                }
            }
        })
        .await
        .expect("question and server candidate within timeout");

        let question = question.unwrap();
        assert_eq!(question["id"], 1);
        assert_eq!(question["progress"], json!({"current": 1, "total": 3}));
        assert!(saw_candidate);

        dc.send_text(json!({"type": "answer", "id": 1, "answer": 0, "time": 100}).to_string())
            .await
            .unwrap();
        let result = timeout(Duration::from_secs(10), async {
            loop {
                let text = data_rx.recv().await.expect("data channel open");
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["type"] == "result" {
                    return value;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result["score"], 10);

        client.close().await.unwrap();
    }

    async fn test_peer() -> RTCPeerConnection {
        APIBuilder::new()
            .build()
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn relay_stops_when_peer_fails() {
        let pc = test_peer().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let (failed_tx, mut failed) = mpsc::unbounded_channel();
        let mut incoming = futures::stream::pending::<Result<Message, axum::Error>>();
        let mut writer = tokio::spawn(std::future::pending::<()>());

        failed_tx.send(()).unwrap();
        let exit = relay_signals(&pc, &tx, "p1", &mut incoming, &mut failed, &mut writer).await;
        assert_eq!(exit, LoopExit::PeerFailed);

        writer.abort();
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn relay_stops_when_socket_writer_exits() {
        let pc = test_peer().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_failed_tx, mut failed) = mpsc::unbounded_channel();
        let mut incoming = futures::stream::pending::<Result<Message, axum::Error>>();
        let mut writer = tokio::spawn(async {});

        let exit = relay_signals(&pc, &tx, "p1", &mut incoming, &mut failed, &mut writer).await;
        assert_eq!(exit, LoopExit::WriterClosed);

        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn relay_skips_garbage_until_close() {
        let pc = test_peer().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_failed_tx, mut failed) = mpsc::unbounded_channel();
        let mut incoming = futures::stream::iter(vec![
            Ok(Message::Text("nope".to_string())),
            Ok(Message::Text(r#"{"type":"bye"}"#.to_string())),
            Ok(Message::Close(None)),
        ]);
        let mut writer = tokio::spawn(std::future::pending::<()>());

        let exit = relay_signals(&pc, &tx, "p1", &mut incoming, &mut failed, &mut writer).await;
        assert_eq!(exit, LoopExit::ClientClosed);

        writer.abort();
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn relay_stops_on_malformed_offer() {
        let pc = test_peer().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_failed_tx, mut failed) = mpsc::unbounded_channel();
        let mut incoming = futures::stream::iter(vec![Ok(Message::Text(
            r#"{"type":"offer","data":{"bogus":1}}"#.to_string(),
        ))]);
        let mut writer = tokio::spawn(std::future::pending::<()>());

        let exit = relay_signals(&pc, &tx, "p1", &mut incoming, &mut failed, &mut writer).await;
        assert_eq!(exit, LoopExit::SignalingFailed);

        writer.abort();
        pc.close().await.unwrap();
    }
}
