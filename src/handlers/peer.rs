//! 피어 연결 / 데이터 채널 연결

use crate::error::SignalingError;
use crate::handlers::session::{ChannelEvent, SessionCoordinator};
use crate::protocol::{QuizMessage, SignalMessage};
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// 연결별 피어 연결과 실패 알림 수신측
pub struct PeerLink {
    pub pc: Arc<RTCPeerConnection>,
    /// 피어 연결이 Failed 상태가 되면 신호를 받음
    pub failed: UnboundedReceiver<()>,
}

/// 피어 연결 생성 및 콜백 등록
///
/// 로컬 ICE 후보는 `signal_tx`로 보내져 소켓 송신 태스크 하나가 기록한다.
pub async fn create_peer(
    state: Arc<AppState>,
    player_id: &str,
    signal_tx: UnboundedSender<SignalMessage>,
) -> Result<PeerLink, SignalingError> {
    let mut settings = SettingEngine::default();
    settings.set_include_loopback_candidate(state.config.ice_include_loopback);
    let api = APIBuilder::new().with_setting_engine(settings).build();
    let ice_servers = if state.config.ice_servers.is_empty() {
        Vec::new()
    } else {
        vec![RTCIceServer {
            urls: state.config.ice_servers.clone(),
            ..Default::default()
        }]
    };

    let pc = api
        .new_peer_connection(RTCConfiguration {
            ice_servers,
            ..Default::default()
        })
        .await
        .map_err(SignalingError::PeerConnection)?;
    let pc = Arc::new(pc);

    // 로컬 ICE 후보 → 클라이언트
    let candidate_player = player_id.to_string();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        if let Some(candidate) = candidate {
            match candidate.to_json() {
                Ok(init) => {
                    tracing::debug!(player_id = %candidate_player, "Relaying local ICE candidate");
                    let _ = signal_tx.send(SignalMessage::Candidate(init));
                }
                Err(e) => {
                    tracing::warn!(player_id = %candidate_player, error = %e, "Failed to serialize ICE candidate");
                }
            }
        }
        Box::pin(async {})
    }));

    let (failed_tx, failed) = mpsc::unbounded_channel();
    let state_player = player_id.to_string();
    pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        tracing::debug!(player_id = %state_player, state = %s, "Peer connection state changed");
        if s == RTCPeerConnectionState::Failed {
            let _ = failed_tx.send(());
        }
        Box::pin(async {})
    }));

    let channel_player = player_id.to_string();
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let state = state.clone();
        let player_id = channel_player.clone();
        Box::pin(async move {
            attach_quiz_channel(state, player_id, dc);
        })
    }));

    Ok(PeerLink { pc, failed })
}

/// 데이터 채널에 퀴즈 세션 연결
pub fn attach_quiz_channel(state: Arc<AppState>, player_id: String, dc: Arc<RTCDataChannel>) {
    let (session_key, generation) =
        crate::handlers::handle_join(&state, &player_id, dc.id(), dc.label());
    let player_id = session_key;

    let (events_tx, events_rx) = mpsc::unbounded_channel::<ChannelEvent>();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<QuizMessage>();

    let open_tx = events_tx.clone();
    dc.on_open(Box::new(move || {
        let _ = open_tx.send(ChannelEvent::Open);
        Box::pin(async {})
    }));

    let message_tx = events_tx.clone();
    let message_player = player_id.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        match message_event(msg.is_string, &msg.data) {
            Some(event) => {
                let _ = message_tx.send(event);
            }
            None => {
                tracing::warn!(player_id = %message_player, "Dropped non-text data channel message");
            }
        }
        Box::pin(async {})
    }));

    let close_tx = events_tx;
    dc.on_close(Box::new(move || {
        let _ = close_tx.send(ChannelEvent::Close);
        Box::pin(async {})
    }));

    spawn_channel_writer(player_id.clone(), dc, out_rx);

    let coordinator = SessionCoordinator::new(state, player_id, generation, out_tx);
    tokio::spawn(coordinator.run(events_rx));
}

/// 텍스트 프레임만 답안 이벤트로 변환
fn message_event(is_string: bool, data: &[u8]) -> Option<ChannelEvent> {
    if !is_string {
        return None;
    }
    String::from_utf8(data.to_vec())
        .ok()
        .map(ChannelEvent::Message)
}

/// 퀴즈 메시지를 데이터 채널로 보내는 단일 송신 태스크
fn spawn_channel_writer(
    player_id: String,
    dc: Arc<RTCDataChannel>,
    mut rx: UnboundedReceiver<QuizMessage>,
) {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(player_id = %player_id, error = %e, "Failed to encode quiz message");
                    continue;
                }
            };
            if let Err(e) = dc.send_text(json).await {
                tracing::warn!(player_id = %player_id, error = %e, "Data channel send failed");
                break;
            }
        }
    });
}
