//! 연결 핸들러

use crate::state::AppState;
use std::net::SocketAddr;
use uuid::Uuid;

/// 새 시그널링 연결 처리 (플레이어 ID 발급)
pub fn handle_connection(remote_addr: SocketAddr) -> String {
    let player_id = Uuid::new_v4().to_string();
    tracing::info!(player_id = %player_id, remote_addr = %remote_addr, "New connection established");
    player_id
}

/// 연결 안에서 데이터 채널 하나를 가리키는 세션 키
pub fn channel_key(player_id: &str, channel_id: u16) -> String {
    format!("{player_id}/{channel_id}")
}

/// 데이터 채널 발견 시 방에 세션 등록, (세션 키, 세대) 반환
pub fn handle_join(
    state: &AppState,
    player_id: &str,
    channel_id: u16,
    label: &str,
) -> (String, u64) {
    let key = channel_key(player_id, channel_id);
    let generation = state.room.join_channel(&key, player_id);
    tracing::info!(
        player_id = %player_id,
        session = %key,
        label = %label,
        players = state.room.player_count(),
        "Data channel registered"
    );
    (key, generation)
}

/// 방에서 세션 제거 (여러 번 호출돼도 무방, 세대가 다르면 무시)
pub fn handle_leave(state: &AppState, key: &str, generation: u64) {
    if let Some(session) = state.room.leave(key, generation) {
        tracing::info!(
            player_id = %session.connection_id,
            session = %key,
            score = session.score,
            played_ms = session.joined_at.elapsed().as_millis() as u64,
            "Player left room"
        );
    }
}

/// 연결 해제 처리
pub async fn handle_disconnect(
    state: &AppState,
    player_id: &str,
    peer: &webrtc::peer_connection::RTCPeerConnection,
) {
    if let Err(e) = peer.close().await {
        tracing::warn!(player_id = %player_id, error = %e, "Failed to close peer connection");
    }
    let removed = state.room.leave_connection(player_id);
    tracing::info!(player_id = %player_id, sessions = removed, "Connection closed");
}
