//! WebRTC 시그널링 핸들러

use crate::error::SignalingError;
use crate::protocol::{SignalEnvelope, SignalKind, SignalMessage};
use tokio::sync::mpsc::UnboundedSender;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// 시그널링 메시지 하나 처리 (Err는 연결 종료 사유)
pub async fn handle_signal(
    pc: &RTCPeerConnection,
    sender: &UnboundedSender<SignalMessage>,
    player_id: &str,
    envelope: SignalEnvelope,
) -> Result<(), SignalingError> {
    match envelope.kind {
        SignalKind::Offer => handle_offer(pc, sender, player_id, envelope.data).await,
        SignalKind::Candidate => {
            handle_ice_candidate(pc, player_id, envelope.data).await;
            Ok(())
        }
        SignalKind::Answer => {
            tracing::debug!(player_id = %player_id, "Ignored answer from client");
            Ok(())
        }
        SignalKind::Unknown => {
            tracing::warn!(player_id = %player_id, "Ignored unknown signaling message");
            Ok(())
        }
    }
}

/// Offer 처리: 원격 설명 적용 → answer 생성/적용 → 클라이언트로 전송
pub async fn handle_offer(
    pc: &RTCPeerConnection,
    sender: &UnboundedSender<SignalMessage>,
    player_id: &str,
    data: serde_json::Value,
) -> Result<(), SignalingError> {
    let offer: RTCSessionDescription =
        serde_json::from_value(data).map_err(SignalingError::MalformedOffer)?;

    pc.set_remote_description(offer)
        .await
        .map_err(SignalingError::RemoteDescription)?;

    let answer = pc
        .create_answer(None)
        .await
        .map_err(SignalingError::CreateAnswer)?;

    pc.set_local_description(answer.clone())
        .await
        .map_err(SignalingError::LocalDescription)?;

    let _ = sender.send(SignalMessage::Answer(answer));

    tracing::debug!(player_id = %player_id, "Answered offer");
    Ok(())
}

/// ICE Candidate 처리 (잘못된 후보는 버림)
pub async fn handle_ice_candidate(
    pc: &RTCPeerConnection,
    player_id: &str,
    data: serde_json::Value,
) {
    let candidate: RTCIceCandidateInit = match serde_json::from_value(data) {
        Ok(candidate) => candidate,
        Err(e) => {
            tracing::warn!(player_id = %player_id, error = %e, "Malformed ICE candidate dropped");
            return;
        }
    };

    if let Err(e) = pc.add_ice_candidate(candidate).await {
        tracing::warn!(player_id = %player_id, error = %e, "Failed to add ICE candidate");
        return;
    }

    tracing::debug!(player_id = %player_id, "Added remote ICE candidate");
}
