//! 에러 타입 정의

use thiserror::Error;

/// 시그널링 / 피어 연결 에러 (연결 단위로 치명적)
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("failed to create peer connection: {0}")]
    PeerConnection(#[source] webrtc::Error),

    #[error("failed to apply remote description: {0}")]
    RemoteDescription(#[source] webrtc::Error),

    #[error("failed to create answer: {0}")]
    CreateAnswer(#[source] webrtc::Error),

    #[error("failed to apply local description: {0}")]
    LocalDescription(#[source] webrtc::Error),

    #[error("malformed offer payload: {0}")]
    MalformedOffer(#[source] serde_json::Error),

    #[error("peer connection failed")]
    PeerFailed,
}

/// 퀴즈 데이터 / 애플리케이션 메시지 에러
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("failed to read question bank {path}: {source}")]
    BankRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse question bank: {0}")]
    BankParse(#[source] serde_json::Error),

    #[error("question {id}: {reason}")]
    InvalidQuestion { id: i64, reason: String },

    #[error("malformed answer payload: {0}")]
    MalformedAnswer(#[source] serde_json::Error),

    #[error("unexpected message type: {0}")]
    UnexpectedType(String),
}
