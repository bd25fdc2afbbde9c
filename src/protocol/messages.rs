//! 클라이언트-서버 메시지 프로토콜 정의

use crate::error::QuizError;
use crate::quiz::QuizItem;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// 시그널링 메시지 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
    #[serde(other)]
    Unknown,
}

/// 클라이언트 → 서버 시그널링 봉투 (`data`는 종류별로 따로 디코딩)
#[derive(Debug, Clone, Deserialize)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// 서버 → 클라이언트 시그널링 메시지
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum SignalMessage {
    Answer(RTCSessionDescription),
    Candidate(RTCIceCandidateInit),
}

/// 문제 진행 상황 (1부터 시작)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// 서버 → 클라이언트 데이터 채널 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuizMessage {
    Question {
        id: i64,
        question: String,
        options: Vec<String>,
        duration: u64,
        progress: Progress,
    },
    Result {
        score: u32,
        /// 라운드 시작부터 경과한 밀리초
        time: i64,
    },
    End,
}

impl QuizMessage {
    /// `index`번째 문제 메시지 생성
    pub fn question(item: &QuizItem, index: usize, total: usize) -> Self {
        QuizMessage::Question {
            id: item.id,
            question: item.text.clone(),
            options: item.options.clone(),
            duration: item.duration_seconds,
            progress: Progress {
                current: index + 1,
                total,
            },
        }
    }
}

/// 클라이언트 → 서버 답안
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnswerPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    pub answer: i64,
    /// 클라이언트 측 응답 시간 (참고용)
    #[serde(default)]
    pub time: i64,
}

impl AnswerPayload {
    /// 데이터 채널 텍스트를 답안으로 디코딩
    pub fn parse(text: &str) -> Result<Self, QuizError> {
        let payload: AnswerPayload =
            serde_json::from_str(text).map_err(QuizError::MalformedAnswer)?;
        if payload.kind != "answer" {
            return Err(QuizError::UnexpectedType(payload.kind));
        }
        Ok(payload)
    }
}
