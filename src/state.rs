//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::protocol::{AnswerPayload, QuizMessage};
use crate::quiz::{QuestionBank, QuizItem, ScoringPolicy};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 퀴즈 방 (프로세스 전체에서 하나)
    pub room: Room,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, questions: QuestionBank) -> Self {
        Self {
            room: Room::new(Arc::new(questions)),
            config: Arc::new(config),
        }
    }
}

/// 데이터 채널별 세션 기록
#[derive(Debug, Clone)]
pub struct PlayerSession {
    /// 이 채널이 속한 시그널링 연결
    pub connection_id: String,
    /// 등록할 때마다 새로 발급 (같은 키로 다시 등록되면 이전 소유자 무효)
    pub generation: u64,
    /// 이 플레이어가 풀고 있는 문제 인덱스 (`questions.len()`이면 종료)
    pub current: usize,
    /// 한 세션 안에서 감소하지 않음
    pub score: u32,
    pub joined_at: Instant,
}

impl PlayerSession {
    fn new(connection_id: String, generation: u64) -> Self {
        Self {
            connection_id,
            generation,
            current: 0,
            score: 0,
            joined_at: Instant::now(),
        }
    }
}

/// 채점 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeOutcome {
    Graded { correct: bool, score: u32 },
    /// 현재 문제와 다른 id에 대한 답안
    Stale { expected: i64 },
    /// 이미 마지막 문제를 지남
    Finished,
    UnknownPlayer,
}

/// 공유 방 상태: 플레이어 세션 목록 + 문제 은행
///
/// 세션 읽기/쓰기는 모두 `read_player` / `update_player`를 거치며
/// 항목 락은 클로저 범위 동안만 유지된다. 클로저 안에서 전송하지 말 것.
pub struct Room {
    players: DashMap<String, PlayerSession>,
    questions: Arc<QuestionBank>,
    next_generation: AtomicU64,
}

impl Room {
    pub fn new(questions: Arc<QuestionBank>) -> Self {
        Self {
            players: DashMap::new(),
            questions,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn questions(&self) -> &QuestionBank {
        &self.questions
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// 연결과 같은 키로 플레이어 등록
    pub fn join(&self, player_id: &str) -> u64 {
        self.join_channel(player_id, player_id)
    }

    /// 세션 등록 (이미 있으면 새 세션으로 교체) 후 세대 번호 반환
    pub fn join_channel(&self, key: &str, connection_id: &str) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.players.insert(
            key.to_string(),
            PlayerSession::new(connection_id.to_string(), generation),
        );
        generation
    }

    /// 세대가 일치할 때만 제거 (다른 소유자가 다시 등록한 세션은 유지)
    pub fn leave(&self, key: &str, generation: u64) -> Option<PlayerSession> {
        self.players
            .remove_if(key, |_, session| session.generation == generation)
            .map(|(_, session)| session)
    }

    /// 연결에 속한 모든 세션 제거
    pub fn leave_connection(&self, connection_id: &str) -> usize {
        let before = self.players.len();
        self.players
            .retain(|_, session| session.connection_id != connection_id);
        before.saturating_sub(self.players.len())
    }

    pub fn read_player<R>(&self, player_id: &str, f: impl FnOnce(&PlayerSession) -> R) -> Option<R> {
        self.players.get(player_id).map(|session| f(&session))
    }

    pub fn update_player<R>(
        &self,
        player_id: &str,
        f: impl FnOnce(&mut PlayerSession) -> R,
    ) -> Option<R> {
        self.players.get_mut(player_id).map(|mut session| f(&mut session))
    }

    /// 채널 open 시 해당 플레이어만 처음으로 되돌리고 첫 메시지 반환
    pub fn reset_player(&self, player_id: &str) -> Option<QuizMessage> {
        let index = self.update_player(player_id, |session| {
            session.current = 0;
            session.score = 0;
            session.current
        })?;
        Some(self.message_at(index))
    }

    /// 현재 인덱스의 문제 또는 종료 메시지
    pub fn next_message(&self, player_id: &str) -> Option<QuizMessage> {
        let index = self.read_player(player_id, |session| session.current)?;
        Some(self.message_at(index))
    }

    /// 현재 진행 중인 문제 (종료됐으면 None)
    pub fn current_item(&self, player_id: &str) -> Option<QuizItem> {
        let index = self.read_player(player_id, |session| session.current)?;
        self.questions.get(index).cloned()
    }

    /// 답안 채점 후 다음 문제로 진행
    pub fn grade(
        &self,
        player_id: &str,
        answer: &AnswerPayload,
        elapsed: Duration,
        scoring: ScoringPolicy,
    ) -> GradeOutcome {
        let questions = &self.questions;
        self.update_player(player_id, |session| {
            let Some(item) = questions.get(session.current) else {
                return GradeOutcome::Finished;
            };
            if item.id != answer.id {
                return GradeOutcome::Stale { expected: item.id };
            }

            let correct = item.is_correct(answer.answer);
            if correct {
                session.score = session
                    .score
                    .saturating_add(scoring.points(elapsed, item.duration()));
            }
            session.current += 1;
            GradeOutcome::Graded {
                correct,
                score: session.score,
            }
        })
        .unwrap_or(GradeOutcome::UnknownPlayer)
    }

    /// 시간 초과된 라운드를 무응답으로 종료 (점수 그대로, 인덱스만 진행)
    pub fn skip_round(&self, player_id: &str) -> Option<u32> {
        let total = self.questions.len();
        self.update_player(player_id, |session| {
            if session.current >= total {
                return None;
            }
            session.current += 1;
            Some(session.score)
        })
        .flatten()
    }

    fn message_at(&self, index: usize) -> QuizMessage {
        match self.questions.get(index) {
            Some(item) => QuizMessage::question(item, index, self.questions.len()),
            None => QuizMessage::End,
        }
    }
}
