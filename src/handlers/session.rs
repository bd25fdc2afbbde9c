//! 데이터 채널 단위 퀴즈 세션 코디네이터
//!
//! 채널 콜백은 `ChannelEvent`를 큐에 넣기만 하고, 상태 변경은 모두
//! 플레이어당 하나인 코디네이터 태스크에서 순서대로 처리한다.

use crate::protocol::{AnswerPayload, QuizMessage};
use crate::state::{AppState, GradeOutcome};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{self, Instant};

/// 데이터 채널 수명주기 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingOpen,
    AwaitingAnswer { deadline: Option<Instant> },
    Finished,
}

/// 플레이어 한 명의 문제/답 루프
pub struct SessionCoordinator {
    state: Arc<AppState>,
    /// 방 세션 키 (연결 ID/채널 ID)
    player_id: String,
    /// 이 코디네이터가 등록한 세션의 세대
    generation: u64,
    outbound: UnboundedSender<QuizMessage>,
    phase: Phase,
    round_started: Instant,
}

impl SessionCoordinator {
    pub fn new(
        state: Arc<AppState>,
        player_id: String,
        generation: u64,
        outbound: UnboundedSender<QuizMessage>,
    ) -> Self {
        Self {
            state,
            player_id,
            generation,
            outbound,
            phase: Phase::AwaitingOpen,
            round_started: Instant::now(),
        }
    }

    /// 채널이 닫히거나 이벤트 송신측이 모두 사라질 때까지 실행
    pub async fn run(mut self, mut events: UnboundedReceiver<ChannelEvent>) {
        loop {
            let deadline = match self.phase {
                Phase::AwaitingAnswer { deadline } => deadline,
                _ => None,
            };

            tokio::select! {
                event = events.recv() => match event {
                    Some(ChannelEvent::Open) => self.on_open(),
                    Some(ChannelEvent::Message(text)) => self.on_message(&text).await,
                    Some(ChannelEvent::Close) | None => break,
                },
                _ = wait_until(deadline) => self.on_round_timeout().await,
            }
        }

        crate::handlers::handle_leave(&self.state, &self.player_id, self.generation);
    }

    fn on_open(&mut self) {
        tracing::info!(player_id = %self.player_id, "Player joined quiz");

        match self.state.room.reset_player(&self.player_id) {
            Some(first) => self.start_round(first),
            None => {
                tracing::warn!(player_id = %self.player_id, "Channel opened for a removed session");
                self.phase = Phase::Finished;
            }
        }
    }

    async fn on_message(&mut self, text: &str) {
        tracing::debug!(player_id = %self.player_id, payload = %text, "Message from player");

        if self.phase == Phase::AwaitingOpen {
            tracing::warn!(player_id = %self.player_id, "Answer before channel open, dropped");
            return;
        }

        let answer = match AnswerPayload::parse(text) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(player_id = %self.player_id, error = %e, "Dropped player message");
                return;
            }
        };

        let elapsed = self.round_started.elapsed();
        let scoring = self.state.config.quiz.scoring;
        match self
            .state
            .room
            .grade(&self.player_id, &answer, elapsed, scoring)
        {
            GradeOutcome::Graded { correct, score } => {
                tracing::info!(
                    player_id = %self.player_id,
                    question_id = answer.id,
                    correct = correct,
                    score = score,
                    "Answer graded"
                );
                self.send(QuizMessage::Result {
                    score,
                    time: elapsed.as_millis() as i64,
                });
                self.advance().await;
            }
            GradeOutcome::Stale { expected } => {
                tracing::warn!(
                    player_id = %self.player_id,
                    question_id = answer.id,
                    expected = expected,
                    "Stale answer ignored"
                );
            }
            GradeOutcome::Finished => {
                tracing::debug!(player_id = %self.player_id, "Answer after quiz end ignored");
            }
            GradeOutcome::UnknownPlayer => {
                tracing::warn!(player_id = %self.player_id, "Answer from unregistered player");
            }
        }
    }

    async fn on_round_timeout(&mut self) {
        let elapsed = self.round_started.elapsed();
        match self.state.room.skip_round(&self.player_id) {
            Some(score) => {
                tracing::info!(player_id = %self.player_id, "Round timed out");
                self.send(QuizMessage::Result {
                    score,
                    time: elapsed.as_millis() as i64,
                });
                self.advance().await;
            }
            None => self.phase = Phase::Finished,
        }
    }

    /// 페이싱 지연 후 다음 문제(또는 종료) 전송
    async fn advance(&mut self) {
        time::sleep(self.state.config.quiz.pacing_delay).await;

        match self.state.room.next_message(&self.player_id) {
            Some(message) => self.start_round(message),
            None => self.phase = Phase::Finished,
        }
    }

    fn start_round(&mut self, message: QuizMessage) {
        self.round_started = Instant::now();
        self.phase = match &message {
            QuizMessage::Question { duration, .. } => Phase::AwaitingAnswer {
                deadline: self
                    .state
                    .config
                    .quiz
                    .round_timeout
                    .deadline(time::Duration::from_secs(*duration))
                    .map(|limit| self.round_started + limit),
            },
            _ => {
                tracing::info!(player_id = %self.player_id, "Quiz finished");
                Phase::Finished
            }
        };
        self.send(message);
    }

    fn send(&self, message: QuizMessage) {
        if self.outbound.send(message).is_err() {
            tracing::debug!(player_id = %self.player_id, "Data channel writer gone");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
