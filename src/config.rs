//! 환경 변수 기반 설정 관리

use std::env;
use std::time::Duration;

use crate::quiz::{RoundTimeoutPolicy, ScoringPolicy};

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    /// 피어 연결에 사용할 ICE 서버 URL 목록
    pub ice_servers: Vec<String>,
    /// 루프백 주소도 ICE 후보로 수집 (로컬 개발용)
    pub ice_include_loopback: bool,
    pub quiz: QuizConfig,
    pub log_level: String,
}

/// 퀴즈 진행 설정
#[derive(Debug, Clone)]
pub struct QuizConfig {
    /// 문제 은행 JSON 파일 (없으면 내장 문제 사용)
    pub questions_file: Option<String>,
    /// 결과 전송 후 다음 문제까지의 지연
    pub pacing_delay: Duration,
    pub scoring: ScoringPolicy,
    pub round_timeout: RoundTimeoutPolicy,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            questions_file: None,
            pacing_delay: Duration::from_millis(500),
            scoring: ScoringPolicy::default(),
            round_timeout: RoundTimeoutPolicy::Disabled,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            ice_include_loopback: false,
            quiz: QuizConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let points = env::var("POINTS_PER_CORRECT")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            ice_servers: parse_list(
                &env::var("ICE_SERVERS")
                    .unwrap_or_else(|_| "stun:stun.l.google.com:19302".to_string()),
            ),
            ice_include_loopback: env::var("ICE_INCLUDE_LOOPBACK")
                .map(|v| v == "true")
                .unwrap_or(false),
            quiz: QuizConfig {
                questions_file: env::var("QUESTIONS_FILE").ok().filter(|s| !s.is_empty()),
                pacing_delay: Duration::from_millis(
                    env::var("PACING_DELAY_MS")
                        .unwrap_or_else(|_| "500".to_string())
                        .parse()
                        .unwrap_or(500),
                ),
                scoring: match env::var("SCORING_MODE").as_deref() {
                    Ok("time") => ScoringPolicy::TimeWeighted { max_points: points },
                    _ => ScoringPolicy::Flat { points },
                },
                round_timeout: if env::var("ROUND_TIMEOUT")
                    .map(|v| v == "true")
                    .unwrap_or(false)
                {
                    RoundTimeoutPolicy::Enforced {
                        grace: Duration::from_millis(
                            env::var("ROUND_GRACE_MS")
                                .unwrap_or_else(|_| "1000".to_string())
                                .parse()
                                .unwrap_or(1000),
                        ),
                    }
                } else {
                    RoundTimeoutPolicy::Disabled
                },
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_skips_blank_entries() {
        let urls = parse_list(" stun:a:3478, ,turn:b:3478 ,");
        assert_eq!(urls, vec!["stun:a:3478", "turn:b:3478"]);
    }

    #[test]
    fn defaults_match_source_behavior() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.quiz.pacing_delay, Duration::from_millis(500));
        assert_eq!(config.quiz.scoring, ScoringPolicy::Flat { points: 10 });
        assert_eq!(config.quiz.round_timeout, RoundTimeoutPolicy::Disabled);
    }
}
