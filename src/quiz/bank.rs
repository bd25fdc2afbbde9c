//! 문제 은행

use crate::error::QuizError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 퀴즈 문제 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizItem {
    pub id: i64,
    pub text: String,
    /// 표시 순서 = 선택지 인덱스
    pub options: Vec<String>,
    pub correct_index: usize,
    pub duration_seconds: u64,
}

impl QuizItem {
    pub fn is_correct(&self, answer: i64) -> bool {
        usize::try_from(answer).map_or(false, |a| a == self.correct_index)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }
}

/// 순서가 있는 불변 문제 목록
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    items: Vec<QuizItem>,
}

impl QuestionBank {
    pub fn new(items: Vec<QuizItem>) -> Result<Self, QuizError> {
        for item in &items {
            if item.options.is_empty() {
                return Err(QuizError::InvalidQuestion {
                    id: item.id,
                    reason: "no options".to_string(),
                });
            }
            if item.correct_index >= item.options.len() {
                return Err(QuizError::InvalidQuestion {
                    id: item.id,
                    reason: format!(
                        "correct index {} out of range for {} options",
                        item.correct_index,
                        item.options.len()
                    ),
                });
            }
        }
        Ok(Self { items })
    }

    /// JSON 파일에서 문제 은행 로드
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, QuizError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| QuizError::BankRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, QuizError> {
        let items: Vec<QuizItem> = serde_json::from_str(raw).map_err(QuizError::BankParse)?;
        Self::new(items)
    }

    /// 내장 기본 문제
    pub fn builtin() -> Self {
        let item = |id: i64, text: &str, options: [&str; 3]| QuizItem {
            id,
            text: text.to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_index: 0,
            duration_seconds: 10,
        };

        Self {
            items: vec![
                item(
                    1,
                    "What does CPU stand for?",
                    [
                        "Central Processing Unit",
                        "Computer Personal Unit",
                        "Control Processing Unit",
                    ],
                ),
                item(
                    2,
                    "What is RAM used for?",
                    ["Temporary storage", "Permanent storage", "CPU processing"],
                ),
                item(
                    3,
                    "What does OS stand for?",
                    ["Operating System", "Open Software", "Optimal System"],
                ),
            ],
        }
    }

    pub fn get(&self, index: usize) -> Option<&QuizItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
