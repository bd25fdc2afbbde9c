//! 채점 / 라운드 시간 정책

use std::time::Duration;

/// 정답 시 점수 부여 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPolicy {
    /// 경과 시간과 무관하게 고정 점수
    Flat { points: u32 },
    /// 빠를수록 높은 점수 (최대값의 절반 ~ 전체)
    TimeWeighted { max_points: u32 },
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy::Flat { points: 10 }
    }
}

impl ScoringPolicy {
    /// 정답 한 건에 대한 점수
    pub fn points(&self, elapsed: Duration, allowed: Duration) -> u32 {
        match *self {
            ScoringPolicy::Flat { points } => points,
            ScoringPolicy::TimeWeighted { max_points } => {
                let floor = max_points / 2;
                if allowed.is_zero() || elapsed >= allowed {
                    return floor;
                }
                let remaining = (allowed - elapsed).as_millis();
                let bonus = u128::from(max_points - floor) * remaining / allowed.as_millis();
                floor + bonus as u32
            }
        }
    }
}

/// 라운드 제한 시간 강제 여부
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTimeoutPolicy {
    Disabled,
    Enforced { grace: Duration },
}

impl RoundTimeoutPolicy {
    /// 문제 제한 시간에 대한 서버 측 마감 (비활성이면 None)
    pub fn deadline(&self, duration: Duration) -> Option<Duration> {
        match *self {
            RoundTimeoutPolicy::Disabled => None,
            RoundTimeoutPolicy::Enforced { grace } => Some(duration + grace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_ignores_elapsed_time() {
        let policy = ScoringPolicy::default();
        let allowed = Duration::from_secs(10);
        assert_eq!(policy.points(Duration::ZERO, allowed), 10);
        assert_eq!(policy.points(Duration::from_secs(60), allowed), 10);
    }

    #[test]
    fn time_weighted_decays_to_half() {
        let policy = ScoringPolicy::TimeWeighted { max_points: 100 };
        let allowed = Duration::from_secs(10);
        assert_eq!(policy.points(Duration::ZERO, allowed), 100);
        assert_eq!(policy.points(Duration::from_secs(5), allowed), 75);
        assert_eq!(policy.points(Duration::from_secs(10), allowed), 50);
        assert_eq!(policy.points(Duration::from_secs(30), allowed), 50);
        assert_eq!(policy.points(Duration::ZERO, Duration::ZERO), 50);
    }

    #[test]
    fn deadline_includes_grace() {
        let duration = Duration::from_secs(10);
        assert_eq!(RoundTimeoutPolicy::Disabled.deadline(duration), None);
        assert_eq!(
            RoundTimeoutPolicy::Enforced {
                grace: Duration::from_secs(1)
            }
            .deadline(duration),
            Some(Duration::from_secs(11))
        );
    }
}
