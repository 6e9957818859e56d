use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quality::Quality;

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const LAPSE_EASE_PENALTY: f64 = 0.20;
pub const MAX_INTERVAL_DAYS: i64 = 36_500;

const LAPSE_INTERVAL_DAYS: i64 = 1;
const FIRST_INTERVAL_DAYS: i64 = 1;
const SECOND_INTERVAL_DAYS: i64 = 6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("invalid quality rating: {0}")]
    InvalidQuality(i64),
    #[error("invalid review state: {0}")]
    InvalidState(String),
}

/// Scheduling state of one (learner, vocabulary item) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSchedule {
    pub ease_factor: f64,
    pub interval_days: i64,
    /// Consecutive acceptable reviews since the last lapse.
    pub repetitions: i64,
    pub next_review: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
}

impl ReviewSchedule {
    /// State of an item the learner has never reviewed: due immediately.
    pub fn new_at(now: DateTime<Utc>) -> Self {
        Self {
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 0,
            repetitions: 0,
            next_review: now,
            last_reviewed: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_review
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !self.ease_factor.is_finite() || self.ease_factor < MIN_EASE_FACTOR {
            return Err(SchedulerError::InvalidState(format!(
                "ease factor {} is below the floor of {MIN_EASE_FACTOR}",
                self.ease_factor
            )));
        }
        if !(0..=MAX_INTERVAL_DAYS).contains(&self.interval_days) {
            return Err(SchedulerError::InvalidState(format!(
                "interval of {} days is outside 0..={MAX_INTERVAL_DAYS}",
                self.interval_days
            )));
        }
        if self.repetitions < 0 {
            return Err(SchedulerError::InvalidState(format!(
                "repetition count {} is negative",
                self.repetitions
            )));
        }
        Ok(())
    }
}

/// Computes the schedule that follows a review rated `quality` at `now`.
///
/// Hard is a lapse: the streak resets, the item comes back tomorrow and the
/// ease factor drops by [`LAPSE_EASE_PENALTY`]. Good and Easy extend the
/// streak; the interval goes 1, 6, then grows by the adjusted ease factor.
/// The ease factor never falls below [`MIN_EASE_FACTOR`].
pub fn advance(
    state: &ReviewSchedule,
    quality: Quality,
    now: DateTime<Utc>,
) -> Result<ReviewSchedule, SchedulerError> {
    state.validate()?;

    let (ease_factor, interval_days, repetitions) = if quality.is_acceptable() {
        let ease = adjusted_ease(state.ease_factor, quality.sm2_grade());
        let repetitions = state.repetitions.checked_add(1).ok_or_else(|| {
            SchedulerError::InvalidState(format!(
                "repetition count {} cannot grow further",
                state.repetitions
            ))
        })?;
        let interval = success_interval(state.interval_days, repetitions, ease);
        (ease, interval, repetitions)
    } else {
        let ease = (state.ease_factor - LAPSE_EASE_PENALTY).max(MIN_EASE_FACTOR);
        (ease, LAPSE_INTERVAL_DAYS, 0)
    };

    let next_review = now
        .checked_add_signed(Duration::days(interval_days))
        .ok_or_else(|| {
            SchedulerError::InvalidState(format!(
                "next review {interval_days} days after {now} is out of range"
            ))
        })?;

    Ok(ReviewSchedule {
        ease_factor,
        interval_days,
        repetitions,
        next_review,
        last_reviewed: Some(now),
    })
}

fn adjusted_ease(ease: f64, grade: i64) -> f64 {
    let miss = (5 - grade) as f64;
    let delta = 0.1 - miss * (0.08 + miss * 0.02);
    (ease + delta).max(MIN_EASE_FACTOR)
}

fn success_interval(previous: i64, repetitions: i64, ease: f64) -> i64 {
    match repetitions {
        1 => FIRST_INTERVAL_DAYS,
        2 => SECOND_INTERVAL_DAYS,
        _ => {
            let scaled = (previous as f64 * ease).round();
            if scaled >= MAX_INTERVAL_DAYS as f64 {
                MAX_INTERVAL_DAYS
            } else {
                scaled as i64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn fresh_item_is_due_immediately() {
        let state = ReviewSchedule::new_at(at());
        assert!(state.is_due(at()));
        assert_eq!(state.interval_days, 0);
        assert_eq!(state.repetitions, 0);
        assert!(approx(state.ease_factor, 2.5));
        assert!(state.last_reviewed.is_none());
    }

    #[test]
    fn easy_on_fresh_item_schedules_tomorrow() {
        let now = at();
        let next = advance(&ReviewSchedule::new_at(now), Quality::Easy, now).unwrap();
        assert_eq!(next.repetitions, 1);
        assert_eq!(next.interval_days, 1);
        assert!(approx(next.ease_factor, 2.6));
        assert_eq!(next.next_review, now + Duration::days(1));
        assert_eq!(next.last_reviewed, Some(now));
    }

    #[test]
    fn good_lowers_ease_slightly() {
        let now = at();
        let next = advance(&ReviewSchedule::new_at(now), Quality::Good, now).unwrap();
        assert!(approx(next.ease_factor, 2.36));
        assert_eq!(next.interval_days, 1);
    }

    #[test]
    fn second_success_is_six_days() {
        let now = at();
        let state = ReviewSchedule {
            ease_factor: 2.5,
            interval_days: 1,
            repetitions: 1,
            next_review: now,
            last_reviewed: None,
        };
        let next = advance(&state, Quality::Easy, now).unwrap();
        assert_eq!(next.repetitions, 2);
        assert_eq!(next.interval_days, 6);
    }

    #[test]
    fn later_successes_scale_by_adjusted_ease() {
        let now = at();
        let state = ReviewSchedule {
            ease_factor: 2.5,
            interval_days: 6,
            repetitions: 2,
            next_review: now,
            last_reviewed: None,
        };
        let easy = advance(&state, Quality::Easy, now).unwrap();
        assert_eq!(easy.interval_days, 16);
        let good = advance(&state, Quality::Good, now).unwrap();
        assert_eq!(good.interval_days, 14);
        assert!(easy.interval_days > good.interval_days);
    }

    #[test]
    fn hard_resets_streak_and_penalises_ease() {
        let now = at();
        let state = ReviewSchedule {
            ease_factor: 2.5,
            interval_days: 30,
            repetitions: 5,
            next_review: now,
            last_reviewed: None,
        };
        let next = advance(&state, Quality::Hard, now).unwrap();
        assert_eq!(next.repetitions, 0);
        assert_eq!(next.interval_days, 1);
        assert!(approx(next.ease_factor, 2.3));
        assert_eq!(next.next_review, now + Duration::days(1));
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let now = at();
        let state = ReviewSchedule {
            ease_factor: MIN_EASE_FACTOR,
            ..ReviewSchedule::new_at(now)
        };
        let lapsed = advance(&state, Quality::Hard, now).unwrap();
        assert!(approx(lapsed.ease_factor, MIN_EASE_FACTOR));
        let good = advance(&state, Quality::Good, now).unwrap();
        assert!(approx(good.ease_factor, MIN_EASE_FACTOR));
    }

    #[test]
    fn interval_is_capped() {
        let now = at();
        let state = ReviewSchedule {
            ease_factor: 3.0,
            interval_days: 30_000,
            repetitions: 12,
            next_review: now,
            last_reviewed: Some(now),
        };
        let next = advance(&state, Quality::Easy, now).unwrap();
        assert_eq!(next.interval_days, MAX_INTERVAL_DAYS);
        let again = advance(&next, Quality::Easy, now).unwrap();
        assert_eq!(again.interval_days, MAX_INTERVAL_DAYS);
    }

    #[test]
    fn corrupt_inputs_are_rejected() {
        let now = at();
        let low_ease = ReviewSchedule {
            ease_factor: 1.2,
            ..ReviewSchedule::new_at(now)
        };
        assert!(matches!(
            advance(&low_ease, Quality::Good, now),
            Err(SchedulerError::InvalidState(_))
        ));

        let negative_interval = ReviewSchedule {
            interval_days: -3,
            ..ReviewSchedule::new_at(now)
        };
        assert!(matches!(
            advance(&negative_interval, Quality::Good, now),
            Err(SchedulerError::InvalidState(_))
        ));

        let nan_ease = ReviewSchedule {
            ease_factor: f64::NAN,
            ..ReviewSchedule::new_at(now)
        };
        assert!(nan_ease.validate().is_err());
    }

    #[test]
    fn interval_beyond_ceiling_is_rejected() {
        let now = at();
        let state = ReviewSchedule {
            interval_days: 50_000,
            repetitions: 5,
            ..ReviewSchedule::new_at(now)
        };
        assert!(matches!(
            advance(&state, Quality::Easy, now),
            Err(SchedulerError::InvalidState(_))
        ));
    }

    #[test]
    fn exhausted_repetition_count_is_rejected() {
        let now = at();
        let state = ReviewSchedule {
            interval_days: 10,
            repetitions: i64::MAX,
            ..ReviewSchedule::new_at(now)
        };
        assert!(matches!(
            advance(&state, Quality::Good, now),
            Err(SchedulerError::InvalidState(_))
        ));
        let lapsed = advance(&state, Quality::Hard, now).unwrap();
        assert_eq!(lapsed.repetitions, 0);
    }

    #[test]
    fn advance_is_deterministic() {
        let now = at();
        let state = ReviewSchedule::new_at(now);
        assert_eq!(
            advance(&state, Quality::Good, now).unwrap(),
            advance(&state, Quality::Good, now).unwrap()
        );
    }
}
