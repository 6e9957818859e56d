use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use srs_engine::{Quality, SchedulerError};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::ReviewConfig;
use crate::core::event_bus::{ReviewItemAddedPayload, ReviewRecordedPayload};
use crate::core::{EventBus, ReviewEvent};
use crate::db::operations::{review_states, vocabulary};
use crate::db::Database;
use crate::models::{DueSet, ReviewState};

const CAS_BACKOFF_BASE_MS: u64 = 5;
const CAS_BACKOFF_MAX_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid quality rating: {0}")]
    InvalidQuality(i64),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("review item {0} belongs to another learner")]
    Forbidden(String),
    #[error("invalid review state: {0}")]
    InvalidState(String),
    #[error("store unavailable: {0}")]
    Transient(String),
    #[error("review session has no remaining items")]
    SessionComplete,
    #[error(transparent)]
    Sql(sqlx::Error),
}

impl ReviewError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReviewError::Transient(_))
    }
}

impl From<SchedulerError> for ReviewError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::InvalidQuality(value) => ReviewError::InvalidQuality(value),
            SchedulerError::InvalidState(message) => ReviewError::InvalidState(message),
        }
    }
}

impl From<sqlx::Error> for ReviewError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_sql(&err) {
            ReviewError::Transient(err.to_string())
        } else {
            ReviewError::Sql(err)
        }
    }
}

/// Pool exhaustion, lock contention and serialization failures clear up on
/// their own; everything else is reported as a store failure.
fn is_transient_sql(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            // SQLITE_BUSY, SQLITE_LOCKED, serialization_failure, deadlock_detected
            Some("5") | Some("6") | Some("40001") | Some("40P01")
        ),
        _ => false,
    }
}

/// Due-set selection and review submission over one store.
#[derive(Clone)]
pub struct ReviewService {
    db: Database,
    events: Arc<EventBus>,
    config: ReviewConfig,
}

impl ReviewService {
    pub fn new(db: Database, events: Arc<EventBus>, config: ReviewConfig) -> Self {
        Self { db, events, config }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    /// Items due for `learner_id` at `now`, most overdue first. Read-only.
    pub async fn select_due(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<DueSet, ReviewError> {
        let deadline = self.deadline();
        let page = self
            .guarded(deadline, review_states::select_due_page(
                &self.db,
                learner_id,
                now,
                limit.max(0),
            ))
            .await?;

        Ok(DueSet {
            due_items: page.items,
            total_due: page.total_due,
            total_items: page.total_items,
        })
    }

    /// Applies one rating to the learner's item and persists the result.
    ///
    /// The rating is validated before the store is touched. A concurrent
    /// writer on the same item causes a re-read and a fresh computation, so
    /// every committed submission builds on the one before it. Reads, swaps
    /// and backoff all share one `store_timeout` deadline.
    pub async fn submit_review(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: i64,
        now: DateTime<Utc>,
    ) -> Result<ReviewState, ReviewError> {
        let quality = Quality::from_wire(quality)?;
        let max_attempts = self.config.max_cas_attempts.max(1);
        let deadline = self.deadline();

        for attempt in 1..=max_attempts {
            let current = self
                .guarded(deadline, review_states::find_by_id(&self.db, item_id))
                .await?
                .ok_or_else(|| ReviewError::NotFound(format!("review item {item_id}")))?;

            if current.learner_id != learner_id {
                return Err(ReviewError::Forbidden(item_id.to_string()));
            }

            let mut next = current.advanced(quality, now)?;
            let swapped = self
                .guarded(
                    deadline,
                    review_states::compare_and_swap(&self.db, &next, current.version),
                )
                .await?;

            if swapped {
                next.version = current.version + 1;
                tracing::info!(
                    learner_id,
                    item_id,
                    quality = quality.as_str(),
                    repetitions = next.schedule.repetitions,
                    interval_days = next.schedule.interval_days,
                    attempt,
                    "review recorded"
                );
                self.publish_recorded(&next, quality, now).await;
                return Ok(next);
            }

            tracing::debug!(item_id, attempt, "review version conflict, retrying");
            if attempt < max_attempts {
                let wake = Instant::now() + backoff_delay(attempt);
                if wake >= deadline {
                    return Err(self.deadline_exceeded());
                }
                tokio::time::sleep_until(wake).await;
            }
        }

        tracing::warn!(item_id, attempts = max_attempts, "review contention not resolved");
        Err(ReviewError::Transient(format!(
            "review item {item_id} is being updated concurrently"
        )))
    }

    /// Returns the learner's record for `vocab_id`, creating the default one
    /// on first exposure. An existing record is returned unchanged.
    pub async fn ensure_review_state(
        &self,
        learner_id: &str,
        vocab_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReviewState, ReviewError> {
        let deadline = self.deadline();
        if self
            .guarded(deadline, vocabulary::find_vocabulary(&self.db, vocab_id))
            .await?
            .is_none()
        {
            return Err(ReviewError::NotFound(format!("vocabulary item {vocab_id}")));
        }

        let fresh = ReviewState::new(learner_id, vocab_id, now);
        let inserted = self
            .guarded(deadline, review_states::insert_if_absent(&self.db, &fresh))
            .await?;

        let state = self
            .guarded(deadline, review_states::find_by_pair(&self.db, learner_id, vocab_id))
            .await?
            .ok_or_else(|| {
                ReviewError::InvalidState(format!(
                    "review state for {learner_id}/{vocab_id} missing after insert"
                ))
            })?;

        if inserted {
            tracing::info!(learner_id, vocab_id, item_id = %state.id, "review item added");
            self.events
                .publish(ReviewEvent::ReviewItemAdded(ReviewItemAddedPayload {
                    learner_id: state.learner_id.clone(),
                    item_id: state.id.clone(),
                    vocab_id: state.vocab_id.clone(),
                    timestamp: now,
                }))
                .await;
        }

        Ok(state)
    }

    async fn publish_recorded(&self, state: &ReviewState, quality: Quality, now: DateTime<Utc>) {
        self.events
            .publish(ReviewEvent::ReviewRecorded(ReviewRecordedPayload {
                learner_id: state.learner_id.clone(),
                item_id: state.id.clone(),
                vocab_id: state.vocab_id.clone(),
                quality: quality.wire_value(),
                repetitions: state.schedule.repetitions,
                interval_days: state.schedule.interval_days,
                ease_factor: state.schedule.ease_factor,
                lapsed: !quality.is_acceptable(),
                timestamp: now,
            }))
            .await;
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.store_timeout
    }

    fn deadline_exceeded(&self) -> ReviewError {
        ReviewError::Transient(format!(
            "store deadline of {}ms exceeded",
            self.config.store_timeout.as_millis()
        ))
    }

    /// Runs one store call against the operation's deadline. A call that
    /// would start after the deadline is never issued.
    async fn guarded<T, F>(&self, deadline: Instant, fut: F) -> Result<T, ReviewError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        if Instant::now() >= deadline {
            return Err(self.deadline_exceeded());
        }
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result.map_err(ReviewError::from),
            Err(_) => Err(self.deadline_exceeded()),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = CAS_BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(6));
    let ceiling = exp.min(CAS_BACKOFF_MAX_MS);
    let jitter = rand::rng().random_range(0..=ceiling);
    Duration::from_millis(ceiling / 2 + jitter / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_errors_map_onto_review_errors() {
        assert!(matches!(
            ReviewError::from(SchedulerError::InvalidQuality(2)),
            ReviewError::InvalidQuality(2)
        ));
        assert!(matches!(
            ReviewError::from(SchedulerError::InvalidState("ease".into())),
            ReviewError::InvalidState(_)
        ));
    }

    #[test]
    fn pool_timeout_is_transient() {
        let err = ReviewError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        assert!(!ReviewError::from(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn backoff_stays_under_ceiling() {
        for attempt in 1..=10 {
            let delay = backoff_delay(attempt);
            assert!(delay <= Duration::from_millis(CAS_BACKOFF_MAX_MS));
        }
        assert!(backoff_delay(1) <= Duration::from_millis(CAS_BACKOFF_BASE_MS));
    }

    async fn service_with_timeout(dir: &std::path::Path, store_timeout: Duration) -> ReviewService {
        let db = Database::connect(&crate::config::DatabaseConfig::sqlite(dir.join("review.db")))
            .await
            .unwrap();
        let config = ReviewConfig {
            store_timeout,
            ..ReviewConfig::default()
        };
        ReviewService::new(db, Arc::new(EventBus::new()), config)
    }

    #[tokio::test]
    async fn store_calls_share_one_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_timeout(dir.path(), Duration::from_millis(300)).await;
        let deadline = service.deadline();

        let slow = || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, sqlx::Error>(())
        };

        service.guarded(deadline, slow()).await.unwrap();
        let second = service.guarded(deadline, slow()).await;
        assert!(matches!(second, Err(ReviewError::Transient(_))));
        assert!(Instant::now() < deadline + Duration::from_millis(150));
    }

    #[tokio::test]
    async fn expired_deadline_skips_the_call() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_timeout(dir.path(), Duration::ZERO).await;
        let issued = std::sync::atomic::AtomicBool::new(false);

        let result = service
            .guarded(service.deadline(), async {
                issued.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, sqlx::Error>(())
            })
            .await;

        assert!(matches!(result, Err(ReviewError::Transient(_))));
        assert!(!issued.load(std::sync::atomic::Ordering::SeqCst));
    }
}
