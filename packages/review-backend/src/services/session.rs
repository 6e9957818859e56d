use chrono::{DateTime, Utc};

use crate::models::{DueItem, ReviewState};
use crate::services::review::{ReviewError, ReviewService};

/// A learner's pass over their due items.
///
/// The cursor lives only in this value. Starting again rebuilds the queue
/// from the store, so items already reviewed drop out once they are no
/// longer due.
pub struct ReviewSession {
    service: ReviewService,
    learner_id: String,
    items: Vec<DueItem>,
    total_due: i64,
    cursor: usize,
    reviewed: Vec<ReviewState>,
}

impl ReviewSession {
    pub async fn start(
        service: ReviewService,
        learner_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, ReviewError> {
        let learner_id = learner_id.into();
        let limit = service.config().session_limit;
        let due = service.select_due(&learner_id, now, limit).await?;

        tracing::debug!(
            learner_id = %learner_id,
            queued = due.due_items.len(),
            total_due = due.total_due,
            "review session started"
        );

        Ok(Self {
            service,
            learner_id,
            items: due.due_items,
            total_due: due.total_due,
            cursor: 0,
            reviewed: Vec::new(),
        })
    }

    pub fn learner_id(&self) -> &str {
        &self.learner_id
    }

    pub fn current(&self) -> Option<&DueItem> {
        self.items.get(self.cursor)
    }

    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.cursor)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.items.len()
    }

    /// Due count at the moment the session was started, including items
    /// beyond the queued page.
    pub fn total_due(&self) -> i64 {
        self.total_due
    }

    pub fn reviewed(&self) -> &[ReviewState] {
        &self.reviewed
    }

    /// Rates the current item. The cursor only moves when the new state has
    /// been persisted; on error the same item stays current.
    pub async fn submit(
        &mut self,
        quality: i64,
        now: DateTime<Utc>,
    ) -> Result<ReviewState, ReviewError> {
        let item_id = match self.current() {
            Some(item) => item.srs_item.id.clone(),
            None => return Err(ReviewError::SessionComplete),
        };

        let updated = self
            .service
            .submit_review(&self.learner_id, &item_id, quality, now)
            .await?;

        self.cursor += 1;
        self.reviewed.push(updated.clone());
        Ok(updated)
    }
}
