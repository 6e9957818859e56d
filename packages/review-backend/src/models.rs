use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use srs_engine::{advance, Quality, ReviewSchedule, SchedulerError};

/// A vocabulary entry owned by the content side. Read-only here.
///
/// Field names on the wire follow the review UI, which predates the move to a
/// language-neutral model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyItem {
    pub id: String,
    #[serde(rename = "teluguWord", alias = "targetText")]
    pub target_text: String,
    pub transliteration: Option<String>,
    #[serde(rename = "englishMeaning", alias = "meaning")]
    pub meaning: String,
    pub example_sentence: Option<String>,
}

/// Scheduling record for one (learner, vocabulary item) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub id: String,
    pub learner_id: String,
    pub vocab_id: String,
    #[serde(flatten)]
    pub schedule: ReviewSchedule,
    /// Bumped by the store on every committed write.
    #[serde(skip)]
    pub version: i64,
}

impl ReviewState {
    pub fn new(learner_id: &str, vocab_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            vocab_id: vocab_id.to_string(),
            schedule: ReviewSchedule::new_at(now),
            version: 0,
        }
    }

    /// Same record with the schedule moved forward by one review.
    pub fn advanced(&self, quality: Quality, now: DateTime<Utc>) -> Result<Self, SchedulerError> {
        Ok(Self {
            schedule: advance(&self.schedule, quality, now)?,
            ..self.clone()
        })
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_due(now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DueItem {
    pub srs_item: ReviewState,
    pub vocabulary: VocabularyItem,
}

#[derive(Debug, Clone, Serialize)]
pub struct DueSet {
    pub due_items: Vec<DueItem>,
    pub total_due: i64,
    pub total_items: i64,
}

impl DueSet {
    pub fn is_caught_up(&self) -> bool {
        self.total_due == 0
    }
}

/// Outcome of a single submission, as returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewResult {
    pub item_id: String,
    pub next_review: DateTime<Utc>,
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetitions: i64,
}

impl From<&ReviewState> for ReviewResult {
    fn from(state: &ReviewState) -> Self {
        Self {
            item_id: state.id.clone(),
            next_review: state.schedule.next_review,
            interval_days: state.schedule.interval_days,
            ease_factor: state.schedule.ease_factor,
            repetitions: state.schedule.repetitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_state_serializes_camel_case_without_version() {
        let now = Utc::now();
        let state = ReviewState::new("learner-1", "vocab-1", now);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["learnerId"], "learner-1");
        assert_eq!(json["vocabId"], "vocab-1");
        assert_eq!(json["easeFactor"], 2.5);
        assert_eq!(json["intervalDays"], 0);
        assert_eq!(json["repetitions"], 0);
        assert!(json["nextReview"].is_string());
        assert!(json["lastReviewed"].is_null());
        assert!(json.get("version").is_none());
    }

    #[test]
    fn vocabulary_uses_ui_field_names() {
        let item = VocabularyItem {
            id: "v1".to_string(),
            target_text: "పుస్తకం".to_string(),
            transliteration: Some("pustakam".to_string()),
            meaning: "book".to_string(),
            example_sentence: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["teluguWord"], "పుస్తకం");
        assert_eq!(json["englishMeaning"], "book");
        assert!(json["exampleSentence"].is_null());

        let parsed: VocabularyItem = serde_json::from_value(serde_json::json!({
            "id": "v2",
            "targetText": "నీరు",
            "meaning": "water",
            "transliteration": null,
            "exampleSentence": null
        }))
        .unwrap();
        assert_eq!(parsed.target_text, "నీరు");
        assert_eq!(parsed.meaning, "water");
    }

    #[test]
    fn advanced_keeps_identity() {
        let now = Utc::now();
        let state = ReviewState::new("learner-1", "vocab-1", now);
        let next = state.advanced(Quality::Good, now).unwrap();
        assert_eq!(next.id, state.id);
        assert_eq!(next.learner_id, state.learner_id);
        assert_eq!(next.version, state.version);
        assert_eq!(next.schedule.repetitions, 1);
        assert!(!next.is_due(now));
    }
}
