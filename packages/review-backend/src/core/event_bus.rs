use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const CHANNEL_CAPACITY: usize = 1024;

/// Notifications for downstream bookkeeping (XP, streaks). Consumers must
/// tolerate lag; the bus drops events for receivers that fall behind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ReviewEvent {
    #[serde(rename = "REVIEW_RECORDED")]
    ReviewRecorded(ReviewRecordedPayload),

    #[serde(rename = "REVIEW_ITEM_ADDED")]
    ReviewItemAdded(ReviewItemAddedPayload),
}

impl ReviewEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ReviewEvent::ReviewRecorded(_) => "REVIEW_RECORDED",
            ReviewEvent::ReviewItemAdded(_) => "REVIEW_ITEM_ADDED",
        }
    }

    pub fn learner_id(&self) -> &str {
        match self {
            ReviewEvent::ReviewRecorded(p) => &p.learner_id,
            ReviewEvent::ReviewItemAdded(p) => &p.learner_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecordedPayload {
    pub learner_id: String,
    pub item_id: String,
    pub vocab_id: String,
    /// Wire value of the grade (1, 3 or 5).
    pub quality: i64,
    pub repetitions: i64,
    pub interval_days: i64,
    pub ease_factor: f64,
    pub lapsed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItemAddedPayload {
    pub learner_id: String,
    pub item_id: String,
    pub vocab_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: String,
    pub event: ReviewEvent,
    pub created_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event: ReviewEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            created_at: Utc::now(),
        }
    }
}

type SubscriberId = String;

struct LearnerSubscriber {
    learner_id: String,
    sender: broadcast::Sender<EventEnvelope>,
}

pub struct EventBus {
    global_sender: broadcast::Sender<EventEnvelope>,
    learner_subscribers: RwLock<HashMap<SubscriberId, LearnerSubscriber>>,
    event_count: RwLock<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (global_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            global_sender,
            learner_subscribers: RwLock::new(HashMap::new()),
            event_count: RwLock::new(0),
        }
    }

    /// Fans the event out to every matching receiver. Having no receivers is
    /// normal and not reported as an error.
    pub async fn publish(&self, event: ReviewEvent) {
        let envelope = EventEnvelope::new(event);

        {
            let mut count = self.event_count.write().await;
            *count += 1;
        }

        let mut sent_count = 0usize;
        {
            let subscribers = self.learner_subscribers.read().await;
            for subscriber in subscribers.values() {
                if subscriber.learner_id == envelope.event.learner_id()
                    && subscriber.sender.send(envelope.clone()).is_ok()
                {
                    sent_count += 1;
                }
            }
        }

        if self.global_sender.send(envelope.clone()).is_err() {
            debug!("no global subscribers for event");
        }

        debug!(
            event_type = envelope.event.event_type(),
            learner_id = envelope.event.learner_id(),
            sent_to = sent_count,
            "event published"
        );
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.global_sender.subscribe()
    }

    /// Receiver that only sees events for one learner.
    pub async fn subscribe_learner(
        &self,
        learner_id: impl Into<String>,
    ) -> (SubscriberId, broadcast::Receiver<EventEnvelope>) {
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        let subscriber_id = uuid::Uuid::new_v4().to_string();

        self.learner_subscribers.write().await.insert(
            subscriber_id.clone(),
            LearnerSubscriber {
                learner_id: learner_id.into(),
                sender,
            },
        );

        debug!(subscriber_id = %subscriber_id, "learner subscription created");
        (subscriber_id, receiver)
    }

    pub async fn unsubscribe(&self, subscriber_id: &str) {
        if self
            .learner_subscribers
            .write()
            .await
            .remove(subscriber_id)
            .is_some()
        {
            debug!(subscriber_id = %subscriber_id, "subscription removed");
        }
    }

    pub async fn event_count(&self) -> u64 {
        *self.event_count.read().await
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(learner: &str) -> ReviewEvent {
        ReviewEvent::ReviewItemAdded(ReviewItemAddedPayload {
            learner_id: learner.to_string(),
            item_id: "item-1".to_string(),
            vocab_id: "vocab-1".to_string(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(added("a")).await;
        assert_eq!(bus.event_count().await, 1);
    }

    #[tokio::test]
    async fn learner_subscription_filters_other_learners() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.subscribe_learner("a").await;
        let mut global = bus.subscribe();

        bus.publish(added("b")).await;
        bus.publish(added("a")).await;

        let got = rx.recv().await.unwrap();
        assert_eq!(got.event.learner_id(), "a");
        assert!(rx.try_recv().is_err());

        assert_eq!(global.recv().await.unwrap().event.learner_id(), "b");
        assert_eq!(global.recv().await.unwrap().event.learner_id(), "a");

        bus.unsubscribe(&id).await;
        bus.publish(added("a")).await;
        assert!(rx.recv().await.is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(added("a")).unwrap();
        assert_eq!(json["type"], "REVIEW_ITEM_ADDED");
        assert_eq!(json["payload"]["learnerId"], "a");
    }
}
