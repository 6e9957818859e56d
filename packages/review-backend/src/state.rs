use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::config::Config;
use crate::core::EventBus;
use crate::db::Database;
use crate::services::ReviewService;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    config: Arc<Config>,
    db: Database,
    events: Arc<EventBus>,
    review: ReviewService,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        let events = Arc::new(EventBus::new());
        let review = ReviewService::new(db.clone(), Arc::clone(&events), config.review.clone());
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            config: Arc::new(config),
            db,
            events,
            review,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn review(&self) -> &ReviewService {
        &self.review
    }
}
