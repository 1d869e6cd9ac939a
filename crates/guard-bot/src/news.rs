//! News calendar collaborator.
//!
//! The guard only asks one question of the news source: is a high-impact
//! window active right now. Fetching and caching a live calendar is not
//! done here; [`ScheduledNews`] answers from configured event times.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[cfg_attr(test, mockall::automock)]
pub trait NewsCalendar: Send + Sync {
    fn is_high_impact_window_active(&self, now: DateTime<Utc>) -> bool;
}

/// One scheduled high-impact release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsEvent {
    pub at: DateTime<Utc>,
    pub title: String,
}

/// Calendar of known events with a symmetric buffer.
#[derive(Debug, Clone)]
pub struct ScheduledNews {
    events: Vec<NewsEvent>,
    buffer: Duration,
}

impl ScheduledNews {
    pub fn new(events: Vec<NewsEvent>, buffer_minutes: u32) -> Self {
        Self {
            events,
            buffer: Duration::minutes(i64::from(buffer_minutes)),
        }
    }

    /// The event whose window contains `now`, if any.
    pub fn active_event(&self, now: DateTime<Utc>) -> Option<&NewsEvent> {
        self.events
            .iter()
            .find(|e| now >= e.at - self.buffer && now <= e.at + self.buffer)
    }
}

impl NewsCalendar for ScheduledNews {
    fn is_high_impact_window_active(&self, now: DateTime<Utc>) -> bool {
        self.active_event(now).is_some()
    }
}
