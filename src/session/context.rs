//! Sliding-window tally of recent classification outcomes
//!
//! Captures temporal locality: a user dropping five physics papers into the
//! inbox within a few minutes makes the sixth one likely to be physics too.
//!
//! Events older than the window are purged lazily on read; there is no
//! background sweep.

use crate::config::{SessionConfig, MAX_RETENTION_SECS};
use crate::types::{Vote, UNKNOWN};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One completed classification observed by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub category: String,
    pub observed_at: DateTime<Utc>,
}

/// Time-windowed category tally for one session shard.
pub struct SessionContext {
    /// Chronological: front = oldest
    events: Arc<RwLock<VecDeque<SessionEvent>>>,
    window: Duration,
    confidence: f64,
    max_events: usize,
}

impl SessionContext {
    /// Voter id used by session votes.
    pub const VOTER_ID: &'static str = crate::config::voter_ids::SESSION;

    /// Create a session context from configuration.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            events: Arc::new(RwLock::new(VecDeque::new())),
            window: Duration::seconds(config.window_secs.min(MAX_RETENTION_SECS) as i64),
            confidence: config.confidence,
            max_events: config.max_events.max(1),
        }
    }

    /// Append an outcome. `Unknown` outcomes carry no locality signal and
    /// are ignored.
    pub async fn record(&self, category: &str, now: DateTime<Utc>) {
        if category.is_empty() || category == UNKNOWN {
            return;
        }
        let mut events = self.events.write().await;
        events.push_back(SessionEvent {
            category: category.to_string(),
            observed_at: now,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    /// Count events with `observed_at > now - window`, per category.
    ///
    /// Events at or before the cutoff are purged.
    pub async fn context(&self, now: DateTime<Utc>) -> BTreeMap<String, usize> {
        let events = self.live_events(now).await;
        let mut counts = BTreeMap::new();
        for event in &events {
            *counts.entry(event.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Vote for the dominant category in the window with the fixed session
    /// confidence, or abstain when the window is empty.
    ///
    /// Ties on count go to the category whose most recent event is the
    /// earliest, then alphabetically.
    pub async fn vote(&self, now: DateTime<Utc>) -> Vote {
        let events = self.live_events(now).await;
        if events.is_empty() {
            return Vote::abstain(Self::VOTER_ID);
        }

        // category -> (count, most recent observation)
        let mut tally: BTreeMap<&str, (usize, DateTime<Utc>)> = BTreeMap::new();
        for event in &events {
            let entry = tally
                .entry(event.category.as_str())
                .or_insert((0, event.observed_at));
            entry.0 += 1;
            if event.observed_at > entry.1 {
                entry.1 = event.observed_at;
            }
        }

        let mut best: Option<(&str, usize, DateTime<Utc>)> = None;
        for (category, (count, latest)) in tally {
            best = match best {
                None => Some((category, count, latest)),
                Some((_, best_count, best_latest))
                    if count > best_count || (count == best_count && latest < best_latest) =>
                {
                    Some((category, count, latest))
                }
                keep => keep,
            };
        }

        match best {
            Some((category, count, _)) => {
                tracing::debug!(
                    "Session context: {} recent events, dominant '{}' ({})",
                    events.len(),
                    category,
                    count
                );
                Vote::new(Self::VOTER_ID, category, self.confidence)
            }
            None => Vote::abstain(Self::VOTER_ID),
        }
    }

    /// Observation time of the newest retained event.
    pub async fn latest(&self) -> Option<DateTime<Utc>> {
        self.events.read().await.iter().map(|e| e.observed_at).max()
    }

    /// Number of retained events (including not-yet-purged stale ones).
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether no events are retained.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Purge stale events and return a copy of the live ones.
    async fn live_events(&self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        let mut events = self.events.write().await;
        // A window reaching past the earliest representable time keeps everything
        let Some(cutoff) = now.checked_sub_signed(self.window) else {
            return events.iter().cloned().collect();
        };
        while events
            .front()
            .map(|e| e.observed_at <= cutoff)
            .unwrap_or(false)
        {
            events.pop_front();
        }
        // Out-of-order timestamps can leave stale events behind the front
        events.retain(|e| e.observed_at > cutoff);
        events.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SessionContext {
        SessionContext::new(&SessionConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_recency_window_boundary() {
        let session = ctx();
        let t = t0();
        session.record("Academic", t).await;

        let inside = session.context(t + Duration::seconds(299)).await;
        assert_eq!(inside.get("Academic"), Some(&1));

        let outside = session.context(t + Duration::seconds(301)).await;
        assert!(outside.is_empty());
    }

    #[tokio::test]
    async fn test_event_exactly_at_cutoff_excluded() {
        let session = ctx();
        let t = t0();
        session.record("Academic", t).await;
        assert!(session.context(t + Duration::seconds(300)).await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_events_purged_on_read() {
        let session = ctx();
        let t = t0();
        session.record("Code", t).await;
        session.record("Code", t + Duration::seconds(200)).await;
        assert_eq!(session.len().await, 2);

        session.context(t + Duration::seconds(350)).await;
        assert_eq!(session.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_session_abstains() {
        let session = ctx();
        let vote = session.vote(t0()).await;
        assert!(vote.is_abstention());
        assert_eq!(vote.voter_id, "session");
    }

    #[tokio::test]
    async fn test_unknown_not_recorded() {
        let session = ctx();
        session.record(UNKNOWN, t0()).await;
        assert!(session.is_empty().await);
    }

    #[tokio::test]
    async fn test_vote_dominant_category_fixed_confidence() {
        let session = ctx();
        let t = t0();
        session.record("Finance", t).await;
        session.record("Academic", t + Duration::seconds(1)).await;
        session.record("Academic", t + Duration::seconds(2)).await;

        let vote = session.vote(t + Duration::seconds(3)).await;
        assert_eq!(vote.category, "Academic");
        assert_eq!(vote.confidence, 0.7);
    }

    #[tokio::test]
    async fn test_tie_break_earliest_latest_event() {
        let session = ctx();
        let t = t0();
        // Code's most recent event (t+3) precedes Academic's (t+4)
        session.record("Academic", t).await;
        session.record("Code", t + Duration::seconds(1)).await;
        session.record("Code", t + Duration::seconds(3)).await;
        session.record("Academic", t + Duration::seconds(4)).await;

        let vote = session.vote(t + Duration::seconds(5)).await;
        assert_eq!(vote.category, "Code");
    }

    #[tokio::test]
    async fn test_tie_break_same_timestamp_alphabetical() {
        let session = ctx();
        let t = t0();
        session.record("Zeta", t).await;
        session.record("Alpha", t).await;

        let vote = session.vote(t + Duration::seconds(1)).await;
        assert_eq!(vote.category, "Alpha");
    }

    #[tokio::test]
    async fn test_window_past_earliest_time_keeps_everything() {
        let session = SessionContext::new(&SessionConfig {
            window_secs: u64::MAX,
            ..Default::default()
        });
        let earliest = DateTime::<Utc>::MIN_UTC;
        session.record("Code", earliest).await;

        let counts = session.context(earliest + Duration::seconds(1)).await;
        assert_eq!(counts.get("Code"), Some(&1));

        // The window is clamped, so a present-day clock still purges
        assert!(session.context(t0()).await.is_empty());
    }

    #[tokio::test]
    async fn test_max_events_cap() {
        let session = SessionContext::new(&SessionConfig {
            max_events: 3,
            ..Default::default()
        });
        let t = t0();
        for i in 0..5 {
            session.record("Images", t + Duration::seconds(i)).await;
        }
        assert_eq!(session.len().await, 3);
    }
}
