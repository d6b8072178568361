//! News-avoidance decisions.
//!
//! Every decision takes an explicit `now`. Store failures never surface as
//! errors: entry checks fail closed (avoid) and close checks fail open (keep
//! the position), with the error text carried in the reason.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::event::{EventSummary, NewsEvent};
use super::pair::{affects, relevant_currencies};
use super::store::{EventSnapshot, EventStore, StoreError};

/// Why trading is (or isn't) blocked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvoidanceDecision {
    pub avoid_trading: bool,
    pub reason: String,
    /// Blocking event still inside its post-news window.
    pub current_event: Option<EventSummary>,
    /// Blocking event inside its pre-news window.
    pub next_event: Option<EventSummary>,
    pub safe_to_trade_at: Option<DateTime<Utc>>,
}

impl AvoidanceDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            avoid_trading: false,
            reason: reason.into(),
            current_event: None,
            next_event: None,
            safe_to_trade_at: None,
        }
    }

    fn fail_closed(err: &StoreError) -> Self {
        Self {
            avoid_trading: true,
            reason: format!("Error checking news events: {err}"),
            current_event: None,
            next_event: None,
            safe_to_trade_at: None,
        }
    }
}

/// Whether open positions should be closed ahead of news.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseDecision {
    pub close_positions: bool,
    pub reason: String,
    pub next_event: Option<EventSummary>,
}

impl CloseDecision {
    fn keep(reason: impl Into<String>) -> Self {
        Self {
            close_positions: false,
            reason: reason.into(),
            next_event: None,
        }
    }
}

/// Entry and exit gating around scheduled high-impact releases.
pub struct NewsAvoidanceWindow {
    store: Arc<dyn EventStore>,
}

impl std::fmt::Debug for NewsAvoidanceWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsAvoidanceWindow").finish_non_exhaustive()
    }
}

impl NewsAvoidanceWindow {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    fn snapshot(&self) -> Result<Arc<EventSnapshot>, StoreError> {
        self.store.load_events()
    }

    /// Should new entries on `pair` be blocked at `now`?
    pub fn should_avoid_trading(&self, pair: &str, now: DateTime<Utc>) -> AvoidanceDecision {
        match self.snapshot() {
            Ok(snapshot) => avoid_decision(&snapshot, pair, now),
            Err(err) => {
                warn!(%err, pair, "news store unavailable, blocking entries");
                AvoidanceDecision::fail_closed(&err)
            }
        }
    }

    /// Should open positions on `pair` be closed at `now`?
    pub fn should_close_positions(&self, pair: &str, now: DateTime<Utc>) -> CloseDecision {
        match self.snapshot() {
            Ok(snapshot) => close_decision(&snapshot, pair, now),
            Err(err) => {
                warn!(%err, pair, "news store unavailable, keeping positions open");
                CloseDecision::keep(format!("Error checking news events: {err}"))
            }
        }
    }

    /// High-impact events in `[now, now + hours_ahead]`, soonest first,
    /// optionally limited to one currency.
    pub fn upcoming(
        &self,
        now: DateTime<Utc>,
        hours_ahead: u32,
        currency: Option<&str>,
    ) -> Result<Vec<EventSummary>, StoreError> {
        let snapshot = self.snapshot()?;
        // saturate instead of overflowing on absurd horizons
        let end = now
            .checked_add_signed(Duration::hours(i64::from(hours_ahead)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut events: Vec<&NewsEvent> = snapshot
            .events
            .iter()
            .filter(|e| e.impact.is_high())
            .filter(|e| e.event_time >= now && e.event_time <= end)
            .filter(|e| currency.map_or(true, |c| e.currency.eq_ignore_ascii_case(c)))
            .collect();
        events.sort_by_key(|e| e.event_time);
        Ok(events.into_iter().map(|e| e.summary(now)).collect())
    }
}

fn relevant_high_impact<'a>(
    snapshot: &'a EventSnapshot,
    pair: &str,
) -> impl Iterator<Item = &'a NewsEvent> {
    let currencies = relevant_currencies(pair);
    snapshot
        .events
        .iter()
        .filter(|e| e.impact.is_high())
        .filter(move |e| affects(&currencies, &e.currency))
}

fn avoid_decision(snapshot: &EventSnapshot, pair: &str, now: DateTime<Utc>) -> AvoidanceDecision {
    let settings = snapshot.settings;
    if !settings.enabled {
        return AvoidanceDecision::allow("News avoidance disabled");
    }
    let before = Duration::minutes(i64::from(settings.minutes_before));
    let after = Duration::minutes(i64::from(settings.minutes_after));

    let mut current: Option<&NewsEvent> = None;
    let mut next: Option<&NewsEvent> = None;
    for event in relevant_high_impact(snapshot, pair) {
        if event.event_time <= now {
            if now - event.event_time <= after
                && current.map_or(true, |c| event.event_time > c.event_time)
            {
                current = Some(event);
            }
        } else if event.event_time - now <= before
            && next.map_or(true, |n| event.event_time < n.event_time)
        {
            next = Some(event);
        }
    }

    if let Some(event) = current {
        let summary = event.summary(now);
        info!(
            title = %event.title,
            currency = %event.currency,
            minutes_ago = summary.minutes_ago(),
            "news avoidance active (post-news)"
        );
        return AvoidanceDecision {
            avoid_trading: true,
            reason: format!("Post-news waiting period for {}", event.title),
            current_event: Some(summary),
            next_event: None,
            safe_to_trade_at: event.event_time.checked_add_signed(after),
        };
    }

    if let Some(event) = next {
        let summary = event.summary(now);
        info!(
            title = %event.title,
            currency = %event.currency,
            minutes_until = summary.minutes_until,
            "news avoidance active (pre-news)"
        );
        return AvoidanceDecision {
            avoid_trading: true,
            reason: format!("Pre-news avoidance for {}", event.title),
            current_event: None,
            next_event: Some(summary),
            safe_to_trade_at: event.event_time.checked_add_signed(after),
        };
    }

    AvoidanceDecision::allow("No active news avoidance periods")
}

fn close_decision(snapshot: &EventSnapshot, pair: &str, now: DateTime<Utc>) -> CloseDecision {
    let settings = snapshot.settings;
    if !settings.enabled {
        return CloseDecision::keep("News avoidance disabled");
    }
    let horizon = Duration::minutes(i64::from(settings.minutes_before_close));

    let imminent = relevant_high_impact(snapshot, pair)
        .filter(|e| e.event_time > now && e.event_time - now <= horizon)
        .min_by_key(|e| e.event_time);

    match imminent {
        Some(event) => {
            let summary = event.summary(now);
            CloseDecision {
                close_positions: true,
                reason: format!(
                    "Close positions before {} in {} min",
                    event.title, summary.minutes_until
                ),
                next_event: Some(summary),
            }
        }
        None => CloseDecision::keep("No imminent news events"),
    }
}
