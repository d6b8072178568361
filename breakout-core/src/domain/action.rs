//! Actions emitted by the controller, one (or none) per candle.
//!
//! Actions are advisory: the execution layer decides whether and how to act
//! on them, and must never feed a failed execution back as if it happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Direction;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    SlHit,
    TpHit,
    /// Fixed exchange-time flatten (noon New York).
    LondonCloseFlat,
    /// Forced flat ahead of a scheduled high-impact release.
    NewsClose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterAction {
    pub direction: Direction,
    pub entry_price: f64,
    pub sl_price: f64,
    pub tp_price: f64,
    pub probe_number: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitAction {
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub pnl_pips: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSlAction {
    pub sl_price: f64,
    pub max_favorable_pips: f64,
    pub timestamp: DateTime<Utc>,
}

/// Trade-lifecycle action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Enter(EnterAction),
    Exit(ExitAction),
    UpdateSl(UpdateSlAction),
}

impl Action {
    pub fn is_enter(&self) -> bool {
        matches!(self, Action::Enter(_))
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Action::Exit(_))
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self {
            Action::Exit(exit) => Some(exit.exit_reason),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Action::Enter(a) => a.timestamp,
            Action::Exit(a) => a.timestamp,
            Action::UpdateSl(a) => a.timestamp,
        }
    }
}
