//! News avoidance: scheduled high-impact releases, their storage, and the
//! entry/exit gates derived from them.

pub mod event;
pub mod pair;
pub mod store;
pub mod window;

pub use event::{
    parse_timestamp, EventSummary, Impact, NewEventRequest, NewsEvent, NewsSettings, SettingsPatch,
};
pub use pair::relevant_currencies;
pub use store::{EventSnapshot, EventStore, InMemoryEventStore, JsonFileEventStore, StoreError};
pub use window::{AvoidanceDecision, CloseDecision, NewsAvoidanceWindow};
