//! Domain types shared by every engine component.

pub mod action;
pub mod candle;
pub mod direction;

pub use action::{Action, EnterAction, ExitAction, ExitReason, UpdateSlAction};
pub use candle::Candle;
pub use direction::{to_pips, Direction};
