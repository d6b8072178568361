/// Position management: tiered trailing stops under a ratchet invariant
///
/// **Key Design Principles:**
/// 1. **Ratchet invariant**: stops may tighten, never loosen
/// 2. Stop-before-target is an explicit, named intrabar policy
/// 3. Actions are advisory; the manager never assumes a fill happened
///
/// **Module Structure:**
/// - `ratchet`: stop ratchet enforcement
/// - `path_policy`: intrabar stop/target ordering
/// - `manager`: position lifecycle (enter, manage, close)
pub mod manager;
pub mod path_policy;
pub mod ratchet;

pub use manager::{quantize, PositionManager, PositionState};
pub use path_policy::{IntrabarHit, IntrabarPolicy};
pub use ratchet::RatchetState;
