//! The incremental scoring engine: visibility, the score ledger, moves over it
//! and the guard that re-verifies it.

pub mod chain;
pub mod guard;
pub mod ledger;
pub mod moves;
pub mod visibility;

pub use guard::ConsistencyGuard;
pub use ledger::Ledger;
pub use moves::{Move, MoveKind};
