//! pressure-bot/crates/pb-core/src/lib.rs
//!
//! The pressure-scoring engine and the interfaces its collaborators implement.

pub mod error;
pub mod intake;
pub mod ledger;
pub mod models;
pub mod scoring;
pub mod threshold;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use intake::{Disposition, Intake};
pub use ledger::PressureLedger;
pub use models::*;
pub use traits::*;
