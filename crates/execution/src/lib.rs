// In crates/execution/src/lib.rs

pub mod book;
pub mod error;
pub mod ledger;
pub mod margin;
pub mod types;

// Re-export public types
pub use book::PositionBook;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use margin::{EquityRatioCurve, MarginCurve};
pub use types::{BookSnapshot, LedgerEntry, LedgerEntryKind};
