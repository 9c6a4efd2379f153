//! Shared types and domain logic for the Storekeeper warehouse platform
//!
//! This crate holds everything that does not touch storage: the lot,
//! issue and requisition models, the in-memory lot ledger, the FIFO
//! allocator and the requisition decision rules. The backend loads rows
//! into these types and persists what they decide.

pub mod allocation;
pub mod ledger;
pub mod models;
pub mod types;
pub mod validation;

pub use allocation::*;
pub use ledger::*;
pub use models::*;
pub use types::*;
pub use validation::*;
