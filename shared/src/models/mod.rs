//! Domain models for the Storekeeper platform

mod issue;
mod lot;
mod requisition;

pub use issue::*;
pub use lot::*;
pub use requisition::*;
