//! Business logic services for the Storekeeper platform

pub mod indent;
pub mod issue;
pub mod ledger;

pub use indent::IndentService;
pub use issue::IssueService;
pub use ledger::{ItemStock, LedgerService};
