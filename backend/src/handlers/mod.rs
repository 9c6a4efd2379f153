//! HTTP handlers for the Storekeeper API

mod health;
mod indent;
mod issue;
mod purchase;
mod stock;

pub use health::*;
pub use indent::*;
pub use issue::*;
pub use purchase::*;
pub use stock::*;
