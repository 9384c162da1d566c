//! Growroom DB - persistent storage using native_db
//!
//! Holds every durable record of the game economy:
//! - Players, genetics and who owns which strain
//! - Plants and growing locations
//! - Market conditions, price history and market events
//! - Weather effects
//! - Breeding, trade and sale ledgers
//!
//! Multi-record changes (a successful cross, a trade settlement, a sale, a
//! market tick) each run inside a single write transaction, so they land
//! completely or not at all.

mod economy;
mod error;
mod ledger;
mod models;
mod queries;
mod store;

pub use economy::BreedingCommit;
pub use error::{Error, Result};
pub use ledger::{AcquisitionSource, BreedingRecord, Ownership, SaleRecord, TradeRecord};
pub use queries::{MarketActivity, SUPPLY_WINDOW_DAYS, DEMAND_WINDOW_DAYS, SALES_WINDOW_DAYS};
pub use store::{sequence, Store};
