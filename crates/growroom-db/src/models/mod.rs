//! Database models for persistent storage.
//!
//! Each stored row keeps its lookup keys as plain columns and the full
//! domain record as a bincode payload.

mod economy;
mod market;
mod world;

pub use economy::*;
pub use market::*;
pub use world::*;

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}
