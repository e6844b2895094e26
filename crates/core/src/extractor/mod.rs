//! Provider extraction capability.
//!
//! An [`Extractor`] turns a provider id plus a query into raw, unranked
//! [`Offer`]s. The discovery orchestrator is agnostic to how an extractor
//! obtains them; [`ApiExtractor`] reads structured JSON APIs.

mod api;
mod types;

pub use api::{format_size, ApiExtractor};
pub use types::*;
