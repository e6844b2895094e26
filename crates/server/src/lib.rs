//! Control API for reelstream.
//!
//! The library target exposes the router and state so integration tests can
//! drive the API in-process.

pub mod api;
pub mod metrics;
pub mod state;
