//! Download-to-stream control for a single active session.

mod controller;
mod types;

pub use controller::PlaybackController;
pub use types::*;
