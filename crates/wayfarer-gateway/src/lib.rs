//! HTTP analysis gateway.
//!
//! Hosts `POST /analyze`, which forwards an `{image, prompt}` pair to the
//! configured vision model as a single-turn request, and `GET /health`.

pub mod analyze;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod server;
pub mod state;

pub use server::{router, start_gateway};
pub use state::GatewayState;
