//! Tour-guide question pipeline.
//!
//! A [`session::GuideSession`] turns one spoken question into an answer: it
//! captures a still frame, resolves the address and nearby landmarks through
//! [`resolver::PlaceResolver`], renders the instruction with [`prompt`], sends
//! both to an [`client::InferenceGateway`] and speaks the reply.

pub mod capabilities;
pub mod client;
pub mod prompt;
pub mod resolver;
pub mod session;

pub use capabilities::Capabilities;
pub use session::{GuideSession, QuestionOutcome, SessionSettings, SessionState};
