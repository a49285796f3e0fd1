//! Diff probing, the review protocol, and the transfer coordinator: the
//! three phases a `wharf run` invocation drives a loaded profile through.

pub mod cancel;
pub mod diff;
pub mod message;
pub mod mirror;
pub mod server;
pub mod state;
pub mod transfer;

pub use cancel::AbortHandle;
pub use message::ReviewOutcome;
pub use server::{run_review_server, ReviewSession};
pub use state::ServerState;
pub use transfer::{run_transfer, TransferPlan};
