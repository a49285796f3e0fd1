//! Shared types and ambient stack for wharf: profile configuration, the
//! ignore matcher, metadata preservation, file-source resolvers, and
//! structured logging. Consumed by `wharf-transport`, `wharf-core`, and the
//! `wharf` CLI; not intended for direct use.

pub mod filesource;
pub mod filter;
pub mod loader;
pub mod logging;
pub mod preserve;
pub mod profile;
pub mod types;
