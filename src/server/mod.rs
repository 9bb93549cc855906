//! The publishing side: mounts, subscriptions, per-client sessions, and the
//! actor that ties them together (components D, E, F).

pub mod actor;
pub mod connection;
pub mod mount;
pub mod session;

pub use actor::{ServerActor, ServerHandle};
