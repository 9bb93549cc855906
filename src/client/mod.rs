//! The subscribing side: connection, inbox materialization, and the actor
//! that ties them together (components G, H).

pub mod actor;
pub mod connection;
pub mod session;

pub use actor::{ClientActor, ClientHandle};
