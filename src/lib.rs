//! FILEMQ: a directory-tree publish/subscribe file-distribution system.
//!
//! A server publishes one or more local directories under a virtual alias;
//! clients subscribe to subtrees and receive a continuously synchronized
//! mirror into a local inbox, streamed as chunked, credited transfers over a
//! pluggable, reliable transport.

pub mod client;
pub mod config;
pub mod framing;
pub mod fs;
pub mod patch;
pub mod server;
pub mod transport;
pub mod wire;
