//! Test support for the kvstress harness.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod server;

pub use crate::server::TestServer;
