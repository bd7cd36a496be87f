pub mod cli;
pub mod connection;
pub mod errors;
pub mod harness;
pub mod invoker;
pub mod probes;
pub mod readiness;
pub mod resp;
pub mod server;

pub use errors::{HarnessError, Result};
