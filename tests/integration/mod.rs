//! Integration test organization for kvprobe.
//!
//! `infrastructure` holds reusable pieces (an in-process fake key-value
//! server speaking just enough RESP for the probes); `scenarios` holds the
//! actual test cases.

pub mod infrastructure;
pub mod scenarios;
