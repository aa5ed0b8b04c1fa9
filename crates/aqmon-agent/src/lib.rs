//! Host process pieces for the air quality monitor agent
//!
//! The binary wires these together; they live in a library so the HTTP
//! surface can be exercised from integration tests.

pub mod api;
pub mod config;
pub mod host;
