//! Enedis data gateway client module
//!
//! Provides a typed async interface to the metering data endpoints.

pub mod client;
pub mod types;

pub use client::AsyncLinkyClient;
pub use types::*;
