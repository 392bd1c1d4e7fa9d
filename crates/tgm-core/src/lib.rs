//! Core domain + application logic for tgm (shared-group statistics over TDLib).
//!
//! This crate is intentionally transport-agnostic. TDLib's JSON client lives
//! behind the [`transport::Transport`] port, implemented in adapter crates.

pub mod auth;
pub mod config;
pub mod correlator;
pub mod domain;
pub mod errors;
pub mod event;
pub mod logging;
pub mod service;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
