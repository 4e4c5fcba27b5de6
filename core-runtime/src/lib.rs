//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the sync and update crates:
//! - Logging and tracing infrastructure
//! - Typed sync configuration backed by the host settings store
//! - Fetch and mirror tuning
//!
//! ## Overview
//!
//! Everything here is host-agnostic. Platform capabilities arrive through the
//! `bridge-traits` contracts.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
