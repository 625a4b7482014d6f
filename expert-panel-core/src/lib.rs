//! Core types and traits for expert-panel
//!
//! This crate provides the session model, session stores, the progress
//! broadcaster, configuration and logging shared by the other crates.

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod utils;

pub use error::{Error, Result};
