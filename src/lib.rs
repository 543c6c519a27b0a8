//! The Oker compile web service.
//!
//! Accepts Oker source over HTTP, runs the Oker toolchain against it in an
//! isolated temporary workspace and reports the outcome as JSON.

pub mod compile;
pub mod config;
pub mod core;
pub mod logging;
pub mod service;
pub mod utils;
