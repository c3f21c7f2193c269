//! Core types and traits for Rakscope
//!
//! This crate provides the foundational types shared by the bitstream codec
//! and the dissection engine.

pub mod config;
pub mod diag;
pub mod error;
pub mod types;

pub use config::SessionConfig;
pub use diag::{DiagnosticSink, NullSink, TracingSink};
pub use error::{Error, Result};
pub use types::*;
