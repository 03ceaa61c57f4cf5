//! Voxlate client library.
//!
//! The CLI binary is thin glue over this crate; the interesting machinery
//! is the real-time voice streaming session in [`voice`].

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod voice;
