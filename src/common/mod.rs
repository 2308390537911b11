//! # Common Components
//!
//! Shared data structures used by the client components.
//!
//! ## Modules
//!
//! - [`messages`]: Query request/response model and wire response parsing
//! - [`error`]: Error taxonomy returned by every client operation
//! - [`config`]: Configuration parsing utilities

pub mod config;
pub mod error;
pub mod messages;
