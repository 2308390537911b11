//! # Client Components
//!
//! The client is split into two main components:
//!
//! ## Query Client ([`client`])
//! Transport and credential plumbing: one multipart POST per query, response
//! demultiplexed into JSON plus decoded blobs. Knows nothing about commands.
//!
//! ## Client Middleware ([`middleware`])
//! Caller-side orchestration on top of the query client:
//! - Authentication and session refresh
//! - Explicit credential installation and logout
//! - Command status checks
//! - Last response and query time bookkeeping

pub mod client;
pub mod middleware;

// Re-export for convenience
pub use client::QueryClient;
pub use middleware::{ClientMiddleware, Session};
