pub mod client;
pub mod common;
pub mod utils;

pub use client::{ClientMiddleware, QueryClient};
pub use common::error::{ClientError, Result};
pub use common::messages::{QueryRequest, QueryResponse};
