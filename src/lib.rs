//! MCP Hub gateway: HTTP/SSE transport over the aggregation engine.

pub mod logging;
pub mod responses;
pub mod server;

pub use server::{build_router, AppState};
