//! HTTP API.
//!
//! Routes are nested under `/api/`. Everything except `/api/health` passes
//! the bearer-token middleware; role checks happen in the handlers.
//!
//! The router is composable: `api_router()` returns a `Router` that can be
//! mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_server, ApiServer, ServerError, ServerSession};
pub use types::{ApiContext, Backends};
