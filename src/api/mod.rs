//! API Module
//!
//! Local admin and telemetry surface of the background process.
//!
//! # Endpoints
//! - `GET /health` - Health check
//! - `GET /stats` - Scheduler, counter and cache statistics
//! - `GET /report` - Stats plus recommendations
//! - `GET /limits/:service` - Rate window usage for one service
//! - `DELETE /cache/:key` - Delete one cached response
//! - `DELETE /cache` - Clear the cache

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
