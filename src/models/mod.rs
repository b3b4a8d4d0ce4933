//! Response models for the admin API
//!
//! Scheduler stats, reports and limit status serialize directly; the types
//! here cover the remaining endpoint bodies.

pub mod responses;

pub use responses::{ClearResponse, DeleteResponse, ErrorResponse, HealthResponse};
