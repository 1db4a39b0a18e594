//! API Module
//!
//! HTTP handlers and routing for the near cache management API.
//!
//! # Endpoints
//! - `/cache/:key` - Lookup, put and remove
//! - `/cache/:key/through` - Read-through lookup
//! - `/invalidations` - Invalidation ingest
//! - `/stats`, `/preloader`, `/health` - Inspection

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
