//! HTTP API handlers for walk-tracker
//!
//! REST endpoints to drive a walk and read its results, plus an SSE stream
//! of walk events.

pub mod gallery;
pub mod health;
pub mod locations;
pub mod sse;
pub mod walk;

pub use gallery::gallery_routes;
pub use health::health_routes;
pub use locations::location_routes;
pub use sse::walk_event_stream;
pub use walk::walk_routes;
