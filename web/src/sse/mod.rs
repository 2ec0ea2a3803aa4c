//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum glue for the stream endpoint. The stream
//! loop, wire format and body sink live in the `sse` crate.

pub mod handler;
