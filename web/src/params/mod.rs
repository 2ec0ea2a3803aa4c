//! This module holds typed parameters for various endpoint inputs.
//!
//! Request bodies are deserialized into these types first and converted into
//! `sse` values second, so malformed wire fields are rejected before anything
//! reaches the broadcaster.

pub(crate) mod event;
