//! Client layer for OpenAI-compatible vision-language backends.
//!
//! [`client::VisionClient`] speaks the wire protocol; [`backend`] wraps it
//! behind the `VisionBackend` trait the engine consumes; [`catalog`] and
//! [`translate`] cover model discovery and the text-only translation path.

pub mod backend;
pub mod catalog;
pub mod client;
pub mod translate;
