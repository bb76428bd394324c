//! Transport layer for the host control surface.
//!
//! Currently HTTP via axum. The surface is small: a health/status probe and
//! the one user-triggerable action that posts a message into the channel.

pub mod http;

pub use http::{ServerConfig, serve};
