//! Mapmerge - map upload, merge and render service
//!
//! Produces merged map stores and rendered images on demand, at most once
//! per artifact even under concurrent requests, and expires them after a
//! fixed lifetime.

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod store;

pub use error::{MapmergeError, MapmergeResult};
