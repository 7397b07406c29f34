//! Core engine types and utilities

pub mod types;
pub mod error;
pub mod logging;
pub mod arena;
pub mod jobs;

pub use types::*;
pub use error::Error;
pub use arena::{Arena, Handle};
pub use jobs::JobQueue;
