//! Top-level world container and its configuration

pub mod config;
pub mod world;

pub use config::{RenderConfig, WorldConfig};
pub use world::{UpdateReport, World};
