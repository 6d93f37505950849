//! Data models for sandbox representation

mod sandbox;
mod version;

pub use sandbox::*;
pub use version::*;
