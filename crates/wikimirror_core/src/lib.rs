pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod filesystem;
pub mod listing;
pub mod model;
pub mod namespaces;
pub mod pipeline;
pub mod vcs;

#[cfg(test)]
mod testing;

pub use error::{MirrorError, Result};
