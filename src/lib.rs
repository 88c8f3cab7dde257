//! microapp service bootstrap and lifecycle library.

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod datastore;
pub mod discovery;
pub mod lifecycle;
pub mod observability;

pub use bootstrap::{prepare, Inputs, Prepared};
pub use config::Configuration;
pub use lifecycle::Coordinator;
