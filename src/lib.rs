pub mod cluster;
pub mod command;
pub mod config;
pub mod error;
pub mod fields;
pub mod flags;
pub mod locator;
pub mod merge;
pub mod output;
pub mod path;
pub mod resource;
pub mod schema;

pub use error::{Error, Result};
