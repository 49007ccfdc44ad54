pub mod builtin;
pub mod config;
pub mod error;
pub mod instruction;
pub mod io;
pub mod loader;
pub mod manager;
pub mod model;
pub mod once;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod transformer;

pub use error::{EtlError, Result};
