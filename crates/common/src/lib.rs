//! Common types for Metagen services

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
