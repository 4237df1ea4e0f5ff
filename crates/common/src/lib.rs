//! Shared types for the fhir-mcp workspace
//!
//! Holds the pieces every member needs but none owns: the redacting
//! `Secret` wrapper used for client secrets, and the configuration error
//! type returned while loading the service config.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
