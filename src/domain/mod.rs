//! Domain layer for the OpenMemory service
//!
//! Models, errors and the port traits the collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
