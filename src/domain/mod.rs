//! Domain models for the job gateway

pub mod identity;
pub mod job;

pub use identity::*;
pub use job::*;
