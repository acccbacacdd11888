//! prereq-core: annotation session, progress ledger, and similarity scoring.
//!
//! This crate defines the data model, the resumable annotation state
//! machine, and the batch generator engine that the rest of prereq builds
//! on. Providers and the CLI live in their own crates.

pub mod dataset;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod merge;
pub mod model;
pub mod session;
pub mod similarity;
pub mod traits;
