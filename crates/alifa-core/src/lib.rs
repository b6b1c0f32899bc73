//! alifa/crates/alifa-core/src/lib.rs
//!
//! Domain types and collaborator contracts shared by the Alifa write-gate.

pub mod drafts;
pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use drafts::*;
pub use error::*;
pub use models::*;
pub use traits::*;
