//! # Domain Module
//!
//! Core domain types for the channel layer.

pub mod entities;
pub mod errors;
pub mod events;
pub mod identifiers;
pub mod invariants;
pub mod msgs;
pub mod path;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use events::*;
pub use identifiers::*;
pub use invariants::*;
pub use msgs::*;
pub use path::Path;
pub use value_objects::*;
