//! Type definitions for handover storage.

mod dates;
mod ids;
mod pickups;
mod roles;
mod tokens;

// Re-export all types from submodules
pub use dates::*;
pub use ids::*;
pub use pickups::*;
pub use roles::*;
pub use tokens::*;
