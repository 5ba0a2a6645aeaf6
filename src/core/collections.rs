//! Collection types shared by the mesh and its algorithms.
//!
//! Hash maps and sets use the `rustc-hash` hasher; keys are slotmap keys or
//! small integers, for which `FxHash` is both fast and well distributed.

mod aliases;
mod helpers;
pub mod spatial_hash_grid;

pub use aliases::*;
pub use helpers::*;
pub use spatial_hash_grid::SpatialIndex;
