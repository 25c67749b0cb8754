//! Horizon-based occlusion culling
//!
//! For every occlusion patch and azimuth sector a conservative horizon
//! envelope is precomputed; at render time a patch is culled when the
//! viewer sits below that envelope in every sector the patch subtends.

pub mod sectors;
pub mod horizon;
pub mod envelope;
pub mod map;
pub mod persist;

pub use map::{OcclusionMap, OcclusionParams};
pub use persist::load_or_compute;
pub use sectors::SectorTable;
