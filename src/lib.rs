//! Geomip - a geoMipMap height-field terrain engine
//!
//! Patches of a tiled height map are clipped against the view frustum,
//! culled against precomputed horizons, assigned a mip level from distance
//! and screen-space error, and stitched into crack-free index buffers kept
//! in circular vertex and index caches.

pub mod core;
pub mod math;
pub mod cache;
pub mod terrain;
pub mod occlusion;
pub mod collision;
