//! GeoMipMap terrain: patches, LOD selection, stitching and clipping

pub mod heightmap;
pub mod generator;
pub mod config;
pub mod quadtree;
pub mod template;
pub mod error_metric;
pub mod lod;
pub mod stitch;
pub mod clip;
pub mod landscape;

pub use heightmap::HeightMap;
pub use generator::{TerrainGenerator, TerrainParams};
pub use config::{ErrorMode, LandscapeConfig, OcclusionConfig};
pub use quadtree::{QuadNode, QuadTree, TileTree, LandscapeTree};
pub use template::{PatchTemplate, TerrainVertex};
pub use stitch::NeighborLevels;
pub use clip::ClipStats;
pub use landscape::{FrameStats, Landscape, Patch, PatchDraw, PatchRenderer};
