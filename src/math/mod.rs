//! Mathematical utilities and data structures

pub mod aabb;
pub mod segment;
pub mod morton;
pub mod frustum;

pub use aabb::{Aabb, PlaneSide};
pub use segment::Segment;
pub use frustum::{Plane, Frustum};
