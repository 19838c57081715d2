#![warn(clippy::all)]
//! Algorithms that turn raw LiDAR point clouds into classified clouds and contour maps.
//!
//! The stages compose into one strictly sequential flow per request: the ground filter
//! labels bare-earth points, height normalization derives height above ground for every
//! point, the height bands assign vegetation tiers, and per requested class the selected
//! points are interpolated onto a regular grid and traced into styled contour polylines.
//! [pipeline](crate::pipeline) wires the stages together at the request level.

// Marching-squares contour extraction and per-class styling.
pub mod contour;
// SMRF-style progressive morphological ground filter.
pub mod ground_filter;
// Scattered-data interpolation of class subsets onto regular elevation grids.
pub mod gridding;
// Height above ground and vegetation height bands.
pub mod height;
// Request-level composition of the processing stages.
pub mod pipeline;
// Classification-based point selection.
pub mod selection;
// 2.5D Delaunay triangulation backing height normalization and gridding.
pub mod triangulation;
