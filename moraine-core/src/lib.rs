#![warn(clippy::all)]

//! Core data structures for LiDAR terrain processing
//!
//! Moraine separates airborne LiDAR point clouds into bare-earth and above-ground
//! features and derives elevation contours from the result. This crate holds the
//! data structures shared by all processing stages: the columnar
//! [PointCloudBuffer](crate::containers::PointCloudBuffer), the closed set of
//! [classification codes](crate::classification::ClassCode), raster and bounding-box
//! math, and the error type surfaced to callers.

pub extern crate nalgebra;

/// The closed set of point classification codes
pub mod classification;
pub mod containers;
/// Structured errors shared by all moraine crates
pub mod error;
/// Useful mathematical tools when working with point cloud data
pub mod math;
