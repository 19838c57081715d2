use std::fmt;

use float_ord::FloatOrd;
use itertools::{Itertools, MinMaxResult};
use log::debug;
use rayon::prelude::*;

use moraine_core::containers::PointCloudBuffer;
use moraine_core::error::{MoraineError, Result};
use moraine_core::math::{Grid2D, AABB};
use moraine_core::nalgebra::Point3;

use crate::triangulation::triangulate;

/// Subsets below this size are skipped instead of interpolated
pub const MIN_SUBSET_POINTS: usize = 100;

/// Why a class subset produced no grid. A skip is a per-class signal, not an error, and
/// never aborts sibling classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer points than [MIN_SUBSET_POINTS]
    TooFewPoints(usize),
    /// The subset's bounding box has zero area
    DegenerateExtent,
    /// Interpolation produced no valid grid cell
    NoValidCells,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooFewPoints(count) => {
                write!(f, "too few points to interpolate ({})", count)
            }
            SkipReason::DegenerateExtent => write!(f, "bounding box has zero area"),
            SkipReason::NoValidCells => write!(f, "interpolation yielded no valid cells"),
        }
    }
}

#[derive(Debug)]
pub enum RasterOutcome {
    Grid(ScalarGrid),
    Skipped(SkipReason),
}

/// Elevation raster interpolated from one class subset.
///
/// Cells outside the convex hull of the subset are no-data; every valid cell lies within
/// the z-range of the subset, interpolation never extrapolates.
#[derive(Debug, Clone)]
pub struct ScalarGrid {
    grid: Grid2D<f64>,
    z_min: f64,
    z_max: f64,
}

impl ScalarGrid {
    pub fn grid(&self) -> &Grid2D<f64> {
        &self.grid
    }

    /// Elevation range of the source subset (not of the grid cells)
    pub fn z_range(&self) -> (f64, f64) {
        (self.z_min, self.z_max)
    }
}

/// Interpolates the elevations of the given point subset onto a regular grid with the
/// given spacing.
///
/// The grid covers exactly the XY bounding box of the subset, stepped by `spacing` from
/// the minimum corner. Each node takes its value from linear barycentric interpolation on
/// the subset's Delaunay triangulation; nodes outside the convex hull stay no-data.
/// Subsets that cannot be interpolated (too few points, zero-area extent, no valid cell)
/// are reported as skipped. A non-positive spacing is a configuration error and produces
/// no partial grid.
pub fn rasterize_subset(
    buffer: &PointCloudBuffer,
    subset: &[usize],
    spacing: f64,
) -> Result<RasterOutcome> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return Err(MoraineError::InvalidConfiguration {
            parameter: "grid_spacing",
            expected: "> 0",
            value: spacing,
        });
    }

    let samples: Vec<Point3<f64>> = subset
        .iter()
        .copied()
        .filter(|&index| buffer.has_finite_position(index))
        .map(|index| buffer.position(index))
        .collect();
    if samples.len() < MIN_SUBSET_POINTS {
        return Ok(RasterOutcome::Skipped(SkipReason::TooFewPoints(
            samples.len(),
        )));
    }

    let bounds = AABB::from_points(samples.iter().copied()).expect("subset is non-empty here");
    let extent = bounds.extent();
    if extent.x <= 0.0 || extent.y <= 0.0 {
        return Ok(RasterOutcome::Skipped(SkipReason::DegenerateExtent));
    }

    let (z_min, z_max) = match samples.iter().map(|p| FloatOrd(p.z)).minmax() {
        MinMaxResult::MinMax(low, high) => (low.0, high.0),
        MinMaxResult::OneElement(only) => (only.0, only.0),
        MinMaxResult::NoElements => unreachable!("subset size was checked above"),
    };

    let surface = triangulate(&samples)?;

    let origin = (bounds.min().x, bounds.min().y);
    let cols = (extent.x / spacing).floor() as usize + 1;
    let rows = (extent.y / spacing).floor() as usize + 1;
    let row_values: Vec<Vec<f64>> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let y = origin.1 + row as f64 * spacing;
            (0..cols)
                .map(|col| {
                    let x = origin.0 + col as f64 * spacing;
                    surface.interpolate(x, y).unwrap_or(f64::NAN)
                })
                .collect()
        })
        .collect();
    let grid = Grid2D::from_values(origin, spacing, cols, rows, row_values.concat());

    if grid.valid_cells() == 0 {
        return Ok(RasterOutcome::Skipped(SkipReason::NoValidCells));
    }
    debug!(
        "rasterized {} points onto a {}x{} grid ({} valid cells)",
        samples.len(),
        cols,
        rows,
        grid.valid_cells()
    );
    Ok(RasterOutcome::Grid(ScalarGrid { grid, z_min, z_max }))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 153 points on a flat 10x10 patch at z = 10 (exactly representable lattice steps),
    /// all indices selected
    fn flat_patch() -> (PointCloudBuffer, Vec<usize>) {
        let mut positions = Vec::new();
        for i in 0..17 {
            for j in 0..9 {
                positions.push(Point3::new(i as f64 * 0.625, j as f64 * 1.25, 10.0));
            }
        }
        let buffer = PointCloudBuffer::from_positions(positions);
        let subset = (0..buffer.len()).collect();
        (buffer, subset)
    }

    #[test]
    fn grid_covers_the_subset_bounding_box() {
        let (buffer, subset) = flat_patch();
        let outcome = rasterize_subset(&buffer, &subset, 1.0).unwrap();
        let scalar = match outcome {
            RasterOutcome::Grid(scalar) => scalar,
            RasterOutcome::Skipped(reason) => panic!("unexpected skip: {}", reason),
        };
        let grid = scalar.grid();
        assert_eq!(grid.cols(), 11);
        assert_eq!(grid.rows(), 11);
        // every node position stays within the bounding box
        let (last_x, last_y) = grid.node_position(grid.cols() - 1, grid.rows() - 1);
        assert!(last_x <= 10.0 + 1e-12);
        assert!(last_y <= 10.0 + 1e-12);
    }

    #[test]
    fn interpolated_values_stay_inside_the_subset_z_range() {
        let (mut positions, _) = {
            let (buffer, subset) = flat_patch();
            (buffer.positions().to_vec(), subset)
        };
        // tilt the patch so interpolation has an actual gradient
        for p in positions.iter_mut() {
            p.z = 10.0 + 0.3 * p.x - 0.1 * p.y;
        }
        let buffer = PointCloudBuffer::from_positions(positions);
        let subset: Vec<usize> = (0..buffer.len()).collect();
        let outcome = rasterize_subset(&buffer, &subset, 0.5).unwrap();
        let scalar = match outcome {
            RasterOutcome::Grid(scalar) => scalar,
            RasterOutcome::Skipped(reason) => panic!("unexpected skip: {}", reason),
        };
        let (z_min, z_max) = scalar.z_range();
        for value in scalar.grid().values().iter().filter(|v| v.is_finite()) {
            assert!(*value >= z_min && *value <= z_max);
        }
    }

    #[test]
    fn small_subsets_are_skipped_not_an_error() {
        let (buffer, subset) = flat_patch();
        let small: Vec<usize> = subset.into_iter().take(MIN_SUBSET_POINTS - 1).collect();
        match rasterize_subset(&buffer, &small, 1.0).unwrap() {
            RasterOutcome::Skipped(SkipReason::TooFewPoints(count)) => {
                assert_eq!(count, MIN_SUBSET_POINTS - 1)
            }
            other => panic!("expected a skip, got {:?}", other),
        }
    }

    #[test]
    fn zero_area_subsets_are_skipped() {
        // 120 points on one line parallel to the x axis
        let positions: Vec<_> = (0..120)
            .map(|i| Point3::new(i as f64 * 0.1, 5.0, 1.0))
            .collect();
        let buffer = PointCloudBuffer::from_positions(positions);
        let subset: Vec<usize> = (0..buffer.len()).collect();
        match rasterize_subset(&buffer, &subset, 1.0).unwrap() {
            RasterOutcome::Skipped(SkipReason::DegenerateExtent) => {}
            other => panic!("expected a degenerate-extent skip, got {:?}", other),
        }
    }

    #[test]
    fn non_positive_spacing_is_a_configuration_error() {
        let (buffer, subset) = flat_patch();
        for spacing in [0.0, -1.0, f64::NAN].iter().copied() {
            match rasterize_subset(&buffer, &subset, spacing) {
                Err(MoraineError::InvalidConfiguration { parameter, .. }) => {
                    assert_eq!(parameter, "grid_spacing")
                }
                other => panic!("expected a configuration error, got {:?}", other),
            }
        }
    }

    #[test]
    fn non_finite_subset_members_are_excluded() {
        let (buffer, _) = flat_patch();
        let mut positions = buffer.positions().to_vec();
        positions.push(Point3::new(f64::NAN, 0.0, 0.0));
        let buffer = PointCloudBuffer::from_positions(positions);
        let subset: Vec<usize> = (0..buffer.len()).collect();
        match rasterize_subset(&buffer, &subset, 1.0).unwrap() {
            RasterOutcome::Grid(scalar) => {
                // the NaN point neither widens the grid nor poisons values
                assert_eq!(scalar.grid().cols(), 11);
                assert!((scalar.z_range().0 - 10.0).abs() < 1e-12);
            }
            other => panic!("expected a grid, got {:?}", other),
        }
    }
}
