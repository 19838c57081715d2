use kd_tree::KdTree;
use log::{debug, info};

use moraine_core::classification::ClassCode;
use moraine_core::containers::PointCloudBuffer;
use moraine_core::error::{MoraineError, Result};
use moraine_core::math::{Grid2D, AABB};

/// A filter window covering fewer points than this falls back to the coarsest surface
const MIN_WINDOW_POPULATION: u64 = 3;

/// Parameters of the progressive morphological ground filter.
///
/// `window` is the coarsest filter window in world units, `cell` the resolution of the
/// minimum surface raster. `threshold` is the base elevation tolerance above the opened
/// surface, grown by `scalar` per refinement iteration; `slope` converts distances (the
/// current window extent plus the distance to the nearest accepted ground point) into
/// extra elevation tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundFilterParams {
    pub cell: f64,
    pub window: f64,
    pub slope: f64,
    pub threshold: f64,
    pub scalar: f64,
}

impl Default for GroundFilterParams {
    fn default() -> Self {
        Self {
            cell: 1.0,
            window: 16.0,
            slope: 0.2,
            threshold: 0.45,
            scalar: 1.2,
        }
    }
}

impl GroundFilterParams {
    pub fn validate(&self) -> Result<()> {
        let positive: [(&'static str, f64); 5] = [
            ("cell", self.cell),
            ("window", self.window),
            ("slope", self.slope),
            ("threshold", self.threshold),
            ("scalar", self.scalar),
        ];
        for (parameter, value) in positive.iter().copied() {
            if !(value.is_finite() && value > 0.0) {
                return Err(MoraineError::InvalidConfiguration {
                    parameter,
                    expected: "> 0",
                    value,
                });
            }
        }
        if self.window < self.cell {
            return Err(MoraineError::InvalidConfiguration {
                parameter: "window",
                expected: ">= cell",
                value: self.window,
            });
        }
        Ok(())
    }
}

/// Estimated ground elevation raster produced by one run of the ground filter.
///
/// Cells without a reliable estimate hold the no-data marker. The model is scoped to the
/// classification request it came from and is discarded afterwards.
#[derive(Debug, Clone)]
pub struct GroundSurfaceModel {
    surface: Grid2D<f64>,
    params: GroundFilterParams,
}

impl GroundSurfaceModel {
    fn empty(params: GroundFilterParams) -> Self {
        Self {
            surface: Grid2D::nodata((0.0, 0.0), params.cell, 0, 0),
            params,
        }
    }

    pub fn surface(&self) -> &Grid2D<f64> {
        &self.surface
    }

    pub fn params(&self) -> &GroundFilterParams {
        &self.params
    }

    /// Estimated ground elevation at a world position, `None` outside the model or in
    /// no-data cells
    pub fn elevation_at(&self, x: f64, y: f64) -> Option<f64> {
        let (col, row) = self.surface.cell_of(x, y)?;
        let value = self.surface.get(col, row);
        if value.is_finite() {
            Some(value)
        } else {
            None
        }
    }
}

/// Labels the bare-earth points of the buffer as ground.
///
/// The filter rasterizes a minimum surface at `params.cell` resolution and refines it
/// through a sequence of morphological openings whose window shrinks from `params.window`
/// down to a single cell. A point stays a ground candidate as long as its elevation above
/// the opened surface remains within the iteration's tolerance
/// `threshold * scalar^k + slope * (window_extent_k + distance-to-nearest-accepted-ground)`,
/// i.e. the allowed excess scales with the current window extent and with the distance to
/// the nearest accepted ground point. Points rejected at any scale stay rejected;
/// survivors of every scale are committed as ground.
///
/// The classification column is reset before the new labels are committed, so re-running
/// the filter with identical parameters yields identical labels. On error the buffer is
/// left completely untouched, there is no partially classified state. Points with
/// non-finite coordinates never participate in surface fitting and are never labeled
/// ground; if more than half of the cloud is non-finite the input is rejected as a whole.
/// An empty buffer yields an empty model.
pub fn classify_ground(
    buffer: &mut PointCloudBuffer,
    params: &GroundFilterParams,
) -> Result<GroundSurfaceModel> {
    params.validate()?;
    let total = buffer.len();
    if total == 0 {
        debug!("ground filter: empty input, nothing to classify");
        return Ok(GroundSurfaceModel::empty(params.clone()));
    }

    let finite: Vec<usize> = (0..total)
        .filter(|&index| buffer.has_finite_position(index))
        .collect();
    let dropped = total - finite.len();
    if dropped * 2 > total {
        return Err(MoraineError::invalid_input(format!(
            "{} of {} points have non-finite coordinates",
            dropped, total
        )));
    }
    if dropped > 0 {
        debug!(
            "ground filter: excluding {} points with non-finite coordinates",
            dropped
        );
    }

    let bounds = AABB::from_points(finite.iter().map(|&index| buffer.position(index)))
        .expect("at least one finite point exists here");
    let extent = bounds.extent();
    let cols = (extent.x / params.cell).floor() as usize + 1;
    let rows = (extent.y / params.cell).floor() as usize + 1;
    let origin = (bounds.min().x, bounds.min().y);

    // minimum surface: per cell the lowest elevation seen, plus population counts
    let mut surface = Grid2D::<f64>::nodata(origin, params.cell, cols, rows);
    let mut counts = vec![0u32; cols * rows];
    for &index in &finite {
        let p = buffer.position(index);
        if let Some((col, row)) = surface.cell_of(p.x, p.y) {
            let current = surface.get(col, row);
            if !current.is_finite() || p.z < current {
                surface.set(col, row, p.z);
            }
            counts[row * cols + col] += 1;
        }
    }
    fill_nodata_from_neighbors(&mut surface);
    let prefix = population_prefix(&counts, cols, rows);

    // window radii in cells, shrinking from the coarsest window down to one cell
    let mut radii = Vec::new();
    let mut radius = ((params.window / params.cell).round() as usize).max(1);
    loop {
        radii.push(radius);
        if radius == 1 {
            break;
        }
        radius /= 2;
    }

    let coarse = morphological_opening(&surface, radii[0]);
    let mut candidate = vec![false; total];
    for &index in &finite {
        candidate[index] = true;
    }

    let mut opened = coarse.clone();
    for (iteration, &radius) in radii.iter().enumerate() {
        if iteration > 0 {
            opened = morphological_opening(&surface, radius);
        }
        let elevation_threshold = params.threshold * params.scalar.powi(iteration as i32);

        // accepted ground so far = survivors of the previous iteration
        let accepted_tree = if iteration == 0 {
            None
        } else {
            let accepted: Vec<[f64; 2]> = finite
                .iter()
                .filter(|&&index| candidate[index])
                .map(|&index| {
                    let p = buffer.position(index);
                    [p.x, p.y]
                })
                .collect();
            Some(KdTree::build_by_ordered_float(accepted))
        };

        let mut rejected = Vec::new();
        for &index in &finite {
            if !candidate[index] {
                continue;
            }
            let p = buffer.position(index);
            let (col, row) = match surface.cell_of(p.x, p.y) {
                Some(cell) => cell,
                None => continue,
            };
            // a sparsely populated window falls back to the coarsest surface, with the
            // coarsest window's relief allowance
            let sparse_window =
                window_population(&prefix, cols, rows, col, row, radius) < MIN_WINDOW_POPULATION;
            let (reference, window_extent) = if sparse_window {
                (coarse.get(col, row), radii[0] as f64 * params.cell)
            } else {
                (opened.get(col, row), radius as f64 * params.cell)
            };
            let distance = match &accepted_tree {
                None => 0.0,
                Some(tree) => nearest_other_distance(tree, [p.x, p.y]),
            };
            let tolerance = elevation_threshold + params.slope * (window_extent + distance);
            if p.z - reference > tolerance {
                rejected.push(index);
            }
        }
        for index in rejected {
            candidate[index] = false;
        }
        debug!(
            "ground filter iteration {} (radius {} cells): {} candidates remain",
            iteration,
            radius,
            candidate.iter().filter(|&&c| c).count()
        );
    }

    let mut column = vec![ClassCode::Unclassified.code(); total];
    let mut ground_count = 0usize;
    for index in 0..total {
        if candidate[index] {
            column[index] = ClassCode::Ground.code();
            ground_count += 1;
        }
    }
    buffer.reset_classification();
    buffer.commit_classification(column)?;
    info!(
        "ground filter: {} of {} points classified as ground",
        ground_count, total
    );

    Ok(GroundSurfaceModel {
        surface: opened,
        params: params.clone(),
    })
}

/// Replaces no-data cells by the minimum of their valid 8-neighbors, repeating until the
/// raster is completely filled
fn fill_nodata_from_neighbors(surface: &mut Grid2D<f64>) {
    let cols = surface.cols();
    let rows = surface.rows();
    loop {
        let mut updates: Vec<(usize, usize, f64)> = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                if surface.is_valid(col, row) {
                    continue;
                }
                let mut fill = f64::NAN;
                for dr in -1i64..=1 {
                    for dc in -1i64..=1 {
                        let nr = row as i64 + dr;
                        let nc = col as i64 + dc;
                        if nr < 0 || nc < 0 || nr >= rows as i64 || nc >= cols as i64 {
                            continue;
                        }
                        let value = surface.get(nc as usize, nr as usize);
                        if value.is_finite() && (!fill.is_finite() || value < fill) {
                            fill = value;
                        }
                    }
                }
                if fill.is_finite() {
                    updates.push((col, row, fill));
                }
            }
        }
        if updates.is_empty() {
            break;
        }
        for (col, row, value) in updates {
            surface.set(col, row, value);
        }
    }
}

/// Morphological opening (erosion followed by dilation) with a square window of the given
/// radius in cells
fn morphological_opening(surface: &Grid2D<f64>, radius: usize) -> Grid2D<f64> {
    let cols = surface.cols();
    let rows = surface.rows();
    let eroded = windowed_extreme(surface.values(), cols, rows, radius, true);
    let opened = windowed_extreme(&eroded, cols, rows, radius, false);
    Grid2D::from_values(surface.origin(), surface.spacing(), cols, rows, opened)
}

/// Windowed minimum (or maximum) with a square window, computed separably along rows and
/// then columns. No-data cells are skipped; a window with no valid cell stays no-data
fn windowed_extreme(
    values: &[f64],
    cols: usize,
    rows: usize,
    radius: usize,
    minimum: bool,
) -> Vec<f64> {
    let pick = |current: f64, value: f64| -> f64 {
        if !value.is_finite() {
            current
        } else if !current.is_finite() || (minimum && value < current) || (!minimum && value > current)
        {
            value
        } else {
            current
        }
    };

    let mut horizontal = vec![f64::NAN; values.len()];
    for row in 0..rows {
        for col in 0..cols {
            let lo = col.saturating_sub(radius);
            let hi = (col + radius).min(cols - 1);
            let mut extreme = f64::NAN;
            for c in lo..=hi {
                extreme = pick(extreme, values[row * cols + c]);
            }
            horizontal[row * cols + col] = extreme;
        }
    }

    let mut result = vec![f64::NAN; values.len()];
    for row in 0..rows {
        for col in 0..cols {
            let lo = row.saturating_sub(radius);
            let hi = (row + radius).min(rows - 1);
            let mut extreme = f64::NAN;
            for r in lo..=hi {
                extreme = pick(extreme, horizontal[r * cols + col]);
            }
            result[row * cols + col] = extreme;
        }
    }
    result
}

/// Summed-area table over the per-cell population counts, for O(1) window population
/// queries
fn population_prefix(counts: &[u32], cols: usize, rows: usize) -> Vec<u64> {
    let width = cols + 1;
    let mut prefix = vec![0u64; width * (rows + 1)];
    for row in 0..rows {
        for col in 0..cols {
            prefix[(row + 1) * width + (col + 1)] = counts[row * cols + col] as u64
                + prefix[row * width + (col + 1)]
                + prefix[(row + 1) * width + col]
                - prefix[row * width + col];
        }
    }
    prefix
}

fn window_population(
    prefix: &[u64],
    cols: usize,
    rows: usize,
    col: usize,
    row: usize,
    radius: usize,
) -> u64 {
    let width = cols + 1;
    let col_lo = col.saturating_sub(radius);
    let row_lo = row.saturating_sub(radius);
    let col_hi = (col + radius + 1).min(cols);
    let row_hi = (row + radius + 1).min(rows);
    prefix[row_hi * width + col_hi] + prefix[row_lo * width + col_lo]
        - prefix[row_lo * width + col_hi]
        - prefix[row_hi * width + col_lo]
}

fn nearest_other_distance(tree: &KdTree<[f64; 2]>, query: [f64; 2]) -> f64 {
    for hit in tree.nearests(&query, 2) {
        if hit.squared_distance > 0.0 {
            return hit.squared_distance.sqrt();
        }
    }
    0.0
}
