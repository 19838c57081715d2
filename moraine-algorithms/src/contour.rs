use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use log::debug;

use moraine_core::math::Grid2D;

use crate::gridding::ScalarGrid;

/// Default iso-level increment in world units
pub const DEFAULT_LEVEL_STEP: f64 = 0.2;

lazy_static! {
    /// Process-wide default styling per classification code: (label, color name)
    static ref DEFAULT_CLASS_STYLES: BTreeMap<u8, (&'static str, &'static str)> = {
        let mut styles = BTreeMap::new();
        styles.insert(2, ("Ground", "white"));
        styles.insert(3, ("LowVeg", "lightgreen"));
        styles.insert(4, ("MedVeg", "green"));
        styles.insert(5, ("HighVeg", "darkgreen"));
        styles.insert(6, ("Building", "slategray"));
        styles.insert(9, ("Water", "blue"));
        styles
    };
}

const UNKNOWN_LABEL: &str = "Unknown";
const UNKNOWN_COLOR: &str = "yellow";

/// Rendering style attached to one contour polyline
#[derive(Debug, Clone, PartialEq)]
pub struct ContourStyle {
    pub label: String,
    pub color: String,
    pub line_width: f64,
}

/// Immutable class-to-style mapping injected into contour tracing.
///
/// Starts from the process-wide default table; callers override individual class colors
/// per request. Classes without an entry are styled as unknown:
/// ```
/// use moraine_algorithms::contour::StyleTable;
/// let styles = StyleTable::default().with_color(2, "#112233");
/// assert_eq!(styles.style_for(2, 1.0).color, "#112233");
/// assert_eq!(styles.style_for(3, 1.0).color, "lightgreen");
/// assert_eq!(styles.style_for(42, 1.0).color, "yellow");
/// ```
#[derive(Debug, Clone)]
pub struct StyleTable {
    entries: BTreeMap<u8, (String, String)>,
}

impl Default for StyleTable {
    fn default() -> Self {
        Self {
            entries: DEFAULT_CLASS_STYLES
                .iter()
                .map(|(&class, &(label, color))| (class, (label.to_string(), color.to_string())))
                .collect(),
        }
    }
}

impl StyleTable {
    /// Overrides the color of one class, keeping its label (or the unknown label for
    /// classes outside the default table)
    pub fn with_color(mut self, class: u8, color: impl Into<String>) -> Self {
        let color = color.into();
        self.entries
            .entry(class)
            .and_modify(|entry| entry.1 = color.clone())
            .or_insert_with(|| (UNKNOWN_LABEL.to_string(), color));
        self
    }

    pub fn style_for(&self, class: u8, line_width: f64) -> ContourStyle {
        match self.entries.get(&class) {
            Some((label, color)) => ContourStyle {
                label: label.clone(),
                color: color.clone(),
                line_width,
            },
            None => ContourStyle {
                label: UNKNOWN_LABEL.to_string(),
                color: UNKNOWN_COLOR.to_string(),
                line_width,
            },
        }
    }
}

/// One iso-elevation polyline in world coordinates
#[derive(Debug, Clone)]
pub struct Contour {
    pub class: u8,
    pub level: f64,
    pub vertices: Vec<(f64, f64)>,
    pub closed: bool,
    pub style: ContourStyle,
}

/// Iso-levels from `floor(z_min)` through `ceil(z_max)`, stepped by `step`.
///
/// A constant field yields its single level; tracing it produces no lines because the
/// field never crosses a level:
/// ```
/// use moraine_algorithms::contour::contour_levels;
/// assert_eq!(contour_levels(10.0, 10.0, 0.2), vec![10.0]);
/// assert_eq!(contour_levels(9.9, 10.3, 0.5), vec![9.0, 9.5, 10.0, 10.5, 11.0]);
/// ```
pub fn contour_levels(z_min: f64, z_max: f64, step: f64) -> Vec<f64> {
    if !(step.is_finite() && step > 0.0) || !z_min.is_finite() || !z_max.is_finite() {
        return Vec::new();
    }
    if z_max < z_min {
        return Vec::new();
    }
    let start = z_min.floor();
    let stop = z_max.ceil();
    let mut levels = Vec::new();
    let mut index = 0u32;
    loop {
        let level = start + index as f64 * step;
        if level > stop + 1e-9 {
            break;
        }
        levels.push(level);
        index += 1;
    }
    levels
}

/// Traces the iso-lines of the grid for every requested level and attaches the class
/// style.
///
/// Marching squares with linear interpolation along cell edges; cells touching a no-data
/// corner are skipped, so contours simply end at the hull boundary. Connected segments
/// are merged into polylines and closed rings are flagged as such.
pub fn trace_contours(
    scalar: &ScalarGrid,
    class: u8,
    levels: &[f64],
    styles: &StyleTable,
    line_width: f64,
) -> Vec<Contour> {
    let grid = scalar.grid();
    let mut contours = Vec::new();
    for &level in levels {
        let segments = march_level(grid, level);
        if segments.is_empty() {
            continue;
        }
        let count = segments.len();
        for polyline in stitch_segments(segments, grid.spacing()) {
            contours.push(Contour {
                class,
                level,
                closed: polyline.closed,
                vertices: polyline.points,
                style: styles.style_for(class, line_width),
            });
        }
        debug!(
            "class {} level {}: {} segments traced",
            class, level, count
        );
    }
    contours
}

type Segment = ((f64, f64), (f64, f64));

/// Emits the contour segments of one level, cell by cell, in world coordinates
fn march_level(grid: &Grid2D<f64>, level: f64) -> Vec<Segment> {
    let mut segments = Vec::new();
    if grid.cols() < 2 || grid.rows() < 2 {
        return segments;
    }
    for row in 0..grid.rows() - 1 {
        for col in 0..grid.cols() - 1 {
            let v00 = grid.get(col, row);
            let v10 = grid.get(col + 1, row);
            let v01 = grid.get(col, row + 1);
            let v11 = grid.get(col + 1, row + 1);
            if !(v00.is_finite() && v10.is_finite() && v01.is_finite() && v11.is_finite()) {
                continue;
            }

            let mut mask = 0usize;
            if v00 >= level {
                mask |= 1;
            }
            if v10 >= level {
                mask |= 2;
            }
            if v11 >= level {
                mask |= 4;
            }
            if v01 >= level {
                mask |= 8;
            }
            if mask == 0 || mask == 15 {
                continue;
            }

            let p00 = grid.node_position(col, row);
            let p10 = grid.node_position(col + 1, row);
            let p01 = grid.node_position(col, row + 1);
            let p11 = grid.node_position(col + 1, row + 1);
            let bottom = || crossing(p00, p10, v00, v10, level);
            let right = || crossing(p10, p11, v10, v11, level);
            let top = || crossing(p01, p11, v01, v11, level);
            let left = || crossing(p00, p01, v00, v01, level);

            match mask {
                1 | 14 => segments.push((left(), bottom())),
                2 | 13 => segments.push((bottom(), right())),
                3 | 12 => segments.push((left(), right())),
                4 | 11 => segments.push((right(), top())),
                6 | 9 => segments.push((bottom(), top())),
                7 | 8 => segments.push((left(), top())),
                5 => {
                    segments.push((left(), bottom()));
                    segments.push((right(), top()));
                }
                10 => {
                    segments.push((bottom(), right()));
                    segments.push((top(), left()));
                }
                _ => unreachable!("masks 0 and 15 are handled above"),
            }
        }
    }
    segments
}

/// Where the level crosses the edge between two nodes, by linear interpolation
fn crossing(a: (f64, f64), b: (f64, f64), value_a: f64, value_b: f64, level: f64) -> (f64, f64) {
    let delta = value_b - value_a;
    let t = if delta.abs() < f64::MIN_POSITIVE {
        0.5
    } else {
        ((level - value_a) / delta).clamp(0.0, 1.0)
    };
    (a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1))
}

struct Polyline {
    points: Vec<(f64, f64)>,
    closed: bool,
}

/// Merges unordered segments into polylines by matching endpoints within a small
/// tolerance relative to the grid spacing
fn stitch_segments(segments: Vec<Segment>, spacing: f64) -> Vec<Polyline> {
    let epsilon = spacing * 1e-6;
    let key = |p: (f64, f64)| -> (i64, i64) {
        ((p.0 / epsilon).round() as i64, (p.1 / epsilon).round() as i64)
    };

    let mut endpoints: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (index, (start, end)) in segments.iter().enumerate() {
        endpoints.entry(key(*start)).or_default().push(index);
        endpoints.entry(key(*end)).or_default().push(index);
    }

    let mut used = vec![false; segments.len()];
    let mut polylines = Vec::new();
    for seed in 0..segments.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let (start, end) = segments[seed];
        if key(start) == key(end) {
            // zero-length sliver, e.g. a corner exactly on the level
            continue;
        }
        let mut points = vec![start, end];

        // grow at the tail, then flip and grow at the former head
        for _ in 0..2 {
            loop {
                let tail = *points.last().expect("polyline is never empty");
                let tail_key = key(tail);
                let next = endpoints
                    .get(&tail_key)
                    .and_then(|candidates| candidates.iter().copied().find(|&c| !used[c]));
                let index = match next {
                    Some(index) => index,
                    None => break,
                };
                used[index] = true;
                let (a, b) = segments[index];
                if key(a) == tail_key {
                    points.push(b);
                } else {
                    points.push(a);
                }
            }
            points.reverse();
        }

        let closed = points.len() > 3 && key(points[0]) == key(*points.last().unwrap());
        polylines.push(Polyline { points, closed });
    }
    polylines
}

#[cfg(test)]
mod tests {
    use moraine_core::containers::PointCloudBuffer;
    use moraine_core::nalgebra::Point3;

    use super::*;
    use crate::gridding::{rasterize_subset, RasterOutcome, ScalarGrid};

    fn rasterized(positions: Vec<Point3<f64>>, spacing: f64) -> ScalarGrid {
        let buffer = PointCloudBuffer::from_positions(positions);
        let subset: Vec<usize> = (0..buffer.len()).collect();
        match rasterize_subset(&buffer, &subset, spacing).unwrap() {
            RasterOutcome::Grid(scalar) => scalar,
            RasterOutcome::Skipped(reason) => panic!("unexpected skip: {}", reason),
        }
    }

    fn flat_patch_at(z: f64) -> Vec<Point3<f64>> {
        let mut positions = Vec::new();
        for i in 0..17 {
            for j in 0..9 {
                positions.push(Point3::new(i as f64 * 0.625, j as f64 * 1.25, z));
            }
        }
        positions
    }

    /// A central mound rising from z = 0 to z = 2 over a 10x10 patch
    fn mound_patch() -> Vec<Point3<f64>> {
        let mut positions = Vec::new();
        for i in 0..21 {
            for j in 0..21 {
                let x = i as f64 * 0.5;
                let y = j as f64 * 0.5;
                let dx = x - 5.0;
                let dy = y - 5.0;
                let z = (2.0 - (dx * dx + dy * dy) * 0.1).max(0.0);
                positions.push(Point3::new(x, y, z));
            }
        }
        positions
    }

    #[test]
    fn constant_field_produces_no_contours() {
        let scalar = rasterized(flat_patch_at(10.0), 1.0);
        let levels = contour_levels(scalar.z_range().0, scalar.z_range().1, DEFAULT_LEVEL_STEP);
        assert_eq!(levels, vec![10.0]);
        let contours = trace_contours(&scalar, 2, &levels, &StyleTable::default(), 1.0);
        assert!(contours.is_empty());
    }

    #[test]
    fn mound_produces_closed_rings() {
        let scalar = rasterized(mound_patch(), 0.5);
        let contours = trace_contours(&scalar, 2, &[1.0], &StyleTable::default(), 1.0);
        assert!(!contours.is_empty());
        // the 1.0 iso-line around the mound is a closed ring well inside the patch
        assert!(contours.iter().any(|c| c.closed));
        for contour in &contours {
            assert_eq!(contour.level, 1.0);
            assert!(contour.vertices.len() >= 4);
        }
    }

    #[test]
    fn contour_vertices_are_in_world_coordinates() {
        let scalar = rasterized(mound_patch(), 0.5);
        let contours = trace_contours(&scalar, 2, &[1.0], &StyleTable::default(), 1.0);
        for contour in &contours {
            for &(x, y) in &contour.vertices {
                assert!((0.0..=10.0).contains(&x));
                assert!((0.0..=10.0).contains(&y));
            }
        }
    }

    #[test]
    fn styles_follow_the_table() {
        let scalar = rasterized(mound_patch(), 0.5);
        let styles = StyleTable::default().with_color(2, "#112233");
        let contours = trace_contours(&scalar, 2, &[1.0], &styles, 2.5);
        for contour in &contours {
            assert_eq!(contour.style.color, "#112233");
            assert_eq!(contour.style.label, "Ground");
            assert_eq!(contour.style.line_width, 2.5);
        }
        // a class that was not overridden keeps its default entry
        let other = trace_contours(&scalar, 5, &[1.0], &styles, 2.5);
        assert!(other.iter().all(|c| c.style.color == "darkgreen"));
    }

    #[test]
    fn unknown_classes_get_the_fallback_style() {
        let style = StyleTable::default().style_for(42, 1.0);
        assert_eq!(style.label, "Unknown");
        assert_eq!(style.color, "yellow");
    }

    #[test]
    fn level_generation_spans_floor_to_ceil() {
        let levels = contour_levels(9.4, 11.2, 0.5);
        assert_eq!(levels, vec![9.0, 9.5, 10.0, 10.5, 11.0, 11.5, 12.0]);
        assert!(contour_levels(5.0, 4.0, 0.5).is_empty());
        assert!(contour_levels(5.0, 6.0, 0.0).is_empty());
        assert!(contour_levels(f64::NAN, 6.0, 0.5).is_empty());
    }

    #[test]
    fn stitching_merges_collinear_chains() {
        let segments = vec![
            ((0.0, 0.0), (1.0, 0.0)),
            ((2.0, 0.0), (3.0, 0.0)),
            ((1.0, 0.0), (2.0, 0.0)),
        ];
        let polylines = stitch_segments(segments, 1.0);
        assert_eq!(polylines.len(), 1);
        assert_eq!(polylines[0].points.len(), 4);
        assert!(!polylines[0].closed);
    }

    #[test]
    fn stitching_detects_closed_rings() {
        let segments = vec![
            ((0.0, 0.0), (1.0, 0.0)),
            ((1.0, 0.0), (1.0, 1.0)),
            ((1.0, 1.0), (0.0, 1.0)),
            ((0.0, 1.0), (0.0, 0.0)),
        ];
        let polylines = stitch_segments(segments, 1.0);
        assert_eq!(polylines.len(), 1);
        assert!(polylines[0].closed);
    }
}
