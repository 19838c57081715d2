use std::collections::{BTreeMap, HashSet};

use moraine_core::error::{MoraineError, Result};
use moraine_core::math::AABB;
use moraine_core::nalgebra::Point3;

/// Barycentric weights below this are treated as outside the triangle
const CONTAINMENT_EPSILON: f64 = 1e-10;

/// 2.5D triangulated irregular network over scattered `(x, y, z)` samples.
///
/// The triangulation is Delaunay in the XY plane; z values ride along as vertex
/// attributes. [interpolate](Self::interpolate) evaluates the piecewise-linear
/// surface spanned by the triangles and answers `None` outside the convex hull
/// of the samples, so the surface never extrapolates.
#[derive(Debug, Clone)]
pub struct Triangulation {
    vertices: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
    bucket_min: (f64, f64),
    bucket_cell: (f64, f64),
    buckets_per_axis: usize,
    buckets: Vec<Vec<u32>>,
}

/// Builds a Delaunay triangulation over the XY coordinates of the given samples using
/// incremental Bowyer-Watson insertion into a super-triangle.
///
/// Samples sharing the exact same XY position are deduplicated, the first occurrence wins.
/// Fewer than 3 distinct samples, or samples that are all collinear, cannot span a surface
/// and yield an internal error.
pub fn triangulate(samples: &[Point3<f64>]) -> Result<Triangulation> {
    let mut vertices: Vec<Point3<f64>> = Vec::with_capacity(samples.len());
    let mut seen_positions: HashSet<(u64, u64)> = HashSet::with_capacity(samples.len());
    for sample in samples {
        if seen_positions.insert((sample.x.to_bits(), sample.y.to_bits())) {
            vertices.push(*sample);
        }
    }
    if vertices.len() < 3 {
        return Err(MoraineError::internal(format!(
            "triangulation needs at least 3 distinct sample positions, found {}",
            vertices.len()
        )));
    }

    let bounds =
        AABB::from_points(vertices.iter().copied()).expect("vertices cannot be empty here");
    let extent = bounds.extent();
    let span = extent.x.max(extent.y).max(1.0);
    let center_x = (bounds.min().x + bounds.max().x) * 0.5;
    let center_y = (bounds.min().y + bounds.max().y) * 0.5;

    // super-triangle vertices live past the real sample indices so that sample
    // indices stay stable when the super-triangle is stripped at the end
    let sample_count = vertices.len();
    vertices.push(Point3::new(center_x - 20.0 * span, center_y - span, 0.0));
    vertices.push(Point3::new(center_x + 20.0 * span, center_y - span, 0.0));
    vertices.push(Point3::new(center_x, center_y + 20.0 * span, 0.0));

    let mut triangles: Vec<[usize; 3]> = vec![ccw(
        &vertices,
        [sample_count, sample_count + 1, sample_count + 2],
    )];

    for vertex in 0..sample_count {
        let p = vertices[vertex];

        // every triangle whose circumcircle contains p becomes part of the cavity
        let mut cavity = Vec::new();
        for (index, triangle) in triangles.iter().enumerate() {
            if in_circumcircle(&vertices, *triangle, p.x, p.y) {
                cavity.push(index);
            }
        }

        // the cavity boundary consists of the oriented edges whose reverse does not
        // occur within the cavity; a BTreeMap keeps the retriangulation order stable
        let mut edges: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for &index in &cavity {
            let [a, b, c] = triangles[index];
            for &edge in &[(a, b), (b, c), (c, a)] {
                *edges.entry(edge).or_insert(0) += 1;
            }
        }
        let boundary: Vec<(usize, usize)> = edges
            .keys()
            .copied()
            .filter(|&(a, b)| !edges.contains_key(&(b, a)))
            .collect();

        let cavity_lookup: HashSet<usize> = cavity.iter().copied().collect();
        let mut remaining: Vec<[usize; 3]> = triangles
            .iter()
            .enumerate()
            .filter(|(index, _)| !cavity_lookup.contains(index))
            .map(|(_, triangle)| *triangle)
            .collect();
        for (a, b) in boundary {
            remaining.push(ccw(&vertices, [a, b, vertex]));
        }
        triangles = remaining;
    }

    // strip the super-triangle and any sliver without area
    triangles.retain(|triangle| {
        triangle.iter().all(|&index| index < sample_count)
            && signed_double_area(&vertices, *triangle).abs() > 0.0
    });
    vertices.truncate(sample_count);
    if triangles.is_empty() {
        return Err(MoraineError::internal(
            "degenerate triangulation: all sample positions are collinear",
        ));
    }

    Ok(Triangulation::with_bucket_index(vertices, triangles, bounds))
}

impl Triangulation {
    fn with_bucket_index(
        vertices: Vec<Point3<f64>>,
        triangles: Vec<[usize; 3]>,
        bounds: AABB<f64>,
    ) -> Self {
        let extent = bounds.extent();
        let buckets_per_axis = ((triangles.len() as f64).sqrt().ceil() as usize).clamp(1, 256);
        let bucket_cell = (
            (extent.x / buckets_per_axis as f64).max(f64::MIN_POSITIVE),
            (extent.y / buckets_per_axis as f64).max(f64::MIN_POSITIVE),
        );
        let bucket_min = (bounds.min().x, bounds.min().y);

        let mut buckets = vec![Vec::new(); buckets_per_axis * buckets_per_axis];
        for (index, triangle) in triangles.iter().enumerate() {
            let xs = triangle.map(|v| vertices[v].x);
            let ys = triangle.map(|v| vertices[v].y);
            let col_lo = bucket_index(
                xs.iter().copied().fold(f64::INFINITY, f64::min),
                bucket_min.0,
                bucket_cell.0,
                buckets_per_axis,
            );
            let col_hi = bucket_index(
                xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                bucket_min.0,
                bucket_cell.0,
                buckets_per_axis,
            );
            let row_lo = bucket_index(
                ys.iter().copied().fold(f64::INFINITY, f64::min),
                bucket_min.1,
                bucket_cell.1,
                buckets_per_axis,
            );
            let row_hi = bucket_index(
                ys.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                bucket_min.1,
                bucket_cell.1,
                buckets_per_axis,
            );
            for row in row_lo..=row_hi {
                for col in col_lo..=col_hi {
                    buckets[row * buckets_per_axis + col].push(index as u32);
                }
            }
        }

        Self {
            vertices,
            triangles,
            bucket_min,
            bucket_cell,
            buckets_per_axis,
            buckets,
        }
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Evaluates the triangulated surface at `(x, y)` by linear barycentric interpolation
    /// on the containing triangle. Returns `None` outside the convex hull of the samples.
    /// The interpolated value is kept inside the z-range of the triangle's vertices
    pub fn interpolate(&self, x: f64, y: f64) -> Option<f64> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let col = bucket_index(x, self.bucket_min.0, self.bucket_cell.0, self.buckets_per_axis);
        let row = bucket_index(y, self.bucket_min.1, self.bucket_cell.1, self.buckets_per_axis);
        for &candidate in &self.buckets[row * self.buckets_per_axis + col] {
            let [a, b, c] = self.triangles[candidate as usize];
            let pa = self.vertices[a];
            let pb = self.vertices[b];
            let pc = self.vertices[c];
            let denominator =
                (pb.y - pc.y) * (pa.x - pc.x) + (pc.x - pb.x) * (pa.y - pc.y);
            if denominator.abs() < f64::MIN_POSITIVE {
                continue;
            }
            let wa = ((pb.y - pc.y) * (x - pc.x) + (pc.x - pb.x) * (y - pc.y)) / denominator;
            let wb = ((pc.y - pa.y) * (x - pc.x) + (pa.x - pc.x) * (y - pc.y)) / denominator;
            let wc = 1.0 - wa - wb;
            if wa >= -CONTAINMENT_EPSILON && wb >= -CONTAINMENT_EPSILON && wc >= -CONTAINMENT_EPSILON
            {
                let value = wa * pa.z + wb * pb.z + wc * pc.z;
                let low = pa.z.min(pb.z).min(pc.z);
                let high = pa.z.max(pb.z).max(pc.z);
                return Some(value.max(low).min(high));
            }
        }
        None
    }
}

fn bucket_index(coordinate: f64, min: f64, cell: f64, buckets_per_axis: usize) -> usize {
    if coordinate <= min {
        return 0;
    }
    (((coordinate - min) / cell) as usize).min(buckets_per_axis - 1)
}

fn signed_double_area(vertices: &[Point3<f64>], [a, b, c]: [usize; 3]) -> f64 {
    let pa = vertices[a];
    let pb = vertices[b];
    let pc = vertices[c];
    (pb.x - pa.x) * (pc.y - pa.y) - (pb.y - pa.y) * (pc.x - pa.x)
}

fn ccw(vertices: &[Point3<f64>], triangle: [usize; 3]) -> [usize; 3] {
    if signed_double_area(vertices, triangle) < 0.0 {
        [triangle[0], triangle[2], triangle[1]]
    } else {
        triangle
    }
}

/// Strict circumcircle containment test for a counter-clockwise triangle, via the lifted
/// 3x3 determinant
fn in_circumcircle(vertices: &[Point3<f64>], [a, b, c]: [usize; 3], x: f64, y: f64) -> bool {
    let ax = vertices[a].x - x;
    let ay = vertices[a].y - y;
    let bx = vertices[b].x - x;
    let by = vertices[b].y - y;
    let cx = vertices[c].x - x;
    let cy = vertices[c].y - y;
    let a2 = ax * ax + ay * ay;
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let determinant =
        ax * (by * c2 - b2 * cy) - ay * (bx * c2 - b2 * cx) + a2 * (bx * cy - by * cx);
    determinant > 0.0
}
