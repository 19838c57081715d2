use log::{debug, info};

use moraine_core::classification::ClassCode;
use moraine_core::containers::PointCloudBuffer;
use moraine_core::error::{MoraineError, Result};

use crate::triangulation::triangulate;

/// Height thresholds separating the vegetation tiers, in world units above ground.
///
/// Points with height `h` are labeled low vegetation for `low <= h < medium`, medium
/// vegetation for `medium <= h < high` and high vegetation for `h >= high`. Heights
/// below `low` stay unclassified (ground clutter), NaN heights are always excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightBandParams {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for HeightBandParams {
    fn default() -> Self {
        Self {
            low: 0.5,
            medium: 2.0,
            high: 5.0,
        }
    }
}

impl HeightBandParams {
    pub fn validate(&self) -> Result<()> {
        let positive: [(&'static str, f64); 3] = [
            ("band_low", self.low),
            ("band_medium", self.medium),
            ("band_high", self.high),
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
        if self.medium <= self.low {
            return Err(MoraineError::InvalidConfiguration {
                parameter: "band_medium",
                expected: "> band_low",
                value: self.medium,
            });
        }
        if self.high <= self.medium {
            return Err(MoraineError::InvalidConfiguration {
                parameter: "band_high",
                expected: "> band_medium",
                value: self.high,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightSummary {
    /// Ground points the surface was triangulated from
    pub ground_samples: usize,
    /// Points that received a finite height
    pub within_hull: usize,
    /// Finite points outside the convex hull of the ground samples (height stays NaN)
    pub outside_hull: usize,
}

/// Computes height above ground for every point of the buffer.
///
/// The ground surface is the Delaunay triangulation of all points currently labeled
/// ground; every point's height is its elevation minus the linearly interpolated surface
/// elevation below it. Ground points are vertices of that surface, so their height comes
/// out as 0 within floating-point tolerance. Points outside the convex hull of the ground
/// samples keep NaN instead of an extrapolated guess, as do points with non-finite
/// coordinates. The height column is only written on success.
pub fn normalize_heights(buffer: &mut PointCloudBuffer) -> Result<HeightSummary> {
    let ground: Vec<_> = (0..buffer.len())
        .filter(|&index| {
            buffer.class_of(index) == ClassCode::Ground && buffer.has_finite_position(index)
        })
        .map(|index| buffer.position(index))
        .collect();
    if ground.len() < 3 {
        return Err(MoraineError::invalid_input(format!(
            "height normalization needs at least 3 ground points, found {}",
            ground.len()
        )));
    }

    let surface = triangulate(&ground)?;
    debug!(
        "height normalization: ground surface over {} samples, {} triangles",
        ground.len(),
        surface.triangle_count()
    );

    let mut column = vec![f64::NAN; buffer.len()];
    let mut within_hull = 0usize;
    let mut outside_hull = 0usize;
    for (index, height) in column.iter_mut().enumerate() {
        if !buffer.has_finite_position(index) {
            continue;
        }
        let p = buffer.position(index);
        match surface.interpolate(p.x, p.y) {
            Some(elevation) => {
                *height = p.z - elevation;
                within_hull += 1;
            }
            None => outside_hull += 1,
        }
    }
    buffer.commit_heights(column)?;

    let summary = HeightSummary {
        ground_samples: ground.len(),
        within_hull,
        outside_hull,
    };
    info!(
        "height normalization: {} points normalized, {} outside the ground hull",
        summary.within_hull, summary.outside_hull
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeightBandSummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

/// Assigns the vegetation tiers from the height-above-ground column.
///
/// Only unclassified points with a finite height are relabeled; ground, building and
/// water labels are never overwritten.
pub fn classify_height_bands(
    buffer: &mut PointCloudBuffer,
    params: &HeightBandParams,
) -> Result<HeightBandSummary> {
    params.validate()?;
    let mut summary = HeightBandSummary::default();
    for index in 0..buffer.len() {
        if buffer.class_of(index) != ClassCode::Unclassified {
            continue;
        }
        let height = buffer.height_of(index);
        if !height.is_finite() || height < params.low {
            continue;
        }
        let class = if height >= params.high {
            summary.high += 1;
            ClassCode::HighVegetation
        } else if height >= params.medium {
            summary.medium += 1;
            ClassCode::MediumVegetation
        } else {
            summary.low += 1;
            ClassCode::LowVegetation
        };
        buffer.set_class(index, class);
    }
    debug!(
        "height bands: {} low, {} medium, {} high vegetation points",
        summary.low, summary.medium, summary.high
    );
    Ok(summary)
}
