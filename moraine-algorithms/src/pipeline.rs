use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use rayon::prelude::*;

use moraine_core::containers::PointCloudBuffer;
use moraine_core::error::{MoraineError, Result};

use crate::contour::{contour_levels, trace_contours, Contour, StyleTable, DEFAULT_LEVEL_STEP};
use crate::ground_filter::{classify_ground, GroundFilterParams, GroundSurfaceModel};
use crate::gridding::{rasterize_subset, RasterOutcome, SkipReason};
use crate::height::{
    classify_height_bands, normalize_heights, HeightBandParams, HeightBandSummary, HeightSummary,
};
use crate::selection::{select_classes, ClassFilter};

/// One classification request: ground filtering followed by height normalization and
/// vegetation height bands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationRequest {
    pub ground: GroundFilterParams,
    pub bands: HeightBandParams,
}

/// Result of one classification request. The classification and height columns of the
/// buffer hold the per-point results; this summarizes them
#[derive(Debug)]
pub struct ClassificationOutcome {
    pub ground_surface: GroundSurfaceModel,
    pub heights: HeightSummary,
    pub bands: HeightBandSummary,
    /// Point counts per classification code after all stages
    pub class_histogram: BTreeMap<u8, usize>,
}

/// Runs the classification stages over the buffer, strictly in sequence.
///
/// Each stage commits its column only on success, so a request that fails (or is
/// abandoned) between stages never leaves a partially classified buffer behind. No state
/// survives the request; a repeated request starts from the raw coordinates again and
/// yields the same result.
pub fn run_classification(
    buffer: &mut PointCloudBuffer,
    request: &ClassificationRequest,
) -> Result<ClassificationOutcome> {
    request.ground.validate()?;
    request.bands.validate()?;
    if buffer.is_empty() {
        return Err(MoraineError::invalid_input(
            "cannot classify an empty point cloud",
        ));
    }

    let ground_surface = classify_ground(buffer, &request.ground)?;
    let heights = normalize_heights(buffer)?;
    let bands = classify_height_bands(buffer, &request.bands)?;
    let class_histogram = buffer.class_histogram();
    info!(
        "classification finished: {:?} points per class",
        class_histogram
    );
    Ok(ClassificationOutcome {
        ground_surface,
        heights,
        bands,
        class_histogram,
    })
}

/// One contour-generation request over an already classified buffer
#[derive(Debug, Clone, PartialEq)]
pub struct ContourRequest {
    /// Classes to derive contours for; classes are processed independently
    pub classes: BTreeSet<u8>,
    /// Node spacing of the interpolated elevation grids
    pub grid_spacing: f64,
    /// Line width applied uniformly to every contour of this request
    pub line_width: f64,
    /// Iso-level increment per class
    pub level_step: f64,
    /// Per-class color overrides on top of the default style table
    pub custom_colors: BTreeMap<u8, String>,
}

impl Default for ContourRequest {
    fn default() -> Self {
        let mut classes = BTreeSet::new();
        classes.insert(2);
        Self {
            classes,
            grid_spacing: 1.0,
            line_width: 1.0,
            level_step: DEFAULT_LEVEL_STEP,
            custom_colors: BTreeMap::new(),
        }
    }
}

impl ContourRequest {
    pub fn validate(&self) -> Result<()> {
        let positive: [(&'static str, f64); 3] = [
            ("grid_spacing", self.grid_spacing),
            ("line_width", self.line_width),
            ("level_step", self.level_step),
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
        Ok(())
    }
}

/// Contours of one request, ordered by class and then by level, plus the classes that
/// produced no contours and why
#[derive(Debug)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
    pub skipped: Vec<(u8, SkipReason)>,
}

/// Generates styled contours for every requested class.
///
/// Per class: select the class's points, interpolate their elevations onto a grid with
/// the requested spacing, and trace iso-lines at levels derived from the class's own
/// elevation range. The classes are independent of each other and are processed in
/// parallel; a class that cannot be interpolated is reported in
/// [skipped](ContourSet::skipped) without affecting its siblings.
pub fn generate_contours(
    buffer: &PointCloudBuffer,
    request: &ContourRequest,
) -> Result<ContourSet> {
    request.validate()?;

    let mut styles = StyleTable::default();
    for (&class, color) in &request.custom_colors {
        styles = styles.with_color(class, color.clone());
    }

    let classes: Vec<u8> = request.classes.iter().copied().collect();
    let per_class: Vec<(u8, std::result::Result<Vec<Contour>, SkipReason>)> = classes
        .par_iter()
        .map(|&class| -> Result<(u8, std::result::Result<Vec<Contour>, SkipReason>)> {
            let subset = select_classes(buffer, &ClassFilter::single(class));
            match rasterize_subset(buffer, &subset, request.grid_spacing)? {
                RasterOutcome::Skipped(reason) => Ok((class, Err(reason))),
                RasterOutcome::Grid(scalar) => {
                    let (z_min, z_max) = scalar.z_range();
                    let levels = contour_levels(z_min, z_max, request.level_step);
                    let contours =
                        trace_contours(&scalar, class, &levels, &styles, request.line_width);
                    Ok((class, Ok(contours)))
                }
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let mut contours = Vec::new();
    let mut skipped = Vec::new();
    for (class, outcome) in per_class {
        match outcome {
            Ok(class_contours) => contours.extend(class_contours),
            Err(reason) => {
                debug!("no contours for class {}: {}", class, reason);
                skipped.push((class, reason));
            }
        }
    }
    info!(
        "contour generation finished: {} contours, {} classes skipped",
        contours.len(),
        skipped.len()
    );
    Ok(ContourSet { contours, skipped })
}

#[cfg(test)]
mod tests {
    use moraine_core::classification::ClassCode;
    use moraine_core::nalgebra::Point3;

    use super::*;

    /// A rolling terrain patch (20x20) with a dense canopy block over one quarter
    fn terrain_with_canopy() -> PointCloudBuffer {
        let mut positions = Vec::new();
        for i in 0..41 {
            for j in 0..41 {
                let x = i as f64 * 0.5;
                let y = j as f64 * 0.5;
                let z = 100.0 + (x * 0.05) + (y * 0.02);
                positions.push(Point3::new(x, y, z));
            }
        }
        // canopy 12 units above the terrain over [2, 8) x [2, 8)
        for i in 0..24 {
            for j in 0..24 {
                let x = 2.0 + i as f64 * 0.25;
                let y = 2.0 + j as f64 * 0.25;
                let z = 112.0 + (x * 0.05) + (y * 0.02);
                positions.push(Point3::new(x, y, z));
            }
        }
        PointCloudBuffer::from_positions(positions)
    }

    #[test]
    fn full_pipeline_classifies_and_contours() {
        let mut buffer = terrain_with_canopy();
        let outcome = run_classification(&mut buffer, &ClassificationRequest::default()).unwrap();
        // the terrain lattice is ground, the canopy is high vegetation
        assert_eq!(outcome.class_histogram.get(&2), Some(&(41 * 41)));
        assert_eq!(outcome.class_histogram.get(&5), Some(&(24 * 24)));
        assert_eq!(outcome.bands.high, 24 * 24);

        let request = ContourRequest {
            classes: [2u8, 5].iter().copied().collect(),
            ..ContourRequest::default()
        };
        let contour_set = generate_contours(&buffer, &request).unwrap();
        assert!(contour_set.skipped.is_empty());
        assert!(!contour_set.contours.is_empty());
        // results are grouped by class in ascending order
        let ground_contours = contour_set.contours.iter().filter(|c| c.class == 2).count();
        let canopy_contours = contour_set.contours.iter().filter(|c| c.class == 5).count();
        assert!(ground_contours > 0);
        assert!(canopy_contours > 0);
        let first_canopy = contour_set
            .contours
            .iter()
            .position(|c| c.class == 5)
            .unwrap();
        assert!(contour_set.contours[..first_canopy]
            .iter()
            .all(|c| c.class == 2));
    }

    #[test]
    fn sparse_classes_are_skipped_without_aborting_siblings() {
        let mut buffer = terrain_with_canopy();
        run_classification(&mut buffer, &ClassificationRequest::default()).unwrap();
        // water was never assigned, its subset is empty
        let request = ContourRequest {
            classes: [2u8, 9].iter().copied().collect(),
            ..ContourRequest::default()
        };
        let contour_set = generate_contours(&buffer, &request).unwrap();
        assert!(contour_set.contours.iter().any(|c| c.class == 2));
        assert_eq!(contour_set.skipped.len(), 1);
        match contour_set.skipped[0] {
            (9, SkipReason::TooFewPoints(0)) => {}
            other => panic!("expected class 9 to be skipped as empty, got {:?}", other),
        }
    }

    #[test]
    fn custom_colors_override_only_their_class() {
        let mut buffer = terrain_with_canopy();
        run_classification(&mut buffer, &ClassificationRequest::default()).unwrap();
        let mut custom_colors = BTreeMap::new();
        custom_colors.insert(2u8, "#112233".to_string());
        let request = ContourRequest {
            classes: [2u8, 5].iter().copied().collect(),
            custom_colors,
            ..ContourRequest::default()
        };
        let contour_set = generate_contours(&buffer, &request).unwrap();
        for contour in &contour_set.contours {
            match contour.class {
                2 => assert_eq!(contour.style.color, "#112233"),
                5 => assert_eq!(contour.style.color, "darkgreen"),
                other => panic!("unrequested class {} in result", other),
            }
        }
    }

    #[test]
    fn invalid_spacing_aborts_the_whole_request() {
        let mut buffer = terrain_with_canopy();
        run_classification(&mut buffer, &ClassificationRequest::default()).unwrap();
        let request = ContourRequest {
            grid_spacing: 0.0,
            ..ContourRequest::default()
        };
        match generate_contours(&buffer, &request) {
            Err(MoraineError::InvalidConfiguration { parameter, .. }) => {
                assert_eq!(parameter, "grid_spacing")
            }
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[test]
    fn empty_cloud_cannot_be_classified() {
        let mut buffer = PointCloudBuffer::from_positions(Vec::new());
        let result = run_classification(&mut buffer, &ClassificationRequest::default());
        assert!(matches!(result, Err(MoraineError::InvalidInput { .. })));
    }

    #[test]
    fn classify_then_reselect_ground_range_is_plain_composition() {
        let mut buffer = terrain_with_canopy();
        run_classification(&mut buffer, &ClassificationRequest::default()).unwrap();
        let via_range = select_classes(&buffer, &ClassFilter::Range(2, 2));
        let via_set = select_classes(&buffer, &ClassFilter::single(2));
        assert_eq!(via_range, via_set);
        assert_eq!(via_range.len(), 41 * 41);
        assert!(via_range
            .iter()
            .all(|&index| buffer.class_of(index) == ClassCode::Ground));
    }
}
