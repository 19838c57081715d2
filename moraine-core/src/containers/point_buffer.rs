use std::collections::BTreeMap;

use nalgebra::Point3;

use crate::classification::ClassCode;
use crate::error::{MoraineError, Result};
use crate::math::AABB;

/// In-memory columnar store for one point cloud.
///
/// Positions (and the optional intensity column) are fixed at construction;
/// the classification and height-above-ground columns are mutable and always
/// have the same length as the position column. Point order carries no meaning
/// but is preserved, so indices into the buffer stay valid across all stages.
///
/// Classification writes go through [commit_classification](Self::commit_classification)
/// or [set_class](Self::set_class), which keep the column inside the closed
/// [ClassCode] set. Heights default to NaN, meaning "not yet computed" or
/// "no ground surface below this point".
#[derive(Debug, Clone)]
pub struct PointCloudBuffer {
    positions: Vec<Point3<f64>>,
    intensities: Option<Vec<u16>>,
    classification: Vec<u8>,
    height_above_ground: Vec<f64>,
}

impl PointCloudBuffer {
    /// Creates a buffer over the given positions with no intensity column. All points start
    /// unclassified with NaN height
    pub fn from_positions(positions: Vec<Point3<f64>>) -> Self {
        let count = positions.len();
        Self {
            positions,
            intensities: None,
            classification: vec![ClassCode::Unclassified.code(); count],
            height_above_ground: vec![f64::NAN; count],
        }
    }

    /// Creates a buffer over the given positions and per-point intensities
    pub fn with_intensities(positions: Vec<Point3<f64>>, intensities: Vec<u16>) -> Result<Self> {
        if positions.len() != intensities.len() {
            return Err(MoraineError::invalid_input(format!(
                "intensity column length {} does not match point count {}",
                intensities.len(),
                positions.len()
            )));
        }
        let mut buffer = Self::from_positions(positions);
        buffer.intensities = Some(intensities);
        Ok(buffer)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, index: usize) -> Point3<f64> {
        self.positions[index]
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn intensity(&self, index: usize) -> Option<u16> {
        self.intensities.as_ref().map(|column| column[index])
    }

    /// Returns true if all three coordinates of the point are finite. Non-finite points are
    /// excluded from surface fitting and never classified as ground
    pub fn has_finite_position(&self, index: usize) -> bool {
        let p = self.positions[index];
        p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
    }

    pub fn classification(&self) -> &[u8] {
        &self.classification
    }

    pub fn class_of(&self, index: usize) -> ClassCode {
        // the column only ever holds codes from the closed set
        ClassCode::from_code(self.classification[index])
            .expect("classification column holds a code outside the closed set")
    }

    pub fn set_class(&mut self, index: usize, class: ClassCode) {
        self.classification[index] = class.code();
    }

    /// Replaces the whole classification column. The column must match the point count and
    /// every code must be part of the closed set; on error the buffer is left unchanged
    pub fn commit_classification(&mut self, column: Vec<u8>) -> Result<()> {
        if column.len() != self.len() {
            return Err(MoraineError::invalid_input(format!(
                "classification column length {} does not match point count {}",
                column.len(),
                self.len()
            )));
        }
        if let Some(code) = column
            .iter()
            .copied()
            .find(|&code| ClassCode::from_code(code).is_none())
        {
            return Err(MoraineError::invalid_input(format!(
                "classification code {} is not supported",
                code
            )));
        }
        self.classification = column;
        Ok(())
    }

    /// Resets every point to unclassified. Runs before each classification pass so that
    /// re-running with identical parameters yields identical results
    pub fn reset_classification(&mut self) {
        for code in self.classification.iter_mut() {
            *code = ClassCode::Unclassified.code();
        }
    }

    pub fn heights(&self) -> &[f64] {
        &self.height_above_ground
    }

    pub fn height_of(&self, index: usize) -> f64 {
        self.height_above_ground[index]
    }

    /// Replaces the whole height-above-ground column; the column must match the point count
    pub fn commit_heights(&mut self, column: Vec<f64>) -> Result<()> {
        if column.len() != self.len() {
            return Err(MoraineError::invalid_input(format!(
                "height column length {} does not match point count {}",
                column.len(),
                self.len()
            )));
        }
        self.height_above_ground = column;
        Ok(())
    }

    /// Resets every height to NaN (unset)
    pub fn reset_heights(&mut self) {
        for height in self.height_above_ground.iter_mut() {
            *height = f64::NAN;
        }
    }

    /// Bounds over all points with finite positions, or `None` if there are none
    pub fn bounds(&self) -> Option<AABB<f64>> {
        AABB::from_points(
            self.positions
                .iter()
                .copied()
                .filter(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite()),
        )
    }

    /// Point counts per classification code, for result summaries
    pub fn class_histogram(&self) -> BTreeMap<u8, usize> {
        let mut histogram = BTreeMap::new();
        for code in self.classification.iter().copied() {
            *histogram.entry(code).or_insert(0) += 1;
        }
        histogram
    }
}
