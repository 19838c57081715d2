use std::collections::BTreeSet;

use moraine_core::containers::PointCloudBuffer;

/// Predicate over the classification column.
///
/// A single-class set and the degenerate range covering the same class select exactly the
/// same points:
/// ```
/// use moraine_algorithms::selection::ClassFilter;
/// let set = ClassFilter::single(2);
/// let range = ClassFilter::Range(2, 2);
/// for code in 0..=255u8 {
///     assert_eq!(set.matches(code), range.matches(code));
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassFilter {
    /// Points whose class is contained in the set
    Set(BTreeSet<u8>),
    /// Points whose class lies in the inclusive code interval
    Range(u8, u8),
}

impl ClassFilter {
    pub fn single(class: u8) -> Self {
        let mut classes = BTreeSet::new();
        classes.insert(class);
        ClassFilter::Set(classes)
    }

    pub fn from_classes(classes: impl IntoIterator<Item = u8>) -> Self {
        ClassFilter::Set(classes.into_iter().collect())
    }

    pub fn matches(&self, code: u8) -> bool {
        match self {
            ClassFilter::Set(classes) => classes.contains(&code),
            ClassFilter::Range(low, high) => *low <= code && code <= *high,
        }
    }
}

/// Returns the indices of all points matching the filter, in point order.
///
/// Indices instead of copies: the caller keeps working against the buffer's coordinate
/// columns without duplicating them.
pub fn select_classes(buffer: &PointCloudBuffer, filter: &ClassFilter) -> Vec<usize> {
    buffer
        .classification()
        .iter()
        .enumerate()
        .filter(|(_, &code)| filter.matches(code))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use moraine_core::classification::ClassCode;
    use moraine_core::nalgebra::Point3;

    use super::*;

    fn labeled_buffer() -> PointCloudBuffer {
        let mut buffer = PointCloudBuffer::from_positions(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
        ]);
        buffer.set_class(0, ClassCode::Ground);
        buffer.set_class(1, ClassCode::LowVegetation);
        buffer.set_class(2, ClassCode::HighVegetation);
        buffer.set_class(3, ClassCode::Water);
        buffer
    }

    #[test]
    fn set_selection_returns_indices_in_point_order() {
        let buffer = labeled_buffer();
        let selected = select_classes(&buffer, &ClassFilter::from_classes(vec![2, 9]));
        assert_eq!(selected, vec![0, 3]);
    }

    #[test]
    fn single_class_set_equals_degenerate_range() {
        let buffer = labeled_buffer();
        let from_set = select_classes(&buffer, &ClassFilter::single(2));
        let from_range = select_classes(&buffer, &ClassFilter::Range(2, 2));
        assert_eq!(from_set, from_range);
        assert_eq!(from_set, vec![0]);
    }

    #[test]
    fn range_selection_covers_the_interval() {
        let buffer = labeled_buffer();
        // all vegetation tiers
        let selected = select_classes(&buffer, &ClassFilter::Range(3, 5));
        assert_eq!(selected, vec![1, 2]);
    }

    #[test]
    fn empty_selection_is_empty_not_an_error() {
        let buffer = labeled_buffer();
        let selected = select_classes(&buffer, &ClassFilter::single(6));
        assert!(selected.is_empty());
    }
}
