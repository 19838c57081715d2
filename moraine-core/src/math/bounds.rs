use nalgebra::{ClosedSub, Point3, Scalar, Vector3};

/// 3D axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB<T: Scalar + PartialOrd> {
    min: Point3<T>,
    max: Point3<T>,
}

impl<T: Scalar + ClosedSub + PartialOrd + Copy> AABB<T> {
    /// Creates a new AABB from the given minimum and maximum coordinates. Panics if the minimum
    /// position is not less than or equal to the maximum position
    /// ```
    /// # use moraine_core::math::AABB;
    /// use moraine_core::nalgebra::Point3;
    /// let bounds = AABB::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 1.0));
    /// ```
    pub fn from_min_max(min: Point3<T>, max: Point3<T>) -> Self {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            panic!("AABB::from_min_max: Minimum position must be <= maximum position!");
        }
        Self { min, max }
    }

    /// Computes the bounds of all points yielded by the given iterator. Returns `None` for an
    /// empty iterator
    /// ```
    /// # use moraine_core::math::AABB;
    /// use moraine_core::nalgebra::Point3;
    /// let points = vec![Point3::new(1.0, 2.0, 3.0), Point3::new(-1.0, 0.0, 5.0)];
    /// let bounds = AABB::from_points(points.into_iter()).unwrap();
    /// assert_eq!(*bounds.min(), Point3::new(-1.0, 0.0, 3.0));
    /// assert_eq!(*bounds.max(), Point3::new(1.0, 2.0, 5.0));
    /// ```
    pub fn from_points(mut points: impl Iterator<Item = Point3<T>>) -> Option<Self> {
        let first = points.next()?;
        let mut bounds = Self {
            min: first,
            max: first,
        };
        for point in points {
            bounds = Self::extend_with_point(&bounds, &point);
        }
        Some(bounds)
    }

    /// Returns the minimum point of this AABB
    pub fn min(&self) -> &Point3<T> {
        &self.min
    }

    /// Returns the maximum point of this AABB
    pub fn max(&self) -> &Point3<T> {
        &self.max
    }

    /// Returns the extent of this AABB, i.e. the size between its minimum and maximum position
    pub fn extent(&self) -> Vector3<T> {
        self.max - self.min
    }

    /// Returns true if the given point is contained within this AABB. Points right on the
    /// boundary count as contained
    pub fn contains(&self, point: &Point3<T>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Extends the given AABB so that it contains the given point
    pub fn extend_with_point(bounds: &AABB<T>, point: &Point3<T>) -> AABB<T> {
        let mut min = bounds.min;
        let mut max = bounds.max;
        if point.x < min.x {
            min.x = point.x;
        }
        if point.y < min.y {
            min.y = point.y;
        }
        if point.z < min.z {
            min.z = point.z;
        }
        if point.x > max.x {
            max.x = point.x;
        }
        if point.y > max.y {
            max.y = point.y;
        }
        if point.z > max.z {
            max.z = point.z;
        }
        AABB { min, max }
    }
}
