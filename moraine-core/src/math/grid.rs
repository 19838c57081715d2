use num_traits::Float;

/// Regular, axis-aligned 2D raster with a world-space origin and spacing.
///
/// Node `(i, j)` sits at world position `(x_min + i * spacing, y_min + j * spacing)`,
/// rows are stored bottom-up in row-major order. Cells hold either a finite value
/// or NaN as the no-data marker. The grid covers exactly the bounding box it was
/// sized for and nothing more: `x_min + i * spacing <= x_max` for every valid `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2D<T: Float> {
    origin_x: f64,
    origin_y: f64,
    spacing: f64,
    cols: usize,
    rows: usize,
    values: Vec<T>,
}

impl<T: Float> Grid2D<T> {
    /// Creates a grid with every cell set to `value`. Panics if `spacing` is not a positive
    /// finite number
    pub fn filled(origin: (f64, f64), spacing: f64, cols: usize, rows: usize, value: T) -> Self {
        if !(spacing.is_finite() && spacing > 0.0) {
            panic!("Grid2D: spacing must be a positive finite number");
        }
        Self {
            origin_x: origin.0,
            origin_y: origin.1,
            spacing,
            cols,
            rows,
            values: vec![value; cols * rows],
        }
    }

    /// Creates a grid with every cell marked as no-data
    pub fn nodata(origin: (f64, f64), spacing: f64, cols: usize, rows: usize) -> Self {
        Self::filled(origin, spacing, cols, rows, T::nan())
    }

    /// Creates a grid over existing row-major cell values. Panics if the value count does not
    /// match `cols * rows`
    pub fn from_values(
        origin: (f64, f64),
        spacing: f64,
        cols: usize,
        rows: usize,
        values: Vec<T>,
    ) -> Self {
        if values.len() != cols * rows {
            panic!(
                "Grid2D: {} values do not fill a {}x{} grid",
                values.len(),
                cols,
                rows
            );
        }
        let mut grid = Self::filled(origin, spacing, cols, rows, T::nan());
        grid.values = values;
        grid
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.origin_y)
    }

    /// Number of cells in this grid
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, col: usize, row: usize) -> T {
        self.values[row * self.cols + col]
    }

    pub fn set(&mut self, col: usize, row: usize, value: T) {
        self.values[row * self.cols + col] = value;
    }

    /// Returns true if the cell holds a finite value
    pub fn is_valid(&self, col: usize, row: usize) -> bool {
        self.get(col, row).is_finite()
    }

    /// World position of the grid node `(col, row)`
    pub fn node_position(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + col as f64 * self.spacing,
            self.origin_y + row as f64 * self.spacing,
        )
    }

    /// The cell covering the given world position, or `None` if the position lies outside the
    /// grid. Positions right on the upper boundary map into the last cell
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if self.cols == 0 || self.rows == 0 {
            return None;
        }
        let fx = (x - self.origin_x) / self.spacing;
        let fy = (y - self.origin_y) / self.spacing;
        if !fx.is_finite() || !fy.is_finite() || fx < 0.0 || fy < 0.0 {
            return None;
        }
        let col = match fx as usize {
            c if c < self.cols => c,
            c if c == self.cols && fx <= self.cols as f64 => self.cols - 1,
            _ => return None,
        };
        let row = match fy as usize {
            r if r < self.rows => r,
            r if r == self.rows && fy <= self.rows as f64 => self.rows - 1,
            _ => return None,
        };
        Some((col, row))
    }

    /// Number of cells holding a finite value
    pub fn valid_cells(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }

    /// Minimum and maximum over all finite cells, or `None` if no cell is valid
    pub fn value_range(&self) -> Option<(T, T)> {
        let mut range = None;
        for value in self.values.iter().copied().filter(|v| v.is_finite()) {
            range = match range {
                None => Some((value, value)),
                Some((lo, hi)) => Some((lo.min(value), hi.max(value))),
            };
        }
        range
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Iterates all cells as `(col, row, value)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let cols = self.cols;
        self.values
            .iter()
            .copied()
            .enumerate()
            .map(move |(idx, value)| (idx % cols, idx / cols, value))
    }
}
