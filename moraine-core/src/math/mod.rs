mod bounds;
pub use self::bounds::*;

mod grid;
pub use self::grid::*;
