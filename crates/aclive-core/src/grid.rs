//! Row-major 2D grids shared by every pipeline stage.
//!
//! Row 0 is the southernmost row (smallest y), column 0 the westernmost
//! (smallest x); `x_coords` and `y_coords` are therefore both ascending.

/// A dense row-major 2D array.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    pub data: Vec<T>,
    pub width: usize,
    pub height: usize,
}

impl<T: Clone> Grid<T> {
    /// Create a new grid filled with the given value.
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
        }
    }
}

impl<T: Copy> Grid<T> {
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: T) {
        self.data[row * self.width + col] = val;
    }

    /// Apply `f` to every cell, keeping the shape.
    pub fn map<U>(&self, f: impl Fn(T) -> U) -> Grid<U> {
        Grid {
            data: self.data.iter().map(|&v| f(v)).collect(),
            width: self.width,
            height: self.height,
        }
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// `true` marks a cell inside the parcel with a defined elevation.
pub type ValidityMask = Grid<bool>;

/// Slope percent per cell; `None` marks an undefined cell.
pub type SlopeGrid = Grid<Option<f64>>;

impl Grid<bool> {
    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

/// Cells that are mask-valid and carry a value. Invalidity is decided the
/// same way at every stage: outside the mask or undefined.
pub fn valid_values(values: &Grid<Option<f64>>, mask: &ValidityMask) -> Vec<f64> {
    values
        .data
        .iter()
        .zip(&mask.data)
        .filter_map(|(&v, &m)| if m { v.filter(|x| x.is_finite()) } else { None })
        .collect()
}

/// Elevation samples on a regular planar grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    /// `elev[y][x]`; `None` where no elevation was sampled.
    pub elev: Grid<Option<f64>>,
    /// Cell-centre x coordinates, ascending, metres.
    pub x_coords: Vec<f64>,
    /// Cell-centre y coordinates, ascending, metres.
    pub y_coords: Vec<f64>,
    /// Grid spacing, metres, > 0.
    pub step: f64,
}

impl ElevationGrid {
    pub fn width(&self) -> usize {
        self.x_coords.len()
    }

    pub fn height(&self) -> usize {
        self.y_coords.len()
    }

    /// Dimensions agree with the axis vectors and the step is positive.
    pub fn is_consistent(&self) -> bool {
        self.elev.width == self.x_coords.len()
            && self.elev.height == self.y_coords.len()
            && self.step > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_row_major() {
        let mut g = Grid::new(3, 2, 0i32);
        g.set(1, 2, 7);
        assert_eq!(g.data[5], 7);
        assert_eq!(g.get(1, 2), 7);
    }

    #[test]
    fn valid_values_requires_mask_and_value() {
        let values = Grid {
            data: vec![Some(1.0), None, Some(3.0), Some(f64::NAN)],
            width: 2,
            height: 2,
        };
        let mask = Grid { data: vec![true, true, false, true], width: 2, height: 2 };
        assert_eq!(valid_values(&values, &mask), vec![1.0]);
    }

    #[test]
    fn elevation_grid_consistency() {
        let g = ElevationGrid {
            elev: Grid::new(3, 2, Some(1.0)),
            x_coords: vec![0.0, 1.0, 2.0],
            y_coords: vec![0.0, 1.0],
            step: 1.0,
        };
        assert!(g.is_consistent());
        assert_eq!((g.width(), g.height()), (3, 2));
    }
}
