// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Point annotations and grid extents.

use crate::error::Error;

/// A 2D point annotation in pixel coordinates.
///
/// `x` is the column coordinate and `y` the row coordinate; the cell at
/// `(row, col)` covers `[col, col + 1) × [row, row + 1)`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Point {
    /// Column coordinate.
    pub x: f64,
    /// Row coordinate.
    pub y: f64,
}

impl Point {
    /// Creates a point from its column and row coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns true if both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Returns the Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        self.squared_distance(other).sqrt()
    }

    pub(crate) fn squared_distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    #[inline]
    pub(crate) fn coord(&self, axis: usize) -> f64 {
        if axis == 0 { self.x } else { self.y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self::new(x, y)
    }
}

/// Shape of a density map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    height: usize,
    width: usize,
}

impl Extent {
    /// Creates an extent of `height` rows and `width` columns.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidExtent`](crate::error::ErrorKind::InvalidExtent)
    /// if either dimension is zero or the cell count overflows `usize`.
    pub fn new(height: usize, width: usize) -> Result<Self, Error> {
        match height.checked_mul(width) {
            Some(cells) if cells > 0 => Ok(Self { height, width }),
            _ => Err(Error::invalid_extent(height, width)),
        }
    }

    /// Returns the number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of cells.
    pub fn cells(&self) -> usize {
        self.height * self.width
    }

    /// Shape after pooling by `factor`, rounding partial blocks up.
    pub(crate) fn pooled(&self, factor: usize) -> Extent {
        Extent {
            height: self.height.div_ceil(factor),
            width: self.width.div_ceil(factor),
        }
    }

    /// Returns the `(row, col)` of the cell containing `point`, or `None`
    /// if the point lies outside `[0, width) × [0, height)`.
    pub fn cell_of(&self, point: &Point) -> Option<(usize, usize)> {
        if !point.is_finite() || point.x < 0.0 || point.y < 0.0 {
            return None;
        }
        let col = point.x.floor();
        let row = point.y.floor();
        if col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_rejects_zero() {
        assert!(Extent::new(0, 10).is_err());
        assert!(Extent::new(10, 0).is_err());
        assert!(Extent::new(usize::MAX, 2).is_err());
        assert_eq!(Extent::new(3, 4).unwrap().cells(), 12);
    }

    #[test]
    fn test_cell_of() {
        let extent = Extent::new(10, 20).unwrap();
        assert_eq!(extent.cell_of(&Point::new(0.0, 0.0)), Some((0, 0)));
        assert_eq!(extent.cell_of(&Point::new(19.9, 9.5)), Some((9, 19)));
        assert_eq!(extent.cell_of(&Point::new(20.0, 5.0)), None);
        assert_eq!(extent.cell_of(&Point::new(5.0, 10.0)), None);
        assert_eq!(extent.cell_of(&Point::new(-0.5, 5.0)), None);
        assert_eq!(extent.cell_of(&Point::new(f64::NAN, 5.0)), None);
    }

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::from((3.0, 4.0));
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!(b.coord(0), 3.0);
        assert_eq!(b.coord(1), 4.0);
    }
}
