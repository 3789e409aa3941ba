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

//! The density map grid.

use std::ops::Range;

use crate::error::Error;
use crate::geometry::Extent;
use crate::serialization;

/// A `height × width` grid of non-negative densities in row-major order.
///
/// The sum over any region approximates the number of annotated points in
/// that region.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityMap {
    extent: Extent,
    data: Vec<f32>,
}

impl DensityMap {
    /// Creates an all-zero map.
    pub fn zeros(extent: Extent) -> Self {
        Self {
            extent,
            data: vec![0.0; extent.cells()],
        }
    }

    /// Creates a map from a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidExtent`](crate::error::ErrorKind::InvalidExtent)
    /// for a zero dimension and
    /// [`ErrorKind::ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid) if the
    /// buffer length does not match `height * width`.
    pub fn from_vec(height: usize, width: usize, data: Vec<f32>) -> Result<Self, Error> {
        let extent = Extent::new(height, width)?;
        if data.len() != extent.cells() {
            return Err(Error::config_invalid("buffer length does not match map shape")
                .with_context("expected", extent.cells())
                .with_context("actual", data.len()));
        }
        Ok(Self { extent, data })
    }

    /// Returns the number of rows.
    pub fn height(&self) -> usize {
        self.extent.height()
    }

    /// Returns the number of columns.
    pub fn width(&self) -> usize {
        self.extent.width()
    }

    /// Returns the shape of this map.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Returns the density at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is out of range.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        assert!(
            row < self.height() && col < self.width(),
            "cell ({row}, {col}) out of range for {}x{} map",
            self.height(),
            self.width()
        );
        self.data[row * self.width() + col]
    }

    /// Returns the row-major cell buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consumes the map and returns the row-major cell buffer.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Iterates over rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.width())
    }

    pub(crate) fn row_mut(&mut self, row: usize) -> &mut [f32] {
        let width = self.width();
        &mut self.data[row * width..(row + 1) * width]
    }

    /// Returns the total mass, accumulated in f64.
    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    /// Returns the mass inside `rows × cols`. Ranges are clipped to the grid.
    pub fn region_sum(&self, rows: Range<usize>, cols: Range<usize>) -> f64 {
        let row_end = rows.end.min(self.height());
        let col_end = cols.end.min(self.width());
        if rows.start >= row_end || cols.start >= col_end {
            return 0.0;
        }
        let width = self.width();
        self.data[rows.start * width..row_end * width]
            .chunks_exact(width)
            .map(|row| row[cols.start..col_end].iter().map(|&v| v as f64).sum::<f64>())
            .sum()
    }

    /// Returns the largest cell value.
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0f32, f32::max)
    }

    /// Returns the `(row, col)` of the largest cell; the first one on ties.
    pub fn argmax(&self) -> (usize, usize) {
        let mut best = 0;
        for (i, &v) in self.data.iter().enumerate() {
            if v > self.data[best] {
                best = i;
            }
        }
        (best / self.width(), best % self.width())
    }

    /// Down-samples by summing `factor × factor` blocks, so the total count
    /// is preserved. Blocks at the right and bottom edges may be partial.
    ///
    /// # Panics
    ///
    /// Panics if `factor` is 0.
    pub fn sum_pool(&self, factor: usize) -> DensityMap {
        assert!(factor > 0, "pooling factor must be at least 1");
        let extent = self.extent.pooled(factor);
        let out_w = extent.width();
        let mut acc = vec![0.0f64; extent.cells()];
        for (row, values) in self.rows().enumerate() {
            let out_row = &mut acc[(row / factor) * out_w..(row / factor + 1) * out_w];
            for (col, &v) in values.iter().enumerate() {
                out_row[col / factor] += v as f64;
            }
        }
        DensityMap {
            extent,
            data: acc.into_iter().map(|v| v as f32).collect(),
        }
    }

    /// Serializes the map as a NumPy `.npy` file (format 1.0, `<f4`, C order).
    pub fn serialize_npy(&self) -> Vec<u8> {
        serialization::encode_npy(self)
    }

    /// Deserializes a two-dimensional `<f4` or `<f8` NumPy array.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MalformedDeserializeData`](crate::error::ErrorKind::MalformedDeserializeData)
    /// if the bytes are truncated, not a NumPy array, or not a non-empty 2-D
    /// float array.
    pub fn deserialize_npy(bytes: &[u8]) -> Result<DensityMap, Error> {
        serialization::decode_npy(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(height: usize, width: usize) -> DensityMap {
        let data = (0..height * width).map(|v| v as f32).collect();
        DensityMap::from_vec(height, width, data).unwrap()
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        let err = DensityMap::from_vec(2, 3, vec![0.0; 5]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_region_sum_clips() {
        let map = ramp(3, 4);
        // rows 1..3, cols 2..4: 6 + 7 + 10 + 11
        assert_eq!(map.region_sum(1..3, 2..4), 34.0);
        assert_eq!(map.region_sum(1..10, 2..10), 34.0);
        assert_eq!(map.region_sum(5..9, 0..4), 0.0);
        assert_eq!(map.region_sum(0..3, 0..4), map.sum());
    }

    #[test]
    fn test_argmax_and_max() {
        let mut map = DensityMap::zeros(Extent::new(4, 5).unwrap());
        map.row_mut(2)[3] = 0.75;
        assert_eq!(map.argmax(), (2, 3));
        assert_eq!(map.max(), 0.75);
        assert_eq!(map.get(2, 3), 0.75);
    }

    #[test]
    fn test_sum_pool_partial_blocks() {
        let map = ramp(3, 5);
        let pooled = map.sum_pool(2);
        assert_eq!(pooled.height(), 2);
        assert_eq!(pooled.width(), 3);
        assert_eq!(pooled.sum(), map.sum());
        // top-left block: 0 + 1 + 5 + 6
        assert_eq!(pooled.get(0, 0), 12.0);
        // bottom-right block: just cell (2, 4)
        assert_eq!(pooled.get(1, 2), 14.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_out_of_range() {
        ramp(2, 2).get(2, 0);
    }
}
