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

//! Truncated Gaussian kernels and their application onto a density map.
//!
//! An isotropic 2D Gaussian is separable, so smoothing a unit impulse yields
//! the outer product of two 1D kernels. [`stamp`] adds that outer product
//! directly into the map over the window that overlaps the grid, which costs
//! `O(window)` per point instead of a full-image convolution.

use std::f64::consts::PI;

use crate::map::DensityMap;

/// Default truncation, in standard deviations.
pub const DEFAULT_TRUNCATE: f64 = 3.0;

// Windows wider than this are normalized in closed form.
const MAX_EXACT_RADIUS: usize = 1 << 14;

/// How kernel mass falling outside the grid is treated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryMode {
    /// Zero padding: mass outside the grid is dropped.
    #[default]
    Constant,
    /// The clipped kernel is rescaled so its in-grid mass is exactly 1.
    Renormalize,
}

/// A normalized 1D Gaussian truncated at `truncate` standard deviations.
///
/// The radius is `floor(truncate * sigma + 0.5)` and the weights are
/// `exp(-x² / 2σ²)` for `x` in `[-radius, radius]`, divided by their sum.
/// Only offsets up to a caller-supplied `limit` are stored; the
/// normalization always covers the full window.
#[derive(Debug, Clone)]
pub struct GaussianKernel1d {
    sigma: f64,
    radius: usize,
    weights: Vec<f64>,
}

impl GaussianKernel1d {
    /// Builds a kernel storing its whole window.
    ///
    /// # Panics
    ///
    /// Panics if `sigma` or `truncate` is not positive and finite.
    ///
    /// # Examples
    ///
    /// ```
    /// # use densitymap::kernel::GaussianKernel1d;
    /// let k = GaussianKernel1d::new(1.0, 3.0);
    /// assert_eq!(k.radius(), 3);
    /// assert!((k.weights().iter().sum::<f64>() - 1.0).abs() < 1e-12);
    /// ```
    pub fn new(sigma: f64, truncate: f64) -> Self {
        Self::with_limit(sigma, truncate, usize::MAX)
    }

    /// Builds a kernel storing offsets up to `limit` only.
    ///
    /// # Panics
    ///
    /// Panics if `sigma` or `truncate` is not positive and finite.
    pub fn with_limit(sigma: f64, truncate: f64, limit: usize) -> Self {
        assert!(
            sigma.is_finite() && sigma > 0.0,
            "sigma must be > 0 and finite, got {sigma}"
        );
        assert!(
            truncate.is_finite() && truncate > 0.0,
            "truncate must be > 0 and finite, got {truncate}"
        );

        let radius_f = (truncate * sigma + 0.5).floor();
        let radius = if radius_f >= usize::MAX as f64 {
            usize::MAX / 2
        } else {
            radius_f as usize
        };
        let span = radius.min(limit);
        let two_sigma_sq = 2.0 * sigma * sigma;
        let gauss = |x: f64| (-x * x / two_sigma_sq).exp();

        let mut weights: Vec<f64> = (0..=2 * span)
            .map(|i| gauss(i as f64 - span as f64))
            .collect();

        let total = if radius == span {
            weights.iter().sum::<f64>()
        } else if radius <= MAX_EXACT_RADIUS {
            (-(radius as isize)..=radius as isize)
                .map(|x| gauss(x as f64))
                .sum::<f64>()
        } else {
            // Riemann sum of the window approximated by the integral over
            // [-radius - 0.5, radius + 0.5].
            let half_width = radius as f64 + 0.5;
            sigma * (2.0 * PI).sqrt() * erf(half_width / (sigma * std::f64::consts::SQRT_2))
        };
        for w in &mut weights {
            *w /= total;
        }

        Self {
            sigma,
            radius,
            weights,
        }
    }

    /// Returns the standard deviation.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Returns the truncation radius in cells.
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Returns the stored half-width, `min(radius, limit)`.
    pub fn span(&self) -> usize {
        self.weights.len() / 2
    }

    /// Returns the stored weights for offsets `-span..=span`.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Adds the 2D kernel `kernel ⊗ kernel` centred at `(row, col)` into `map`
/// and returns the mass that landed inside the grid.
///
/// # Panics
///
/// Panics if `(row, col)` lies outside the map.
pub fn stamp(
    map: &mut DensityMap,
    row: usize,
    col: usize,
    kernel: &GaussianKernel1d,
    boundary: BoundaryMode,
) -> f64 {
    let (height, width) = (map.height(), map.width());
    assert!(row < height && col < width, "impulse outside the map");

    let span = kernel.span();
    let weights = kernel.weights();
    let row_lo = row.saturating_sub(span);
    let row_hi = row.saturating_add(span).min(height - 1);
    let col_lo = col.saturating_sub(span);
    let col_hi = col.saturating_add(span).min(width - 1);

    // Offset into `weights` of the first in-grid tap.
    let row_tap = span + row_lo - row;
    let col_tap = span + col_lo - col;
    let row_weights = &weights[row_tap..row_tap + (row_hi - row_lo + 1)];
    let col_weights = &weights[col_tap..col_tap + (col_hi - col_lo + 1)];

    let row_mass: f64 = row_weights.iter().sum();
    let col_mass: f64 = col_weights.iter().sum();
    // Each axis is rescaled on its own: the product of two tiny masses of a
    // very wide kernel underflows.
    let (row_scale, col_scale) = match boundary {
        BoundaryMode::Constant => (1.0, 1.0),
        // The centre tap is always in the grid, so both masses are positive.
        BoundaryMode::Renormalize => (1.0 / row_mass, 1.0 / col_mass),
    };

    for (y, &wy) in (row_lo..=row_hi).zip(row_weights) {
        let wy = wy * row_scale;
        let cells = &mut map.row_mut(y)[col_lo..=col_hi];
        for (cell, &wx) in cells.iter_mut().zip(col_weights) {
            *cell += (wy * (wx * col_scale)) as f32;
        }
    }
    (row_mass * row_scale) * (col_mass * col_scale)
}

// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Extent;

    #[test]
    fn test_kernel_properties() {
        let k = GaussianKernel1d::new(2.0, DEFAULT_TRUNCATE);
        assert_eq!(k.radius(), 6);
        assert_eq!(k.weights().len(), 13);
        assert!((k.weights().iter().sum::<f64>() - 1.0).abs() < 1e-12);
        for i in 0..6 {
            assert!((k.weights()[i] - k.weights()[12 - i]).abs() < 1e-15);
            assert!(k.weights()[i] < k.weights()[i + 1]);
        }
    }

    #[test]
    fn test_radius_rounds_half_up() {
        assert_eq!(GaussianKernel1d::new(0.5, 3.0).radius(), 2);
        assert_eq!(GaussianKernel1d::new(0.1, 3.0).radius(), 0);
        assert_eq!(GaussianKernel1d::new(1e-3, 3.0).weights(), &[1.0]);
    }

    #[test]
    fn test_limited_kernel_keeps_full_normalization() {
        let full = GaussianKernel1d::new(4.0, 3.0);
        let limited = GaussianKernel1d::with_limit(4.0, 3.0, 3);
        assert_eq!(limited.radius(), full.radius());
        assert_eq!(limited.span(), 3);
        let offset = full.span() - 3;
        for (a, b) in limited.weights().iter().zip(&full.weights()[offset..]) {
            assert!((a - b).abs() < 1e-15);
        }
    }

    #[test]
    fn test_huge_sigma_normalization_is_close() {
        let sigma = 20_000.0;
        let limited = GaussianKernel1d::with_limit(sigma, 3.0, 0);
        let exact_center = 1.0 / (sigma * (2.0 * PI).sqrt() * 0.997_300_2);
        assert!((limited.weights()[0] - exact_center).abs() / exact_center < 1e-5);
    }

    #[test]
    fn test_stamp_interior_and_corner() {
        let extent = Extent::new(21, 21).unwrap();
        let k = GaussianKernel1d::new(1.5, DEFAULT_TRUNCATE);

        let mut map = DensityMap::zeros(extent);
        let mass = stamp(&mut map, 10, 10, &k, BoundaryMode::Constant);
        assert!((mass - 1.0).abs() < 1e-12);
        assert!((map.sum() - 1.0).abs() < 1e-5);
        assert_eq!(map.argmax(), (10, 10));

        let mut corner = DensityMap::zeros(extent);
        let lost = stamp(&mut corner, 0, 0, &k, BoundaryMode::Constant);
        assert!(lost > 0.38 && lost < 0.42);

        let mut renorm = DensityMap::zeros(extent);
        let kept = stamp(&mut renorm, 0, 0, &k, BoundaryMode::Renormalize);
        assert!((kept - 1.0).abs() < 1e-12);
        assert!((renorm.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_renormalize_very_wide_kernel() {
        let extent = Extent::new(10, 10).unwrap();
        let k = GaussianKernel1d::with_limit(1e15, DEFAULT_TRUNCATE, 10);
        assert!(k.weights().iter().all(|w| w.is_finite() && *w > 0.0));

        let mut map = DensityMap::zeros(extent);
        let kept = stamp(&mut map, 0, 9, &k, BoundaryMode::Renormalize);
        assert!((kept - 1.0).abs() < 1e-9);
        assert!(map.as_slice().iter().all(|v| v.is_finite() && *v > 0.0));
        assert!((map.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_erf_reference_values() {
        assert!(erf(0.0).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 2e-7);
        assert!((erf(-2.0) + 0.995_322_27).abs() < 2e-7);
    }
}
