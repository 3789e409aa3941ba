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

//! Adaptive kernel density estimation of point annotations.
//!
//! Every annotated point contributes a unit impulse smoothed by a truncated
//! Gaussian. With the adaptive policy the standard deviation of each kernel
//! is `beta` times the summed distance to its `neighbors` nearest neighbors,
//! so crowded regions get sharp kernels and sparse regions broad ones.
//!
//! # Usage
//!
//! ```rust
//! # use densitymap::estimator::{BandwidthPolicy, DensityEstimator};
//! # use densitymap::geometry::Point;
//! let estimator = DensityEstimator::builder()
//!     .bandwidth("fixed-4".parse::<BandwidthPolicy>().unwrap())
//!     .build()
//!     .unwrap();
//! let points = [Point::new(16.0, 16.0)];
//! let map = estimator.estimate(&points, 32, 32).unwrap();
//! assert!((map.sum() - 1.0).abs() < 1e-3);
//! ```

use std::fmt;
use std::str::FromStr;

use log::debug;
use log::trace;
use log::warn;

use crate::error::Error;
use crate::geometry::Extent;
use crate::geometry::Point;
use crate::kdtree::DEFAULT_NODE_SIZE;
use crate::kdtree::KdTree;
use crate::kernel::BoundaryMode;
use crate::kernel::DEFAULT_TRUNCATE;
use crate::kernel::GaussianKernel1d;
use crate::kernel::stamp;
use crate::map::DensityMap;

/// Default number of neighbors for the adaptive bandwidth.
pub const DEFAULT_NEIGHBORS: usize = 3;
/// Default scale applied to the summed neighbor distances.
pub const DEFAULT_BETA: f64 = 0.1;
/// Default lower bound on any bandwidth.
pub const DEFAULT_MIN_BANDWIDTH: f64 = 1e-3;
/// Default single-point bandwidth, as a fraction of the mean grid dimension.
pub const DEFAULT_EXTENT_FRACTION: f64 = 0.25;
/// Upper bound on any bandwidth. A kernel this wide is flat over any grid
/// that fits in memory, and its normalization stays within `f64` range.
pub const MAX_BANDWIDTH: f64 = 1e15;

/// How the standard deviation of each point's kernel is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BandwidthPolicy {
    /// `sigma = beta * (d_1 + ... + d_neighbors)` over the nearest neighbors.
    Adaptive {
        /// Number of nearest neighbors, excluding the point itself.
        neighbors: usize,
        /// Scale applied to the summed distances.
        beta: f64,
    },
    /// The same `sigma` for every point.
    Fixed {
        /// Standard deviation in cells.
        sigma: f64,
    },
}

impl Default for BandwidthPolicy {
    fn default() -> Self {
        BandwidthPolicy::Adaptive {
            neighbors: DEFAULT_NEIGHBORS,
            beta: DEFAULT_BETA,
        }
    }
}

impl fmt::Display for BandwidthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandwidthPolicy::Adaptive { beta, .. } => write!(f, "adaptive-{beta}"),
            BandwidthPolicy::Fixed { sigma } => write!(f, "fixed-{sigma}"),
        }
    }
}

/// Parses density model names: `adaptive`, `adaptive-<beta>` and
/// `fixed-<sigma>`.
impl FromStr for BandwidthPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "adaptive" {
            return Ok(BandwidthPolicy::default());
        }
        if let Some(beta) = s.strip_prefix("adaptive-") {
            return Ok(BandwidthPolicy::Adaptive {
                neighbors: DEFAULT_NEIGHBORS,
                beta: parse_positive("beta", beta)?,
            });
        }
        if let Some(sigma) = s.strip_prefix("fixed-") {
            return Ok(BandwidthPolicy::Fixed {
                sigma: parse_positive("sigma", sigma)?,
            });
        }
        Err(Error::config_invalid(format!("unknown density model: {s:?}")))
    }
}

/// Bandwidth used when the point set has a single point, so that no
/// neighbor distance exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FallbackBandwidth {
    /// A fixed standard deviation in cells.
    Constant(f64),
    /// A fraction of the mean of height and width.
    ExtentFraction(f64),
}

impl Default for FallbackBandwidth {
    fn default() -> Self {
        FallbackBandwidth::ExtentFraction(DEFAULT_EXTENT_FRACTION)
    }
}

impl FallbackBandwidth {
    /// Returns the standard deviation for a grid of the given extent.
    pub fn sigma(&self, extent: Extent) -> f64 {
        match *self {
            FallbackBandwidth::Constant(sigma) => sigma,
            FallbackBandwidth::ExtentFraction(fraction) => {
                fraction * (extent.height() + extent.width()) as f64 / 2.0
            }
        }
    }

    fn value(&self) -> f64 {
        match *self {
            FallbackBandwidth::Constant(v) | FallbackBandwidth::ExtentFraction(v) => v,
        }
    }
}

/// One frame's annotations together with its image size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedFrame {
    /// Annotated points.
    pub points: Vec<Point>,
    /// Image height in pixels.
    pub height: usize,
    /// Image width in pixels.
    pub width: usize,
}

impl AnnotatedFrame {
    /// Creates a frame.
    pub fn new(points: Vec<Point>, height: usize, width: usize) -> Self {
        Self {
            points,
            height,
            width,
        }
    }
}

/// Counters describing a single estimation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EstimateSummary {
    /// Points supplied by the caller.
    pub points: usize,
    /// Points whose kernel was added to the map.
    pub placed: usize,
    /// Finite points outside the grid; they place no impulse.
    pub out_of_bounds: usize,
    /// Points dropped for NaN or infinite coordinates.
    pub non_finite: usize,
    /// Bandwidths raised to the configured minimum.
    pub clamped: usize,
    /// Whether the single-point fallback bandwidth was used.
    pub used_fallback: bool,
}

/// A configured density estimator.
///
/// The estimator holds configuration only. Every call builds its own index
/// and grid, so one estimator can be shared across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityEstimator {
    bandwidth: BandwidthPolicy,
    fallback: FallbackBandwidth,
    min_bandwidth: f64,
    truncate: f64,
    boundary: BoundaryMode,
    fallback_boundary: BoundaryMode,
    node_size: usize,
}

impl Default for DensityEstimator {
    fn default() -> Self {
        Self {
            bandwidth: BandwidthPolicy::default(),
            fallback: FallbackBandwidth::default(),
            min_bandwidth: DEFAULT_MIN_BANDWIDTH,
            truncate: DEFAULT_TRUNCATE,
            boundary: BoundaryMode::default(),
            fallback_boundary: BoundaryMode::Renormalize,
            node_size: DEFAULT_NODE_SIZE,
        }
    }
}

impl DensityEstimator {
    /// Returns a builder starting from the default configuration.
    pub fn builder() -> DensityEstimatorBuilder {
        DensityEstimatorBuilder::default()
    }

    /// Returns the bandwidth policy.
    pub fn bandwidth(&self) -> BandwidthPolicy {
        self.bandwidth
    }

    /// Returns the single-point fallback bandwidth.
    pub fn fallback_bandwidth(&self) -> FallbackBandwidth {
        self.fallback
    }

    /// Returns the lower bound on any bandwidth.
    pub fn min_bandwidth(&self) -> f64 {
        self.min_bandwidth
    }

    /// Returns the kernel truncation in standard deviations.
    pub fn truncate(&self) -> f64 {
        self.truncate
    }

    /// Returns the boundary mode.
    pub fn boundary(&self) -> BoundaryMode {
        self.boundary
    }

    /// Returns the boundary mode applied to fallback kernels.
    pub fn fallback_boundary(&self) -> BoundaryMode {
        self.fallback_boundary
    }

    /// Estimates the density map of `points` on a `height × width` grid.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidExtent`](crate::error::ErrorKind::InvalidExtent)
    /// if `height` or `width` is zero.
    pub fn estimate(
        &self,
        points: &[Point],
        height: usize,
        width: usize,
    ) -> Result<DensityMap, Error> {
        self.estimate_with_summary(points, height, width)
            .map(|(map, _)| map)
    }

    /// Like [`estimate`](Self::estimate), also returning per-call counters.
    pub fn estimate_with_summary(
        &self,
        points: &[Point],
        height: usize,
        width: usize,
    ) -> Result<(DensityMap, EstimateSummary), Error> {
        let extent = Extent::new(height, width)?;
        let mut map = DensityMap::zeros(extent);
        let mut summary = EstimateSummary {
            points: points.len(),
            ..EstimateSummary::default()
        };
        if points.is_empty() {
            debug!("density map {height}x{width}: no points");
            return Ok((map, summary));
        }

        let finite: Vec<Point> = points.iter().copied().filter(Point::is_finite).collect();
        summary.non_finite = points.len() - finite.len();
        if summary.non_finite > 0 {
            warn!(
                "dropping {} of {} points with non-finite coordinates",
                summary.non_finite,
                points.len()
            );
        }

        let tree = match self.bandwidth {
            BandwidthPolicy::Adaptive { .. } if finite.len() > 1 => {
                Some(KdTree::with_node_size(&finite, self.node_size))
            }
            _ => None,
        };
        let boundary = match (self.bandwidth, &tree) {
            (BandwidthPolicy::Adaptive { .. }, None) => self.fallback_boundary,
            _ => self.boundary,
        };

        // Kernels never need to reach further than the grid itself.
        let limit = height.max(width);
        for (index, point) in finite.iter().enumerate() {
            let Some((row, col)) = extent.cell_of(point) else {
                summary.out_of_bounds += 1;
                continue;
            };
            let sigma = self.point_bandwidth(index, tree.as_ref(), extent, &mut summary);
            trace!(
                "point {index} at ({}, {}) -> cell ({row}, {col}), sigma {sigma}",
                point.x, point.y
            );
            let kernel = GaussianKernel1d::with_limit(sigma, self.truncate, limit);
            stamp(&mut map, row, col, &kernel, boundary);
            summary.placed += 1;
        }

        debug!(
            "density map {height}x{width}: {} points, {} placed, {} out of bounds, {} clamped, mass {:.4}",
            summary.points,
            summary.placed,
            summary.out_of_bounds,
            summary.clamped,
            map.sum()
        );
        Ok((map, summary))
    }

    /// Estimates one density map per frame, in input order.
    ///
    /// With the `rayon` feature frames are processed in parallel; each
    /// frame's result is identical to calling [`estimate`](Self::estimate).
    pub fn estimate_batch(&self, frames: &[AnnotatedFrame]) -> Vec<Result<DensityMap, Error>> {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            frames
                .par_iter()
                .map(|frame| self.estimate(&frame.points, frame.height, frame.width))
                .collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            frames
                .iter()
                .map(|frame| self.estimate(&frame.points, frame.height, frame.width))
                .collect()
        }
    }

    fn point_bandwidth(
        &self,
        index: usize,
        tree: Option<&KdTree>,
        extent: Extent,
        summary: &mut EstimateSummary,
    ) -> f64 {
        let raw = match (self.bandwidth, tree) {
            (BandwidthPolicy::Fixed { sigma }, _) => sigma,
            (BandwidthPolicy::Adaptive { neighbors, beta }, Some(tree)) => {
                let found = tree.nearest_excluding(index, neighbors);
                let total: f64 = found.iter().map(|n| n.distance).sum();
                // Fewer neighbors than requested: extrapolate the sum.
                beta * total * neighbors as f64 / found.len().max(1) as f64
            }
            (BandwidthPolicy::Adaptive { .. }, None) => {
                summary.used_fallback = true;
                self.fallback.sigma(extent)
            }
        };

        if raw.is_nan() || raw < self.min_bandwidth {
            trace!("point {index}: bandwidth {raw} clamped to {}", self.min_bandwidth);
            summary.clamped += 1;
            self.min_bandwidth
        } else if raw > MAX_BANDWIDTH {
            trace!("point {index}: bandwidth {raw} capped to {MAX_BANDWIDTH}");
            MAX_BANDWIDTH
        } else {
            raw
        }
    }
}

/// Estimates a density map with the default configuration: adaptive
/// bandwidth over 3 neighbors with `beta = 0.1`, truncation at 3 standard
/// deviations and lossy zero-padded boundaries.
///
/// # Examples
///
/// ```
/// # use densitymap::estimate_density;
/// # use densitymap::geometry::Point;
/// let points = [Point::new(10.0, 10.0), Point::new(12.0, 10.0), Point::new(10.0, 12.0)];
/// let map = estimate_density(&points, 20, 20).unwrap();
/// assert!((map.sum() - 3.0).abs() < 0.03);
/// ```
pub fn estimate_density(
    points: &[Point],
    height: usize,
    width: usize,
) -> Result<DensityMap, Error> {
    DensityEstimator::default().estimate(points, height, width)
}

/// Builder for [`DensityEstimator`].
///
/// # Examples
///
/// ```
/// use densitymap::estimator::{DensityEstimator, FallbackBandwidth};
/// use densitymap::kernel::BoundaryMode;
///
/// let estimator = DensityEstimator::builder()
///     .fallback_bandwidth(FallbackBandwidth::Constant(8.0))
///     .boundary(BoundaryMode::Renormalize)
///     .build()
///     .unwrap();
/// assert_eq!(estimator.boundary(), BoundaryMode::Renormalize);
/// ```
#[derive(Debug, Clone)]
pub struct DensityEstimatorBuilder {
    bandwidth: BandwidthPolicy,
    fallback: FallbackBandwidth,
    min_bandwidth: f64,
    truncate: f64,
    boundary: BoundaryMode,
    fallback_boundary: BoundaryMode,
    node_size: usize,
}

impl Default for DensityEstimatorBuilder {
    fn default() -> Self {
        let defaults = DensityEstimator::default();
        Self {
            bandwidth: defaults.bandwidth,
            fallback: defaults.fallback,
            min_bandwidth: defaults.min_bandwidth,
            truncate: defaults.truncate,
            boundary: defaults.boundary,
            fallback_boundary: defaults.fallback_boundary,
            node_size: defaults.node_size,
        }
    }
}

impl DensityEstimatorBuilder {
    /// Sets the bandwidth policy.
    pub fn bandwidth(mut self, bandwidth: BandwidthPolicy) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Sets the bandwidth used for a single-point set.
    pub fn fallback_bandwidth(mut self, fallback: FallbackBandwidth) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the lower bound on any bandwidth. Degenerate bandwidths, such as
    /// those of identical points, are raised to it.
    pub fn min_bandwidth(mut self, min_bandwidth: f64) -> Self {
        self.min_bandwidth = min_bandwidth;
        self
    }

    /// Sets the kernel truncation in standard deviations.
    pub fn truncate(mut self, truncate: f64) -> Self {
        self.truncate = truncate;
        self
    }

    /// Sets how kernel mass outside the grid is treated.
    pub fn boundary(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = boundary;
        self
    }

    /// Sets how a fallback kernel treats mass outside the grid.
    ///
    /// Defaults to [`BoundaryMode::Renormalize`]: the fallback width is
    /// derived from the grid rather than from the data, so a lone point keeps
    /// a mass of 1 even when its kernel is wider than the grid.
    pub fn fallback_boundary(mut self, boundary: BoundaryMode) -> Self {
        self.fallback_boundary = boundary;
        self
    }

    /// Sets the leaf size of the nearest-neighbor index.
    pub fn node_size(mut self, node_size: usize) -> Self {
        self.node_size = node_size;
        self
    }

    /// Validates the configuration and builds the estimator.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid)
    /// if a numeric parameter is not positive and finite, or if the neighbor
    /// count or node size is zero.
    pub fn build(self) -> Result<DensityEstimator, Error> {
        match self.bandwidth {
            BandwidthPolicy::Adaptive { neighbors, beta } => {
                if neighbors == 0 {
                    return Err(Error::config_invalid("neighbors must be at least 1"));
                }
                ensure_positive("beta", beta)?;
            }
            BandwidthPolicy::Fixed { sigma } => ensure_positive("sigma", sigma)?,
        }
        ensure_positive("fallback_bandwidth", self.fallback.value())?;
        ensure_positive("min_bandwidth", self.min_bandwidth)?;
        ensure_positive("truncate", self.truncate)?;
        if self.node_size == 0 {
            return Err(Error::config_invalid("node_size must be at least 1"));
        }

        Ok(DensityEstimator {
            bandwidth: self.bandwidth,
            fallback: self.fallback,
            min_bandwidth: self.min_bandwidth,
            truncate: self.truncate,
            boundary: self.boundary,
            fallback_boundary: self.fallback_boundary,
            node_size: self.node_size,
        })
    }
}

fn ensure_positive(name: &'static str, value: f64) -> Result<(), Error> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::config_invalid(format!("{name} must be > 0 and finite")).with_context(name, value))
    }
}

fn parse_positive(name: &'static str, text: &str) -> Result<f64, Error> {
    let value: f64 = text.parse().map_err(|err| {
        Error::config_invalid(format!("invalid {name}: {text:?}")).set_source(err)
    })?;
    ensure_positive(name, value)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_density_models() {
        assert_eq!(
            "adaptive".parse::<BandwidthPolicy>().unwrap(),
            BandwidthPolicy::default()
        );
        assert_eq!(
            "fixed-8".parse::<BandwidthPolicy>().unwrap(),
            BandwidthPolicy::Fixed { sigma: 8.0 }
        );
        assert_eq!(
            "adaptive-0.3".parse::<BandwidthPolicy>().unwrap(),
            BandwidthPolicy::Adaptive {
                neighbors: 3,
                beta: 0.3
            }
        );
        assert!("fixed-".parse::<BandwidthPolicy>().is_err());
        assert!("fixed--2".parse::<BandwidthPolicy>().is_err());
        assert!("geodesic".parse::<BandwidthPolicy>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        let policy = BandwidthPolicy::Fixed { sigma: 2.5 };
        assert_eq!(policy.to_string(), "fixed-2.5");
        assert_eq!(policy.to_string().parse::<BandwidthPolicy>().unwrap(), policy);
    }

    #[test]
    fn test_fallback_sigma() {
        let extent = Extent::new(100, 60).unwrap();
        assert_eq!(FallbackBandwidth::default().sigma(extent), 20.0);
        assert_eq!(FallbackBandwidth::Constant(4.0).sigma(extent), 4.0);
    }

    #[test]
    fn test_point_bandwidth_extrapolates_missing_neighbors() {
        let estimator = DensityEstimator::default();
        let points = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let tree = KdTree::build(&points);
        let extent = Extent::new(20, 20).unwrap();
        let mut summary = EstimateSummary::default();
        let sigma = estimator.point_bandwidth(0, Some(&tree), extent, &mut summary);
        // one neighbor at 10, extrapolated to three neighbors
        assert!((sigma - 3.0).abs() < 1e-12);
        assert_eq!(summary.clamped, 0);
    }

    #[test]
    fn test_point_bandwidth_sums_three_nearest() {
        let estimator = DensityEstimator::default();
        let points = [
            Point::new(10.0, 10.0),
            Point::new(12.0, 10.0),
            Point::new(10.0, 12.0),
            Point::new(12.0, 12.0),
            Point::new(30.0, 30.0),
        ];
        let tree = KdTree::build(&points);
        let extent = Extent::new(40, 40).unwrap();
        let mut summary = EstimateSummary::default();
        let sigma = estimator.point_bandwidth(0, Some(&tree), extent, &mut summary);
        // 0.1 * (2 + 2 + sqrt(8)), the point itself excluded
        assert!((sigma - 0.1 * (4.0 + 8f64.sqrt())).abs() < 1e-12);
        assert!(!summary.used_fallback);
    }

    #[test]
    fn test_point_bandwidth_caps_huge_values() {
        let estimator = DensityEstimator::builder()
            .bandwidth(BandwidthPolicy::Fixed { sigma: 1e200 })
            .build()
            .unwrap();
        let extent = Extent::new(8, 8).unwrap();
        let mut summary = EstimateSummary::default();
        let sigma = estimator.point_bandwidth(0, None, extent, &mut summary);
        assert_eq!(sigma, MAX_BANDWIDTH);
    }

    #[test]
    fn test_point_bandwidth_clamps_duplicates() {
        let estimator = DensityEstimator::default();
        let points = [Point::new(4.0, 4.0); 5];
        let tree = KdTree::build(&points);
        let extent = Extent::new(8, 8).unwrap();
        let mut summary = EstimateSummary::default();
        let sigma = estimator.point_bandwidth(2, Some(&tree), extent, &mut summary);
        assert_eq!(sigma, DEFAULT_MIN_BANDWIDTH);
        assert_eq!(summary.clamped, 1);
    }
}
