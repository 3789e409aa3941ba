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

//! Density map ground truth for crowd counting.
//!
//! Given the head annotations of a frame and the frame size, the
//! [`estimator`] produces a density map: a grid whose sum over any region
//! approximates the number of people in that region. Each annotation is
//! smoothed by a Gaussian whose width adapts to the distance of its nearest
//! neighbors, found with a per-call [`kdtree`].
//!
//! Maps can be persisted in the NumPy `.npy` format and predictions can be
//! scored with the count-error [`metrics`].
//!
//! # Features
//!
//! - `rayon` *(default)*: [`DensityEstimator::estimate_batch`] processes
//!   frames in parallel. Results are identical with or without it.
//!
//! # Usage
//!
//! ```rust
//! use densitymap::estimate_density;
//! use densitymap::geometry::Point;
//!
//! let points = [Point::new(163.0, 53.0), Point::new(175.0, 64.0), Point::new(189.0, 74.0)];
//! let map = estimate_density(&points, 240, 320).unwrap();
//! assert_eq!((map.height(), map.width()), (240, 320));
//! assert!((map.sum() - 3.0).abs() < 0.03);
//! ```

mod codec;
mod serialization;

pub mod error;
pub mod estimator;
pub mod geometry;
pub mod kdtree;
pub mod kernel;
pub mod map;
pub mod metrics;

pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::estimator::DensityEstimator;
pub use self::estimator::estimate_density;
pub use self::geometry::Point;
pub use self::map::DensityMap;
