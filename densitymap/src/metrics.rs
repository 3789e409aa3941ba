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

//! Count-error evaluation of predicted density maps.
//!
//! # Usage
//!
//! ```rust
//! # use densitymap::metrics::CountErrorMeter;
//! let mut meter = CountErrorMeter::new();
//! meter.update(12.0, 10.0);
//! meter.update(7.0, 8.0);
//! assert_eq!(meter.mae(), Some(1.5));
//! ```

use crate::map::DensityMap;

/// Running mean absolute error and root mean square error of counts.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CountErrorMeter {
    count: u64,
    abs_error_sum: f64,
    squared_error_sum: f64,
    predicted_sum: f64,
    truth_sum: f64,
}

impl CountErrorMeter {
    /// Creates an empty meter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one frame's predicted and ground-truth counts.
    pub fn update(&mut self, predicted: f64, truth: f64) {
        let error = predicted - truth;
        self.count += 1;
        self.abs_error_sum += error.abs();
        self.squared_error_sum += error * error;
        self.predicted_sum += predicted;
        self.truth_sum += truth;
    }

    /// Records one frame, using the total mass of each map as its count.
    pub fn update_maps(&mut self, predicted: &DensityMap, truth: &DensityMap) {
        self.update(predicted.sum(), truth.sum());
    }

    /// Returns the number of recorded frames.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the mean absolute count error.
    pub fn mae(&self) -> Option<f64> {
        self.mean(self.abs_error_sum)
    }

    /// Returns the root mean square count error.
    pub fn rmse(&self) -> Option<f64> {
        self.mean(self.squared_error_sum).map(f64::sqrt)
    }

    /// Returns the mean predicted count.
    pub fn mean_predicted(&self) -> Option<f64> {
        self.mean(self.predicted_sum)
    }

    /// Returns the mean ground-truth count.
    pub fn mean_truth(&self) -> Option<f64> {
        self.mean(self.truth_sum)
    }

    /// Clears all recorded frames.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn mean(&self, sum: f64) -> Option<f64> {
        (self.count > 0).then(|| sum / self.count as f64)
    }
}
