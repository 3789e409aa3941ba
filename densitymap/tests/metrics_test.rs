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

use densitymap::DensityMap;
use densitymap::metrics::CountErrorMeter;
use googletest::assert_that;
use googletest::prelude::eq;
use googletest::prelude::near;

#[test]
fn test_empty_meter() {
    let meter = CountErrorMeter::new();
    assert_eq!(meter.count(), 0);
    assert_eq!(meter.mae(), None);
    assert_eq!(meter.rmse(), None);
    assert_eq!(meter.mean_predicted(), None);
    assert_eq!(meter.mean_truth(), None);
}

#[test]
fn test_count_errors() {
    let mut meter = CountErrorMeter::new();
    meter.update(12.0, 10.0);
    meter.update(7.0, 8.0);
    meter.update(10.0, 10.0);
    assert_that!(meter.count(), eq(3));
    assert_that!(meter.mae().unwrap(), near(1.0, 1e-12));
    assert_that!(meter.rmse().unwrap(), near((5.0f64 / 3.0).sqrt(), 1e-12));
    assert_that!(meter.mean_predicted().unwrap(), near(29.0 / 3.0, 1e-12));
    assert_that!(meter.mean_truth().unwrap(), near(28.0 / 3.0, 1e-12));

    meter.reset();
    assert_eq!(meter, CountErrorMeter::default());
}

#[test]
fn test_update_maps() {
    let predicted = DensityMap::from_vec(2, 2, vec![0.5, 0.5, 1.0, 0.5]).unwrap();
    let truth = DensityMap::from_vec(2, 2, vec![1.0, 0.0, 1.0, 0.0]).unwrap();
    let mut meter = CountErrorMeter::new();
    meter.update_maps(&predicted, &truth);
    assert_that!(meter.mae().unwrap(), near(0.5, 1e-12));
    assert_that!(meter.rmse().unwrap(), near(0.5, 1e-12));
}
