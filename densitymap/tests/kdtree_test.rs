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

use densitymap::geometry::Point;
use densitymap::kdtree::KdTree;
use densitymap::kdtree::Neighbor;
use googletest::assert_that;
use googletest::prelude::eq;
use googletest::prelude::near;

fn pseudo_random_points(n: usize, seed: u64) -> Vec<Point> {
    let mut state = seed;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state % 64
    };
    // Integer coordinates on a small grid force duplicates and distance ties.
    (0..n)
        .map(|_| Point::new(next() as f64, next() as f64))
        .collect()
}

fn brute_force(points: &[Point], query: &Point, exclude: Option<usize>, k: usize) -> Vec<Neighbor> {
    let mut all: Vec<(f64, usize)> = points
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != exclude)
        .map(|(i, p)| {
            let dx = p.x - query.x;
            let dy = p.y - query.y;
            (dx * dx + dy * dy, i)
        })
        .collect();
    all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    all.into_iter()
        .take(k)
        .map(|(d2, index)| Neighbor {
            index,
            distance: d2.sqrt(),
        })
        .collect()
}

#[test]
fn test_matches_brute_force() {
    let points = pseudo_random_points(500, 7);
    for node_size in [1, 4, 16, 64] {
        let tree = KdTree::with_node_size(&points, node_size);
        assert_eq!(tree.len(), points.len());
        for index in (0..points.len()).step_by(7) {
            for k in [1, 3, 10] {
                let expected = brute_force(&points, &points[index], Some(index), k);
                assert_eq!(
                    tree.nearest_excluding(index, k),
                    expected,
                    "node_size {node_size}, index {index}, k {k}"
                );
            }
        }
    }
}

#[test]
fn test_nearest_to_arbitrary_query() {
    let points = pseudo_random_points(300, 99);
    let tree = KdTree::build(&points);
    for query in [
        Point::new(-5.0, -5.0),
        Point::new(31.5, 31.5),
        Point::new(100.0, 12.25),
    ] {
        assert_eq!(tree.nearest(&query, 5), brute_force(&points, &query, None, 5));
    }
}

#[test]
fn test_fewer_points_than_k() {
    let points = [Point::new(0.0, 0.0), Point::new(3.0, 4.0)];
    let tree = KdTree::build(&points);
    let found = tree.nearest_excluding(0, 3);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].index, 1);
    assert_that!(found[0].distance, near(5.0, 1e-12));

    assert!(tree.nearest(&Point::new(1.0, 1.0), 0).is_empty());
    assert!(KdTree::build(&[]).nearest(&Point::new(1.0, 1.0), 3).is_empty());
}

#[test]
fn test_duplicates_are_neighbors() {
    let points = [Point::new(2.0, 2.0); 4];
    let tree = KdTree::build(&points);
    let found = tree.nearest_excluding(2, 3);
    let indices: Vec<usize> = found.iter().map(|n| n.index).collect();
    assert_eq!(indices, vec![0, 1, 3]);
    for neighbor in found {
        assert_that!(neighbor.distance, eq(0.0));
    }
}
