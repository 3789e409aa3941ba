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

//! A static 2D k-d tree for k-nearest-neighbor queries.
//!
//! The tree is a single flat array. Building partitions each range around its
//! median, alternating between the x and y axis, until a range holds at most
//! `node_size` entries. The median of every range stays at the middle slot, so
//! no explicit node structure is stored.
//!
//! # Usage
//!
//! ```rust
//! # use densitymap::geometry::Point;
//! # use densitymap::kdtree::KdTree;
//! let points = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(5.0, 5.0)];
//! let tree = KdTree::build(&points);
//! let neighbors = tree.nearest_excluding(0, 1);
//! assert_eq!(neighbors[0].index, 1);
//! assert_eq!(neighbors[0].distance, 1.0);
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::geometry::Point;

/// Default maximum number of entries in a leaf range.
pub const DEFAULT_NODE_SIZE: usize = 16;

/// A neighbor returned by a k-nearest-neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the neighbor in the slice the tree was built from.
    pub index: usize,
    /// Euclidean distance from the query point.
    pub distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    index: usize,
    point: Point,
}

/// Immutable k-d tree over a set of points.
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<Point>,
    entries: Vec<Entry>,
    node_size: usize,
}

impl KdTree {
    /// Builds a tree with [`DEFAULT_NODE_SIZE`].
    pub fn build(points: &[Point]) -> Self {
        Self::with_node_size(points, DEFAULT_NODE_SIZE)
    }

    /// Builds a tree whose leaf ranges hold at most `node_size` entries.
    ///
    /// # Panics
    ///
    /// Panics if `node_size` is 0.
    pub fn with_node_size(points: &[Point], node_size: usize) -> Self {
        assert!(node_size > 0, "node_size must be at least 1");
        let mut entries: Vec<Entry> = points
            .iter()
            .enumerate()
            .map(|(index, point)| Entry {
                index,
                point: *point,
            })
            .collect();
        partition(&mut entries, node_size, 0);
        Self {
            points: points.to_vec(),
            entries,
            node_size,
        }
    }

    /// Returns the number of indexed points.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tree indexes no points.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the configured leaf size.
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Returns up to `k` points nearest to `query`, closest first.
    ///
    /// Ties in distance are ordered by input index.
    pub fn nearest(&self, query: &Point, k: usize) -> Vec<Neighbor> {
        self.query(query, None, k)
    }

    /// Returns up to `k` points nearest to the indexed point `index`, leaving
    /// out that point itself. Duplicates of the point are still reported, at
    /// distance 0.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn nearest_excluding(&self, index: usize, k: usize) -> Vec<Neighbor> {
        let query = self.points[index];
        self.query(&query, Some(index), k)
    }

    fn query(&self, query: &Point, exclude: Option<usize>, k: usize) -> Vec<Neighbor> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        let mut best = KBest::new(k, exclude);
        self.search(&self.entries, 0, query, &mut best);
        best.into_sorted()
    }

    fn search(&self, entries: &[Entry], axis: usize, query: &Point, best: &mut KBest) {
        if entries.len() <= self.node_size {
            for entry in entries {
                best.offer(entry, query);
            }
            return;
        }

        let mid = entries.len() / 2;
        let pivot = &entries[mid];
        best.offer(pivot, query);

        let delta = query.coord(axis) - pivot.point.coord(axis);
        let (near, far) = if delta <= 0.0 {
            (&entries[..mid], &entries[mid + 1..])
        } else {
            (&entries[mid + 1..], &entries[..mid])
        };
        self.search(near, 1 - axis, query, best);
        if best.accepts(delta * delta) {
            self.search(far, 1 - axis, query, best);
        }
    }
}

fn partition(entries: &mut [Entry], node_size: usize, axis: usize) {
    if entries.len() <= node_size {
        return;
    }
    let mid = entries.len() / 2;
    entries.select_nth_unstable_by(mid, |a, b| {
        a.point.coord(axis).total_cmp(&b.point.coord(axis))
    });
    let (left, right) = entries.split_at_mut(mid);
    partition(left, node_size, 1 - axis);
    partition(&mut right[1..], node_size, 1 - axis);
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    squared_distance: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.squared_distance
            .total_cmp(&other.squared_distance)
            .then(self.index.cmp(&other.index))
    }
}

/// Bounded max-heap keeping the k best candidates seen so far.
struct KBest {
    k: usize,
    exclude: Option<usize>,
    heap: BinaryHeap<Candidate>,
}

impl KBest {
    fn new(k: usize, exclude: Option<usize>) -> Self {
        Self {
            k,
            exclude,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    fn offer(&mut self, entry: &Entry, query: &Point) {
        if self.exclude == Some(entry.index) {
            return;
        }
        let candidate = Candidate {
            squared_distance: entry.point.squared_distance(query),
            index: entry.index,
        };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    fn accepts(&self, squared_distance: f64) -> bool {
        match self.heap.peek() {
            Some(worst) if self.heap.len() >= self.k => squared_distance <= worst.squared_distance,
            _ => true,
        }
    }

    fn into_sorted(self) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                index: c.index,
                distance: c.squared_distance.sqrt(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice(n: usize) -> Vec<Point> {
        let mut points = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                points.push(Point::new(j as f64 * 1.5, i as f64 * 0.5));
            }
        }
        points
    }

    #[test]
    fn test_partition_keeps_median_split() {
        let points = lattice(9);
        let tree = KdTree::with_node_size(&points, 4);
        let mid = tree.entries.len() / 2;
        let pivot = tree.entries[mid].point.x;
        assert!(tree.entries[..mid].iter().all(|e| e.point.x <= pivot));
        assert!(tree.entries[mid + 1..].iter().all(|e| e.point.x >= pivot));
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.nearest(&Point::new(1.0, 1.0), 3).is_empty());
    }

    #[test]
    fn test_k_larger_than_len() {
        let points = [Point::new(0.0, 0.0), Point::new(3.0, 4.0)];
        let tree = KdTree::build(&points);
        let neighbors = tree.nearest_excluding(0, 3);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].distance, 5.0);
    }

    #[test]
    #[should_panic(expected = "node_size")]
    fn test_zero_node_size_panics() {
        KdTree::with_node_size(&[Point::new(0.0, 0.0)], 0);
    }
}
