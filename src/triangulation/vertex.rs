use super::Point;
use crate::error::TriaError;

use smallvec::SmallVec;
use std::collections::HashMap;

/// The geometry store of a Triangulation
///
/// Vertex indices of used vertices are never reassigned. Vertices released by coarsening are marked unused and their
/// slots are handed out again by later pushes.
#[derive(Debug, Clone)]
pub(crate) struct VertexStore<const D: usize> {
    points: Vec<Point<D>>,
    used: Vec<bool>,
    free_slots: Vec<usize>,
    n_used: usize,
}

impl<const D: usize> VertexStore<D> {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            used: Vec::new(),
            free_slots: Vec::new(),
            n_used: 0,
        }
    }

    pub fn from_points(points: Vec<Point<D>>) -> Self {
        let used = vec![true; points.len()];
        Self {
            n_used: points.len(),
            points,
            used,
            free_slots: Vec::new(),
        }
    }

    /// Store a new vertex, in a released slot if there is one
    pub fn push(&mut self, point: Point<D>) -> usize {
        self.n_used += 1;
        match self.free_slots.pop() {
            Some(id) => {
                self.points[id] = point;
                self.used[id] = true;
                id
            }
            None => {
                self.points.push(point);
                self.used.push(true);
                self.points.len() - 1
            }
        }
    }

    pub fn point(&self, id: usize) -> &Point<D> {
        &self.points[id]
    }

    pub fn is_used(&self, id: usize) -> bool {
        self.used.get(id).copied().unwrap_or(false)
    }

    /// Total number of slots (used or not)
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn n_used(&self) -> usize {
        self.n_used
    }

    /// Replace the usage markers. Returns the ids of vertices that were used before and are not anymore.
    ///
    /// Released slots are reused by later calls to [VertexStore::push].
    pub fn set_usage(&mut self, used: Vec<bool>) -> Vec<usize> {
        assert_eq!(used.len(), self.points.len());
        let released: Vec<usize> = self
            .used
            .iter()
            .zip(used.iter())
            .enumerate()
            .filter(|(_, (before, after))| **before && !**after)
            .map(|(id, _)| id)
            .collect();

        self.n_used = used.iter().filter(|u| **u).count();
        self.used = used;
        // lowest ids are handed out first
        self.free_slots.extend(released.iter().copied());
        self.free_slots.sort_unstable_by(|a, b| b.cmp(a));
        released
    }

    pub fn iter_used(&self) -> impl Iterator<Item = (usize, &Point<D>)> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter(|(id, _)| self.used[*id])
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.used.clear();
        self.free_slots.clear();
        self.n_used = 0;
    }
}

/// Deduplicates points within a tolerance using a uniform grid of buckets with the tolerance as spacing
///
/// Matching candidates are only searched in the `3^D` buckets around a point, so construction is linear in the
/// number of points for reasonably distributed input.
#[derive(Debug)]
pub(crate) struct VertexMatcher<const D: usize> {
    tolerance: f64,
    buckets: HashMap<[i64; D], SmallVec<[usize; 2]>>,
    points: Vec<Point<D>>,
}

impl<const D: usize> VertexMatcher<D> {
    pub fn new(tolerance: f64) -> Result<Self, TriaError> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(TriaError::InvalidTolerance(tolerance));
        }

        Ok(Self {
            tolerance,
            buckets: HashMap::new(),
            points: Vec::new(),
        })
    }

    /// Bucket coordinates of a point. Far away from the origin (relative to the tolerance) the casts saturate,
    /// which merges the outermost buckets but keeps neighboring points in neighboring buckets.
    fn bucket_of(&self, point: &Point<D>) -> [i64; D] {
        let mut bucket = [0; D];
        for (d, b) in bucket.iter_mut().enumerate() {
            *b = (point[d] / self.tolerance).floor() as i64;
        }
        bucket
    }

    /// Find the (unique) stored point within tolerance of `point`, or store `point` as a new one
    ///
    /// `input_id` is only used to describe an ambiguous match or a non-finite point
    pub fn insert(&mut self, point: Point<D>, input_id: usize) -> Result<usize, TriaError> {
        if !point.coords.iter().all(|c| c.is_finite()) {
            return Err(TriaError::InvalidCellData(format!(
                "vertex {} has non-finite coordinates {:?}",
                input_id,
                point.coords.as_slice()
            )));
        }
        let center = self.bucket_of(&point);

        let mut candidates: SmallVec<[usize; 2]> = SmallVec::new();
        for offset in 0..3_usize.pow(D as u32) {
            let mut bucket = center;
            let mut rem = offset;
            for b in bucket.iter_mut() {
                *b = b.saturating_add((rem % 3) as i64 - 1);
                rem /= 3;
            }

            if let Some(ids) = self.buckets.get(&bucket) {
                candidates.extend(ids.iter().copied().filter(|id| {
                    nalgebra::distance(&self.points[*id], &point) <= self.tolerance
                }));
            }
        }

        match candidates.len() {
            0 => {
                let id = self.points.len();
                self.points.push(point);
                self.buckets.entry(center).or_default().push(id);
                Ok(id)
            }
            1 => Ok(candidates[0]),
            n => Err(TriaError::AmbiguousVertexMatch {
                vertex: input_id,
                candidates: n,
            }),
        }
    }

    pub fn into_points(self) -> Vec<Point<D>> {
        self.points
    }
}
