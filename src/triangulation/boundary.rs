use super::{BoundaryId, Point};

use nalgebra::SVector;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Description of the shape of a (possibly curved) boundary
///
/// Refinement asks the description for the location of every new vertex it creates on a boundary face
/// registered with it. The points passed in are the corners of the (sub-)object the new vertex is the center of
/// (the 2 ends of an edge, the 4 corners of a quadrilateral face).
pub trait Boundary<const D: usize>: fmt::Debug + Send + Sync {
    fn in_between(&self, points: &[Point<D>]) -> Point<D>;
}

/// Arithmetic mean of a set of points
pub fn mean<const D: usize>(points: &[Point<D>]) -> Point<D> {
    assert!(!points.is_empty(), "Cannot compute the mean of zero points!");
    let sum = points
        .iter()
        .fold(SVector::<f64, D>::zeros(), |acc, p| acc + p.coords);
    Point::from(sum / points.len() as f64)
}

/// Flat boundary: new points are placed at the average of their neighbors
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightBoundary;

impl<const D: usize> Boundary<D> for StraightBoundary {
    fn in_between(&self, points: &[Point<D>]) -> Point<D> {
        mean(points)
    }
}

/// Boundary on a sphere (circle in 2D): the average of the neighbors is projected radially onto the sphere
#[derive(Debug, Clone, Copy)]
pub struct SphericalBoundary<const D: usize> {
    pub center: Point<D>,
    pub radius: f64,
}

impl<const D: usize> SphericalBoundary<D> {
    pub fn new(center: Point<D>, radius: f64) -> Self {
        assert!(radius > 0.0, "Sphere radius must be positive!");
        Self { center, radius }
    }
}

impl<const D: usize> Boundary<D> for SphericalBoundary<D> {
    fn in_between(&self, points: &[Point<D>]) -> Point<D> {
        let avg = mean(points);
        let offset = avg - self.center;
        let norm = offset.norm();

        // the average of points spread around the whole sphere has no preferred direction
        if norm < f64::EPSILON * self.radius {
            avg
        } else {
            self.center + offset * (self.radius / norm)
        }
    }
}

/// Boundary described by a closed-form rule applied to the average of the neighbors
pub struct FunctionBoundary<const D: usize> {
    rule: Box<dyn Fn(Point<D>) -> Point<D> + Send + Sync>,
}

impl<const D: usize> FunctionBoundary<D> {
    pub fn new<F>(rule: F) -> Self
    where
        F: Fn(Point<D>) -> Point<D> + Send + Sync + 'static,
    {
        Self {
            rule: Box::new(rule),
        }
    }
}

impl<const D: usize> fmt::Debug for FunctionBoundary<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("FunctionBoundary")
    }
}

impl<const D: usize> Boundary<D> for FunctionBoundary<D> {
    fn in_between(&self, points: &[Point<D>]) -> Point<D> {
        (self.rule)(mean(points))
    }
}

/// Mapping from boundary ids to shape descriptions, owned by a single Triangulation
#[derive(Debug, Clone)]
pub(crate) struct BoundaryRegistry<const D: usize> {
    entries: BTreeMap<BoundaryId, Arc<dyn Boundary<D>>>,
}

impl<const D: usize> BoundaryRegistry<D> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register a description, returning the one it replaced
    pub fn set(
        &mut self,
        id: BoundaryId,
        boundary: Arc<dyn Boundary<D>>,
    ) -> Option<Arc<dyn Boundary<D>>> {
        self.entries.insert(id, boundary)
    }

    pub fn reset(&mut self, id: BoundaryId) -> Option<Arc<dyn Boundary<D>>> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: BoundaryId) -> Option<&Arc<dyn Boundary<D>>> {
        self.entries.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = BoundaryId> + '_ {
        self.entries.keys().copied()
    }

    /// Place a new point on boundary `id`, falling back to a straight average when nothing is registered
    pub fn in_between(&self, id: BoundaryId, points: &[Point<D>]) -> Point<D> {
        match self.entries.get(&id) {
            Some(boundary) => boundary.in_between(points),
            None => mean(points),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
