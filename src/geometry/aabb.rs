use num_traits::One;
use std::ops::{Add, Sub};

use nalgebra::{ClosedAddAssign, ClosedDivAssign, Point, Point2, Scalar};

use super::{FloatType, WorldBox, WorldPoint, WorldVector};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }

    pub fn with_size<S>(min: Point, size: &S) -> AABB<Point>
    where
        for<'a> &'a Point: Add<&'a S, Output = Point>,
    {
        let max = &min + size;
        AABB { min, max }
    }
}

impl<Point: Sub + Copy> AABB<Point> {
    pub fn size(&self) -> Point::Output {
        self.max - self.min
    }
}

impl<T: Scalar + Copy + Sub> AABB<Point2<T>> {
    pub fn width(&self) -> T::Output {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> T::Output {
        self.max[1] - self.min[1]
    }
}

impl<T: Scalar + ClosedAddAssign + ClosedDivAssign + One, const D: usize> AABB<Point<T, D>> {
    pub fn center(&self) -> Point<T, D> {
        let two = T::one() + T::one();
        let avg_coords = (&self.min.coords + &self.max.coords) / two;
        Point::from(avg_coords)
    }
}

impl WorldBox {
    /// Box containing nothing. Only meant to be grown using `union` and `union_point`.
    pub fn empty() -> WorldBox {
        WorldBox {
            min: WorldPoint::from(WorldVector::repeat(FloatType::INFINITY)),
            max: WorldPoint::from(WorldVector::repeat(FloatType::NEG_INFINITY)),
        }
    }

    pub fn from_point(point: WorldPoint) -> WorldBox {
        WorldBox {
            min: point,
            max: point,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn union(&self, other: &WorldBox) -> WorldBox {
        WorldBox {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn union_point(&self, point: &WorldPoint) -> WorldBox {
        WorldBox {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }

    pub fn surface_area(&self) -> FloatType {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.size();
        2.0 * (d.x * d.y + d.x * d.z + d.y * d.z)
    }

    /// Index of the axis along which the box is the longest.
    pub fn maximum_extent(&self) -> usize {
        self.size().imax()
    }

    /// Position of the point relative to the box corners, 0 at `min` and 1 at `max`.
    /// Degenerate axes map to 0.
    pub fn offset(&self, point: &WorldPoint) -> WorldVector {
        let mut o = point - self.min;
        for axis in 0..3 {
            if self.max[axis] > self.min[axis] {
                o[axis] /= self.max[axis] - self.min[axis];
            }
        }
        o
    }

    pub fn contains(&self, point: &WorldPoint) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }

    pub fn contains_box(&self, other: &WorldBox) -> bool {
        self.contains(&other.min) && self.contains(&other.max)
    }
}
