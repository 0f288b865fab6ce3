pub mod bvh;
pub mod primitives;

use crate::geometry::{HitRecord, Ray, WorldBox};

/// Renderable object that can be placed in a bounding volume hierarchy.
pub trait Primitive {
    fn world_bound(&self) -> WorldBox;

    /// Find the closest intersection with the ray within `0..ray.t_max`.
    /// On a hit `ray.t_max` is narrowed to the distance of the hit, otherwise the ray is unchanged.
    fn intersect(&self, ray: &mut Ray) -> Option<HitRecord>;

    /// Check whether the ray hits anything within `0..ray.t_max`.
    fn intersect_p(&self, ray: &Ray) -> bool {
        let mut ray = *ray;
        self.intersect(&mut ray).is_some()
    }
}

impl<P: Primitive + ?Sized> Primitive for Box<P> {
    fn world_bound(&self) -> WorldBox {
        (**self).world_bound()
    }

    fn intersect(&self, ray: &mut Ray) -> Option<HitRecord> {
        (**self).intersect(ray)
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        (**self).intersect_p(ray)
    }
}

/// Unaccelerated aggregate, tests every primitive.
impl<P: Primitive> Primitive for Vec<P> {
    fn world_bound(&self) -> WorldBox {
        self.iter()
            .fold(WorldBox::empty(), |acc, primitive| acc.union(&primitive.world_bound()))
    }

    fn intersect(&self, ray: &mut Ray) -> Option<HitRecord> {
        let mut closest = None;
        for primitive in self {
            if let Some(hit) = primitive.intersect(ray) {
                closest = Some(hit);
            }
        }
        closest
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.iter().any(|primitive| primitive.intersect_p(ray))
    }
}

pub type DynPrimitive = Box<dyn Primitive + Send + Sync>;

pub struct Scene<O: Primitive> {
    pub object: O,
}

impl<O: Primitive> Scene<O> {
    pub fn new(object: O) -> Self {
        Scene { object }
    }

    pub fn intersect(&self, ray: &mut Ray) -> Option<HitRecord> {
        self.object.intersect(ray)
    }

    pub fn intersect_p(&self, ray: &Ray) -> bool {
        self.object.intersect_p(ray)
    }

    pub fn world_bound(&self) -> WorldBox {
        self.object.world_bound()
    }
}
