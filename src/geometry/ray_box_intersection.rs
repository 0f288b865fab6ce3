use super::{FloatType, Ray, WorldBox};

/// Bound on the relative rounding error of `n` consecutive floating point operations.
pub const fn gamma(n: u32) -> FloatType {
    let e = FloatType::EPSILON * 0.5;
    (n as FloatType) * e / (1.0 - (n as FloatType) * e)
}

pub trait RayIntersectionExt {
    /// Whether the ray hits the box within `0..ray.t_max`.
    /// `direction_is_negative` must be the value of `ray.direction_is_negative()`,
    /// passed in so that tree traversal can compute it only once per ray.
    fn intersect_p(&self, ray: &Ray, direction_is_negative: &[bool; 3]) -> bool;
}

impl RayIntersectionExt for WorldBox {
    fn intersect_p(&self, ray: &Ray, direction_is_negative: &[bool; 3]) -> bool {
        let mut t0 = FloatType::NEG_INFINITY;
        let mut t1 = FloatType::INFINITY;

        for axis in 0..3 {
            let (near_corner, far_corner) = if direction_is_negative[axis] {
                (self.max[axis], self.min[axis])
            } else {
                (self.min[axis], self.max[axis])
            };

            let mut near = (near_corner - ray.origin[axis]) * ray.inv_direction[axis];
            let mut far = (far_corner - ray.origin[axis]) * ray.inv_direction[axis];
            if near.is_nan() {
                near = FloatType::NEG_INFINITY;
            }
            if far.is_nan() {
                far = FloatType::INFINITY;
            }
            far *= 1.0 + 2.0 * gamma(3);

            if t0 > far || near > t1 {
                return false;
            }
            t0 = t0.max(near);
            t1 = t1.min(far);
        }

        t0 <= ray.t_max && t1 > 0.0
    }
}
