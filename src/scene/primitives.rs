use nalgebra::Unit;

use crate::geometry::{FloatType, HitRecord, Ray, WorldBox, WorldPoint, WorldVector};

use super::Primitive;

#[derive(Clone, Debug)]
pub struct Sphere {
    pub center: WorldPoint,
    pub radius: FloatType,
    pub material: usize,
}

impl Sphere {
    pub fn new(center: WorldPoint, radius: FloatType) -> Sphere {
        Sphere {
            center,
            radius,
            material: 0,
        }
    }

    pub fn with_material(self, material: usize) -> Sphere {
        Sphere { material, ..self }
    }

    /// Distance to the closest intersection within `0..ray.t_max`.
    fn hit_distance(&self, ray: &Ray) -> Option<FloatType> {
        let oc = ray.origin - self.center;
        let b = oc.dot(&ray.direction);
        let c = oc.dot(&oc) - self.radius * self.radius;
        let discriminant = b * b - c;

        if discriminant < 0.0 {
            return None;
        }

        let sqrt_disc = discriminant.sqrt();
        let t1 = -b - sqrt_disc;
        let t2 = -b + sqrt_disc;
        let t = if t1 > 0.0 {
            t1
        } else if t2 > 0.0 {
            t2
        } else {
            return None;
        };

        (t < ray.t_max).then_some(t)
    }
}

impl Primitive for Sphere {
    fn world_bound(&self) -> WorldBox {
        let r_vec = WorldVector::repeat(self.radius);
        WorldBox {
            min: self.center - r_vec,
            max: self.center + r_vec,
        }
    }

    fn intersect(&self, ray: &mut Ray) -> Option<HitRecord> {
        let t = self.hit_distance(ray)?;
        ray.t_max = t;

        let point = ray.point_at(t);
        let normal = Unit::new_normalize(point - self.center);

        Some(HitRecord {
            t,
            point,
            normal,
            material: self.material,
        })
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.hit_distance(ray).is_some()
    }
}

/// Two sided triangle.
#[derive(Clone, Debug)]
pub struct Triangle {
    pub vertices: [WorldPoint; 3],
    pub material: usize,
}

impl Triangle {
    pub fn new(a: WorldPoint, b: WorldPoint, c: WorldPoint) -> Triangle {
        Triangle {
            vertices: [a, b, c],
            material: 0,
        }
    }

    pub fn with_material(self, material: usize) -> Triangle {
        Triangle { material, ..self }
    }

    /// Distance along the ray and the unnormalized geometric normal.
    /// Adapted from https://en.wikipedia.org/wiki/M%C3%B6ller%E2%80%93Trumbore_intersection_algorithm#Rust_implementation
    fn hit(&self, ray: &Ray) -> Option<(FloatType, WorldVector)> {
        let [a, b, c] = &self.vertices;
        let e1 = b - a;
        let e2 = c - a;

        let ray_cross_e2 = ray.direction.cross(&e2);
        let det = e1.dot(&ray_cross_e2);

        let inv_det = 1.0 / det; // May be infinite
        let s = ray.origin - a;
        let u = inv_det * s.dot(&ray_cross_e2);

        let s_cross_e1 = s.cross(&e1);
        let v = inv_det * ray.direction.dot(&s_cross_e1);
        let t = inv_det * e2.dot(&s_cross_e1);

        // Written so that NaNs from a degenerate triangle fail the test
        let inside = u >= 0.0 && v >= 0.0 && u + v <= 1.0;
        (inside && t > 0.0 && t < ray.t_max).then(|| (t, e1.cross(&e2)))
    }
}

impl Primitive for Triangle {
    fn world_bound(&self) -> WorldBox {
        let [a, b, c] = &self.vertices;
        WorldBox::from_point(*a).union_point(b).union_point(c)
    }

    fn intersect(&self, ray: &mut Ray) -> Option<HitRecord> {
        let (t, normal) = self.hit(ray)?;
        ray.t_max = t;

        Some(HitRecord {
            t,
            point: ray.point_at(t),
            normal: Unit::new_normalize(normal),
            material: self.material,
        })
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.hit(ray).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};

    fn sphere() -> Sphere {
        Sphere::new([1.0, 2.0, 3.0].into(), 1.0)
    }

    #[test]
    fn test_direct_hit_through_center() {
        let mut ray = Ray::new([1.0, 2.0, 0.0].into(), [0.0, 0.0, 1.0].into());
        let hit = sphere().intersect(&mut ray);

        let_assert!(Some(h) = hit);
        assert!((h.t - 2.0).abs() < 1e-6);
        assert!(ray.t_max == h.t);
        assert!((h.normal.z + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_grazing_hit() {
        let mut ray = Ray::new([2.0, 2.0, 0.0].into(), [0.0, 0.0, 1.0].into());
        let hit = sphere().intersect(&mut ray);

        let_assert!(Some(h) = hit);
        assert!((h.t - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_narrow_miss() {
        let mut ray = Ray::new([2.0, 2.01, 0.0].into(), [0.0, 0.0, 1.0].into());
        let hit = sphere().intersect(&mut ray);
        assert!(hit.is_none());
        assert!(ray.t_max == f32::INFINITY);
        assert!(!sphere().intersect_p(&ray));
    }

    #[test]
    fn test_hit_from_inside() {
        let mut ray = Ray::new([1.0, 2.0, 3.0].into(), [0.0, 1.0, 0.0].into());
        let_assert!(Some(h) = sphere().intersect(&mut ray));
        assert!((h.t - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_beyond_t_max() {
        let ray = Ray::new([1.0, 2.0, 0.0].into(), [0.0, 0.0, 1.0].into()).with_t_max(1.5);
        let mut narrowed = ray;
        assert!(sphere().intersect(&mut narrowed).is_none());
        assert!(narrowed.t_max == 1.5);
        assert!(!sphere().intersect_p(&ray));
    }

    #[test]
    fn test_sphere_bound() {
        let b = sphere().world_bound();
        assert!(b.min == WorldPoint::new(0.0, 1.0, 2.0));
        assert!(b.max == WorldPoint::new(2.0, 3.0, 4.0));
    }

    fn triangle() -> Triangle {
        Triangle::new(
            [0.0, 0.0, 5.0].into(),
            [4.0, 0.0, 5.0].into(),
            [0.0, 4.0, 5.0].into(),
        )
        .with_material(7)
    }

    #[test]
    fn test_triangle_hit() {
        let mut ray = Ray::new([1.0, 1.0, 0.0].into(), [0.0, 0.0, 1.0].into());
        let_assert!(Some(h) = triangle().intersect(&mut ray));
        assert!((h.t - 5.0).abs() < 1e-5);
        assert!(h.material == 7);
        assert!((h.normal.z.abs() - 1.0).abs() < 1e-6);
        assert!(ray.t_max == h.t);
    }

    #[test]
    fn test_triangle_back_side_hit() {
        let ray = Ray::new([1.0, 1.0, 10.0].into(), [0.0, 0.0, -1.0].into());
        assert!(triangle().intersect_p(&ray));
    }

    #[test]
    fn test_triangle_miss() {
        let mut ray = Ray::new([3.0, 3.0, 0.0].into(), [0.0, 0.0, 1.0].into());
        assert!(triangle().intersect(&mut ray).is_none());
        assert!(!triangle().intersect_p(&ray));
    }

    #[test]
    fn test_triangle_parallel_ray_misses() {
        let ray = Ray::new([1.0, 1.0, 5.0].into(), [1.0, 0.0, 0.0].into());
        assert!(!triangle().intersect_p(&ray));
    }

    #[test]
    fn test_triangle_bound() {
        let b = triangle().world_bound();
        assert!(b.min == WorldPoint::new(0.0, 0.0, 5.0));
        assert!(b.max == WorldPoint::new(4.0, 4.0, 5.0));
    }
}
