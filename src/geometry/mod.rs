mod aabb;
mod ray_box_intersection;

use nalgebra::{Point2, Point3, Unit, Vector2, Vector3};

pub use aabb::AABB;
pub use ray_box_intersection::{RayIntersectionExt, gamma};

pub type FloatType = f32;
pub const EPSILON: FloatType = 1e-4;

pub type ScreenPoint = Point2<u32>;
pub type ScreenSize = Vector2<u32>;
pub type ScreenBlock = AABB<ScreenPoint>;

pub type WorldPoint = Point3<FloatType>;
pub type WorldVector = Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: WorldPoint,
    /// Normalized direction of the ray
    pub direction: WorldVector,

    /// Componentwise inverse of the ray direction
    /// Zeros in direction get turned into positive infinity regardless of the sign of the zero
    pub inv_direction: WorldVector,

    /// Upper limit of the distance along the ray, shrinks as closer hits are found
    pub t_max: FloatType,
}

impl Ray {
    pub fn new(origin: WorldPoint, direction: WorldVector) -> Ray {
        let direction = direction.normalize();
        let inv_direction = direction.map(|x| if x == 0.0 { f32::INFINITY } else { 1.0 / x });

        Ray {
            origin,
            direction,
            inv_direction,
            t_max: FloatType::INFINITY,
        }
    }

    pub fn with_t_max(self, t_max: FloatType) -> Ray {
        Ray { t_max, ..self }
    }

    pub fn point_at(&self, distance: FloatType) -> WorldPoint {
        self.origin + self.direction * distance
    }

    /// Per axis flag, true if the direction points towards negative infinity.
    pub fn direction_is_negative(&self) -> [bool; 3] {
        [
            self.inv_direction.x < 0.0,
            self.inv_direction.y < 0.0,
            self.inv_direction.z < 0.0,
        ]
    }
}

#[derive(Clone, Debug)]
pub struct HitRecord {
    pub t: FloatType,
    pub point: WorldPoint,
    pub normal: Unit<WorldVector>,
    /// Opaque id handed out by the primitive
    pub material: usize,
}

#[cfg(test)]
pub mod test {
    use super::*;
    use assert2::assert;
    use proptest::prelude::*;
    use test_strategy::proptest;

    /// Helper macro that creates a wrapper arnound a type that implemetns Deref and Arbitary
    macro_rules! arbitrary_wrapper {
        ( $wrapper_name:ident ( $type:ty ) -> $block:block ) => {
            #[derive(Copy, Clone, Debug)]
            pub struct $wrapper_name(pub $type);

            impl std::ops::Deref for $wrapper_name {
                type Target = $type;
                fn deref(&self) -> &$type {
                    &self.0
                }
            }

            impl Arbitrary for $wrapper_name {
                type Parameters = ();
                type Strategy = proptest::strategy::BoxedStrategy<Self>;
                fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
                    $block.prop_map(|x| $wrapper_name(x)).boxed()
                }
            }
        };
    }

    fn simple_float() -> BoxedStrategy<f32> {
        (-100_000i32..100_000).prop_map(|n| n as f32 * 1e-3).boxed()
    }

    arbitrary_wrapper! {
        ScreenBlockWrapper(ScreenBlock) -> {
            const RANGE: std::ops::Range<u32> = 0..100u32;
            (RANGE, RANGE, RANGE, RANGE)
                .prop_map(|coords| {
                    ScreenBlock::new(
                        ScreenPoint::new(coords.0.min(coords.2), coords.1.min(coords.3)),
                        ScreenPoint::new(coords.0.max(coords.2), coords.1.max(coords.3)),
                    )
                })
        }
    }

    arbitrary_wrapper! {
        ScreenSizeWrapper(ScreenSize) -> {
            const RANGE: std::ops::Range<u32> = 1..100u32;
            (RANGE, RANGE)
                .prop_map(|coords| ScreenSize::new(coords.0, coords.1))
        }
    }

    arbitrary_wrapper! {
        NonzeroWorldVectorWrapper(WorldVector) -> {
            (simple_float(), simple_float(), simple_float())
                .prop_filter_map(
                    "vector is zero",
                    |coords| {
                        let vector = WorldVector::new(coords.0, coords.1, coords.2);
                        if vector.norm() < 1e-3 {
                            None
                        } else {
                            Some(vector)
                        }
                    })

        }
    }

    arbitrary_wrapper! {
        WorldPointWrapper(WorldPoint) -> {
            (simple_float(), simple_float(), simple_float())
                .prop_map(|coords| {
                    WorldPoint::new(coords.0, coords.1, coords.2)
                })
        }
    }

    #[test]
    fn zero_direction_components_invert_to_positive_infinity() {
        let ray = Ray::new(WorldPoint::origin(), WorldVector::new(-0.0, 0.0, -2.0));
        assert!(ray.inv_direction.x == f32::INFINITY);
        assert!(ray.inv_direction.y == f32::INFINITY);
        assert!(ray.inv_direction.z == -1.0);
        assert!(ray.direction_is_negative() == [false, false, true]);
        assert!(ray.t_max == f32::INFINITY);
    }

    #[proptest]
    fn direction_is_normalized(origin: WorldPointWrapper, direction: NonzeroWorldVectorWrapper) {
        let ray = Ray::new(*origin, *direction);
        assert!((ray.direction.norm() - 1.0).abs() < 1e-5);
    }
}
