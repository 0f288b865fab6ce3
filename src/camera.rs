use assert2::assert;
use bon::bon;
use nalgebra::Unit;
use rand_distr::Distribution as _;

use crate::geometry::{EPSILON, FloatType, Ray, ScreenPoint, ScreenSize, WorldPoint, WorldVector};

/// Thin lens camera.
#[derive(Copy, Clone, Debug)]
pub struct Camera {
    center: WorldPoint,

    resolution: ScreenSize,

    up: Unit<WorldVector>,
    right: Unit<WorldVector>,
    film_origin_offset: WorldVector,

    /// Distance between pixels in meters
    pixel_pitch: FloatType,

    /// Lens radius in meters
    lens_radius: FloatType,
    lens_weight: FloatType,
}

#[bon]
impl Camera {
    /// Panics if the vectors are degenerate or any of the dimensions is not positive.
    /// Infinite `f_number` makes a pinhole camera.
    #[builder]
    pub fn new(
        center: WorldPoint,
        forward: WorldVector,
        up: WorldVector,
        resolution: ScreenSize,
        #[builder(default = 36e-3)] film_width: FloatType,
        #[builder(default = 50e-3)] focal_length: FloatType,
        #[builder(default = FloatType::INFINITY)] f_number: FloatType,
        #[builder(default = 1.0)] focus_distance: FloatType,
    ) -> Self {
        let forward = Unit::try_new(forward, EPSILON).expect("Forward vector must be non-zero");
        let up = Unit::try_new(up, EPSILON).expect("Up vector must be non-zero");
        let right = Unit::try_new(forward.cross(&up), EPSILON)
            .expect("`up` and `forward` must be linearly independent");
        let up = Unit::new_normalize(right.cross(&forward));

        assert!(resolution.x > 0);
        assert!(resolution.y > 0);
        assert!(film_width > 0.0);
        assert!(focal_length > 0.0);
        assert!(f_number > 0.0);
        assert!(focus_distance > 0.0);

        let pixel_pitch = film_width / (resolution.x as FloatType);
        let resolution_minus_one = ScreenSize::new(resolution.x - 1, resolution.y - 1);
        let film_origin_uv = resolution_minus_one.cast::<FloatType>() * pixel_pitch / 2.0;
        let film_origin_offset = -forward.as_ref() * focal_length
            + right.as_ref() * film_origin_uv.x
            - up.as_ref() * film_origin_uv.y;

        Camera {
            center,

            resolution,

            up,
            right,
            film_origin_offset,
            pixel_pitch,
            lens_radius: focal_length / (2.0 * f_number),
            lens_weight: focal_length / focus_distance,
        }
    }

    /// Camera at `center` looking at `target`, with Z up.
    #[builder]
    pub fn looking_at(
        center: WorldPoint,
        target: WorldPoint,
        resolution: ScreenSize,
        #[builder(default = 50e-3)] focal_length: FloatType,
    ) -> Self {
        Camera::builder()
            .center(center)
            .forward(target - center)
            .up(WorldVector::z())
            .resolution(resolution)
            .focal_length(focal_length)
            .build()
    }
}

impl Camera {
    pub fn resolution(&self) -> ScreenSize {
        self.resolution
    }

    /// Samples a new ray from the camera for the given image pixel.
    pub fn sample_ray(&self, point: &ScreenPoint, rng: &mut impl rand::Rng) -> Ray {
        let film_u = point.x as FloatType + rng.random_range(-0.5..=0.5);
        let film_v = point.y as FloatType + rng.random_range(-0.5..=0.5);
        let film_point_offset = self.film_origin_offset
            + self.up.as_ref() * (film_v * self.pixel_pitch)
            - self.right.as_ref() * (film_u * self.pixel_pitch);

        if self.lens_radius == 0.0 {
            return Ray::new(self.center, -film_point_offset);
        }

        let lens_uv: [FloatType; 2] = rand_distr::UnitDisc.sample(rng);
        let lens_vector = self.right.as_ref() * (self.lens_radius * lens_uv[0])
            + self.up.as_ref() * (self.lens_radius * lens_uv[1]);

        // Aim at the point where the ray through the lens center crosses the focus plane
        let direction = -film_point_offset - lens_vector * self.lens_weight;

        Ray::new(self.center + lens_vector, direction)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert2::assert;
    use rand::{SeedableRng, rngs::SmallRng};

    #[test]
    fn left_right_up_down() {
        // X goes right, Y goes away, Z goes up
        let camera = Camera::builder()
            .center(WorldPoint::new(0.0, 0.0, 0.0))
            .forward(WorldVector::new(0.0, 1.0, 0.0))
            .up(WorldVector::new(0.0, 0.0, 1.0))
            .resolution(ScreenSize::new(800, 600))
            .build();
        let mut rng = SmallRng::seed_from_u64(1);

        let ray_center = camera.sample_ray(&ScreenPoint::new(400, 300), &mut rng);
        let ray_left = camera.sample_ray(&ScreenPoint::new(0, 300), &mut rng);
        let ray_right = camera.sample_ray(&ScreenPoint::new(799, 300), &mut rng);
        let ray_up = camera.sample_ray(&ScreenPoint::new(400, 0), &mut rng);
        let ray_down = camera.sample_ray(&ScreenPoint::new(400, 599), &mut rng);

        assert!(ray_center.direction.x.abs() < 1e-3);
        assert!(ray_center.direction.z.abs() < 1e-3);
        assert!(ray_left.direction.x < ray_center.direction.x);
        assert!(ray_right.direction.x > ray_center.direction.x);
        assert!(ray_up.direction.z > ray_center.direction.z);
        assert!(ray_down.direction.z < ray_center.direction.z);
    }

    #[test]
    fn thin_lens_rays_meet_at_focus_distance() {
        let camera = Camera::builder()
            .center(WorldPoint::origin())
            .forward(WorldVector::new(0.0, 1.0, 0.0))
            .up(WorldVector::new(0.0, 0.0, 1.0))
            .resolution(ScreenSize::new(101, 101))
            .f_number(2.0)
            .focus_distance(5.0)
            .build();
        let mut rng = SmallRng::seed_from_u64(2);

        let mut min_x = FloatType::INFINITY;
        let mut max_x = FloatType::NEG_INFINITY;
        for _ in 0..100 {
            let ray = camera.sample_ray(&ScreenPoint::new(50, 50), &mut rng);
            // Intersection with the plane y = 5
            let t = (5.0 - ray.origin.y) / ray.direction.y;
            let p = ray.point_at(t);
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            // Lens origins are spread over the aperture
            assert!(ray.origin.y == 0.0);
        }

        // The spread at the focus plane is bounded by the pixel footprint, not the aperture
        let pixel_footprint = 36e-3 / 101.0 * 5.0 / 50e-3;
        assert!(max_x - min_x <= pixel_footprint * 1.01);
    }

    #[test]
    fn looking_at_points_forward() {
        let camera = Camera::looking_at()
            .center(WorldPoint::new(0.0, -10.0, 0.0))
            .target(WorldPoint::origin())
            .resolution(ScreenSize::new(11, 11))
            .call();
        let ray = camera.sample_ray(&ScreenPoint::new(5, 5), &mut SmallRng::seed_from_u64(3));
        assert!(ray.direction.y > 0.99);
        assert!(camera.resolution() == ScreenSize::new(11, 11));
    }
}
