use nalgebra::Unit;
use rand::rngs::SmallRng;

use crate::{
    arena::MemoryArena,
    geometry::{EPSILON, HitRecord, Ray, WorldPoint, WorldVector},
    scene::{Primitive, Scene},
    util::Rgba,
};

/// Computes the color seen along a camera ray.
pub trait Integrator {
    /// `arena` is reset by the caller after every sample, anything allocated
    /// in it only lives for the duration of this call.
    fn li<O: Primitive>(&self, ray: &Ray, scene: &Scene<O>, rng: &mut SmallRng, arena: &MemoryArena) -> Rgba;
}

/// Gray shading by the angle between the camera ray and the surface,
/// optionally with shadows from a directional light.
#[derive(Copy, Clone, Debug, Default)]
pub struct NormalShading {
    /// Direction towards the light
    pub light_direction: Option<Unit<WorldVector>>,
}

const AMBIENT: f32 = 0.2;

/// Local geometry of a shaded point, normal facing the incoming ray.
struct ShadingFrame {
    point: WorldPoint,
    normal: Unit<WorldVector>,
    facing: f32,
}

impl ShadingFrame {
    fn new(ray: &Ray, hit: &HitRecord) -> Self {
        let cos = ray.direction.dot(hit.normal.as_ref());
        let normal = if cos > 0.0 { -hit.normal } else { hit.normal };
        ShadingFrame {
            point: hit.point,
            normal,
            facing: cos.abs(),
        }
    }

    fn ray_towards(&self, direction: &WorldVector) -> Ray {
        Ray::new(self.point + self.normal.as_ref() * EPSILON, *direction)
    }
}

impl NormalShading {
    pub fn with_light(light_direction: WorldVector) -> Self {
        NormalShading {
            light_direction: Unit::try_new(light_direction, EPSILON),
        }
    }
}

impl Integrator for NormalShading {
    fn li<O: Primitive>(&self, ray: &Ray, scene: &Scene<O>, _rng: &mut SmallRng, arena: &MemoryArena) -> Rgba {
        let mut ray = *ray;
        let Some(hit) = scene.intersect(&mut ray) else {
            return Rgba::new(0.0, 0.0, 0.0, 0.0);
        };

        let frame = arena.alloc(ShadingFrame::new(&ray, &hit));

        let Some(light_direction) = &self.light_direction else {
            return Rgba::new(frame.facing, frame.facing, frame.facing, 1.0);
        };

        let cos_light = frame.normal.dot(light_direction.as_ref());
        let direct = if cos_light > 0.0 && !scene.intersect_p(&frame.ray_towards(light_direction.as_ref())) {
            cos_light
        } else {
            0.0
        };

        let value = AMBIENT * frame.facing + (1.0 - AMBIENT) * direct;
        Rgba::new(value, value, value, 1.0)
    }
}
