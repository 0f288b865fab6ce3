use image::RgbaImage;
use rand::{SeedableRng, rngs::SmallRng};

use crate::{
    arena::MemoryArena,
    camera::Camera,
    geometry::ScreenBlock,
    renderer::{Integrator, RenderSettings},
    scene::{Primitive, Scene},
    screen_block::ScreenBlockExt,
    util::Rgba,
};

/// State private to the rendering of a single tile.
pub struct TileWorker {
    rng: SmallRng,
    arena: MemoryArena,
    ray_count: u64,
}

impl TileWorker {
    /// The seed decides the random sequence of the tile, so that the result does not depend
    /// on which thread renders it.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            arena: MemoryArena::default(),
            ray_count: 0,
        }
    }

    pub fn ray_count(&self) -> u64 {
        self.ray_count
    }

    pub fn render_tile<O: Primitive, I: Integrator>(
        &mut self,
        scene: &Scene<O>,
        camera: &Camera,
        integrator: &I,
        settings: &RenderSettings,
        tile: &ScreenBlock,
    ) -> RgbaImage {
        let mut buffer = RgbaImage::new(tile.width(), tile.height());
        let sample_count = settings.sample_count.get();

        for point in tile.internal_points() {
            let mut pixel_sum = Rgba::new(0.0, 0.0, 0.0, 0.0);
            for _i in 0..sample_count {
                let ray = camera.sample_ray(&point, &mut self.rng);
                pixel_sum += integrator.li(&ray, scene, &mut self.rng, &self.arena);
                self.ray_count += 1;
                self.arena.reset();
            }
            let pixel = pixel_sum * (1.0 / sample_count as f32);

            let buffer_position = point - tile.min;
            buffer.put_pixel(buffer_position.x, buffer_position.y, color_to_image(pixel));
        }

        buffer
    }
}

/// Maps a 0-1 f32 rgba pixel to pixel type compatible with module image.
pub fn color_to_image(color: Rgba) -> image::Rgba<u8> {
    image::Rgba([
        (color.r * 255.0).round().clamp(0.0, 255.0) as u8,
        (color.g * 255.0).round().clamp(0.0, 255.0) as u8,
        (color.b * 255.0).round().clamp(0.0, 255.0) as u8,
        (color.a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
