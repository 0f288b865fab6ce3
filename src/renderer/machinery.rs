use std::{
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Instant,
};

use image::{GenericImage as _, RgbaImage};
use parking_lot::Mutex;

use crate::{
    camera::Camera,
    geometry::ScreenBlock,
    parallel::Scheduler,
    renderer::{
        Integrator, RenderError, RenderSettings, RenderStatistics, Rendering, TileProgress,
        worker::TileWorker,
    },
    scene::{Primitive, Scene},
    screen_block::ScreenBlockExt,
};

/// Render the scene tile by tile on the scheduler's threads.
///
/// `tile_callback` is called from the worker threads after each tile is written to the image.
pub fn render<O, I, F>(
    scene: &Scene<O>,
    camera: &Camera,
    integrator: &I,
    settings: &RenderSettings,
    scheduler: &Scheduler,
    tile_callback: F,
) -> Result<Rendering, RenderError>
where
    O: Primitive + Sync,
    I: Integrator + Sync,
    F: Fn(ScreenBlock, TileProgress) + Sync,
{
    scheduler.start()?;

    let started = Instant::now();
    let resolution = camera.resolution();
    let frame = ScreenBlock::from_size(resolution);
    let grid_size = frame.tile_grid_size(settings.tile_size);
    let total = grid_size.x * grid_size.y;

    let image = Mutex::new(RgbaImage::new(resolution.x, resolution.y));
    let finished_tiles = AtomicUsize::new(0);
    let ray_counts: Vec<AtomicU64> = (0..scheduler.max_thread_index())
        .map(|_| AtomicU64::new(0))
        .collect();

    scheduler.parallel_for_2d(grid_size, |grid_point, thread_index| {
        let tile = frame.tile(grid_point, settings.tile_size);
        let tile_index = grid_point.y * grid_size.x + grid_point.x;

        let mut worker = TileWorker::new(tile_index as u64);
        let buffer = worker.render_tile(scene, camera, integrator, settings, &tile);

        image
            .lock()
            .copy_from(&buffer, tile.min.x, tile.min.y)
            .unwrap_or_else(|_| unreachable!("The buffer should always fit into the output"));
        ray_counts[thread_index].fetch_add(worker.ray_count(), Ordering::Relaxed);

        let finished = finished_tiles.fetch_add(1, Ordering::AcqRel) + 1;
        tile_callback(tile, TileProgress { finished, total });
    });

    Ok(Rendering {
        image: image.into_inner(),
        statistics: RenderStatistics {
            tile_count: total,
            rays_per_thread: ray_counts.into_iter().map(AtomicU64::into_inner).collect(),
            elapsed: started.elapsed(),
        },
    })
}

#[cfg(test)]
mod test {
    use std::num::NonZeroU32;

    use super::*;
    use crate::{
        geometry::{ScreenSize, WorldPoint, WorldVector},
        parallel::WorkerCount,
        renderer::NormalShading,
        scene::{
            bvh::{Bvh, SplitMethod},
            primitives::Sphere,
        },
    };
    use assert2::{assert, let_assert};
    use test_case::test_case;

    fn camera(width: u32, height: u32) -> Camera {
        Camera::builder()
            .center(WorldPoint::new(0.0, -10.0, 0.0))
            .forward(WorldVector::new(0.0, 1.0, 0.0))
            .up(WorldVector::new(0.0, 0.0, 1.0))
            .resolution(ScreenSize::new(width, height))
            .build()
    }

    fn sphere_scene() -> Scene<Bvh<Sphere>> {
        let spheres = vec![
            Sphere::new(WorldPoint::origin(), 1.0),
            Sphere::new(WorldPoint::new(1.5, 2.0, 0.5), 0.5),
            Sphere::new(WorldPoint::new(-1.0, 1.0, -1.0), 0.7),
        ];
        Scene::new(Bvh::build(spheres, 1, SplitMethod::Sah))
    }

    fn settings(tile_size: u32, sample_count: u32) -> RenderSettings {
        RenderSettings {
            tile_size: NonZeroU32::new(tile_size).unwrap(),
            sample_count: NonZeroU32::new(sample_count).unwrap(),
        }
    }

    fn scheduler(thread_count: usize) -> Scheduler {
        Scheduler::new(WorkerCount::from_thread_count(thread_count))
    }

    #[test]
    fn empty_scene_renders_transparent_image() {
        let scene = Scene::new(Bvh::build(Vec::<Sphere>::new(), 4, SplitMethod::Sah));
        let_assert!(
            Ok(rendering) = render(
                &scene,
                &camera(33, 17),
                &NormalShading::default(),
                &settings(8, 2),
                &scheduler(4),
                |_, _| {}
            )
        );
        assert!(rendering.image.dimensions() == (33, 17));
        assert!(rendering.image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
        assert!(rendering.statistics.total_rays() == 33 * 17 * 2);
    }

    #[test]
    fn sphere_is_visible_in_the_middle() {
        let_assert!(
            Ok(rendering) = render(
                &sphere_scene(),
                &camera(64, 48),
                &NormalShading::default(),
                &settings(16, 1),
                &scheduler(2),
                |_, _| {}
            )
        );
        assert!(rendering.image.get_pixel(32, 24).0[3] == 255);
        assert!(rendering.image.get_pixel(0, 0).0 == [0, 0, 0, 0]);
    }

    #[test_case(1)]
    #[test_case(3)]
    #[test_case(8)]
    fn output_does_not_depend_on_thread_count(thread_count: usize) {
        let render_with = |thread_count| {
            render(
                &sphere_scene(),
                &camera(50, 30),
                &NormalShading::with_light(WorldVector::new(1.0, -1.0, 1.0)),
                &settings(7, 3),
                &scheduler(thread_count),
                |_, _| {},
            )
        };

        let_assert!(Ok(reference) = render_with(1));
        let_assert!(Ok(rendering) = render_with(thread_count));
        assert!(reference.image == rendering.image);
    }

    #[test]
    fn every_tile_reported() {
        let reported = Mutex::new(Vec::new());
        let_assert!(
            Ok(rendering) = render(
                &sphere_scene(),
                &camera(40, 20),
                &NormalShading::default(),
                &settings(16, 1),
                &scheduler(4),
                |tile, progress| reported.lock().push((tile, progress))
            )
        );

        let reported = reported.into_inner();
        assert!(reported.len() == 6);
        assert!(rendering.statistics.tile_count == 6);
        assert!(reported.iter().all(|(_, progress)| progress.total == 6));

        let mut finished: Vec<usize> = reported.iter().map(|(_, progress)| progress.finished).collect();
        finished.sort();
        assert!(finished == (1..=6).collect::<Vec<_>>());

        let area: u32 = reported.iter().map(|(tile, _)| tile.area()).sum();
        assert!(area == 40 * 20);
    }

    #[test]
    fn rays_are_counted_per_thread() {
        let scheduler = scheduler(3);
        let_assert!(
            Ok(rendering) = render(
                &sphere_scene(),
                &camera(20, 20),
                &NormalShading::default(),
                &settings(4, 2),
                &scheduler,
                |_, _| {}
            )
        );
        assert!(rendering.statistics.rays_per_thread.len() == scheduler.max_thread_index());
        assert!(rendering.statistics.total_rays() == 20 * 20 * 2);
    }

    #[test]
    fn save_reports_bad_path() {
        let_assert!(
            Ok(rendering) = render(
                &sphere_scene(),
                &camera(4, 4),
                &NormalShading::default(),
                &settings(16, 1),
                &scheduler(1),
                |_, _| {}
            )
        );

        let directory = std::env::temp_dir().join(format!("raycore-render-test-{}", std::process::id()));
        let_assert!(Ok(()) = std::fs::create_dir_all(&directory));

        let path = directory.join("out.png");
        let_assert!(Ok(()) = rendering.save(&path));
        let_assert!(Ok(loaded) = image::open(&path));
        assert!(loaded.to_rgba8() == rendering.image);

        let_assert!(
            Err(RenderError::ImageSave { .. }) = rendering.save(directory.join("missing").join("out.png"))
        );

        let _ = std::fs::remove_dir_all(&directory);
    }
}
