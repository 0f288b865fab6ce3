use std::{num::NonZeroU32, time::Duration};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng as _, rngs::SmallRng};
use raycore::{
    Bvh, Camera, RenderSettings, Scene, Scheduler, WorkerCount,
    geometry::{ScreenSize, WorldPoint},
    render,
    renderer::NormalShading,
    scene::{bvh::SplitMethod, primitives::Sphere},
};

fn spheres(count: usize) -> Vec<Sphere> {
    let mut rng = SmallRng::seed_from_u64(1);
    (0..count)
        .map(|i| {
            let center = WorldPoint::new(
                rng.random_range(-10.0..10.0),
                rng.random_range(-10.0..10.0),
                rng.random_range(-10.0..10.0),
            );
            Sphere::new(center, rng.random_range(0.05..0.5)).with_material(i)
        })
        .collect()
}

fn build_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_bvh");
    for split_method in SplitMethod::ALL {
        group.bench_with_input(
            BenchmarkId::from_parameter(split_method),
            &split_method,
            |b, &split_method| {
                b.iter_batched(
                    || spheres(100_000),
                    |spheres| Bvh::build(spheres, 4, split_method),
                    criterion::BatchSize::LargeInput,
                )
            },
        );
    }
    group.finish();
}

fn render_benchmark(c: &mut Criterion) {
    let camera = Camera::looking_at()
        .center(WorldPoint::new(0.0, -30.0, 0.0))
        .target(WorldPoint::origin())
        .resolution(ScreenSize::new(320, 240))
        .call();
    let settings = RenderSettings {
        tile_size: NonZeroU32::new(16).unwrap(),
        sample_count: NonZeroU32::new(4).unwrap(),
    };
    let scheduler = Scheduler::new(WorkerCount::Auto);
    let integrator = NormalShading::default();

    let mut group = c.benchmark_group("render_spheres");
    for split_method in SplitMethod::ALL {
        let scene = Scene::new(Bvh::build(spheres(10_000), 4, split_method));
        group.bench_with_input(
            BenchmarkId::from_parameter(split_method),
            &scene,
            |b, scene| {
                b.iter(|| render(scene, &camera, &integrator, &settings, &scheduler, |_, _| {}).unwrap())
            },
        );
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20).measurement_time(Duration::from_secs(10));
    targets = build_benchmark, render_benchmark
}
criterion_main!(benches);
