use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context as _;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, SeedableRng as _, rngs::SmallRng};
use raycore::{
    Bvh, Camera, Options, RenderSettings, ScreenBlockExt as _, Scene, WorkerCount,
    geometry::{ScreenBlock, ScreenSize, WorldPoint, WorldVector},
    render,
    renderer::NormalShading,
    scene::{bvh::SplitMethod, primitives::Sphere},
};

const DEFAULT_IMAGE_FILE: &str = "raycore.png";

/// Render a randomly generated field of spheres.
#[derive(Parser, Debug)]
#[command(name = "raycore-cli", version)]
struct Cli {
    /// Number of threads to render with, 0 uses all cores
    #[arg(long, default_value_t = 0)]
    nthreads: usize,
    /// Quarter resolution and a single sample per pixel
    #[arg(long)]
    quick: bool,
    /// Don't show progress
    #[arg(long)]
    quiet: bool,
    /// Print BVH statistics
    #[arg(long)]
    verbose: bool,
    /// Output image, format is given by the extension
    #[arg(long, short)]
    outfile: Option<PathBuf>,

    #[arg(long, default_value = "800")]
    width: NonZeroU32,
    #[arg(long, default_value = "600")]
    height: NonZeroU32,
    /// Samples per pixel
    #[arg(long, default_value = "16")]
    samples: NonZeroU32,
    #[arg(long, default_value = "16")]
    tile_size: NonZeroU32,

    /// Number of spheres in the scene
    #[arg(long, default_value_t = 1000)]
    spheres: usize,
    /// BVH construction method: sah, hlbvh, middle or equal
    #[arg(long, default_value = "sah")]
    split_method: SplitMethod,
    /// Maximum number of primitives in a BVH leaf
    #[arg(long, default_value_t = 4)]
    max_prims: usize,
    /// Seed of the scene generator
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

/// Spheres of random sizes resting on a huge ground sphere.
fn sphere_field(count: usize, seed: u64) -> Vec<Sphere> {
    const GROUND_RADIUS: f32 = 1000.0;
    let mut rng = SmallRng::seed_from_u64(seed);

    let mut spheres = vec![Sphere::new(WorldPoint::new(0.0, 0.0, -GROUND_RADIUS), GROUND_RADIUS)];
    spheres.extend((0..count).map(|i| {
        let radius = rng.random_range(0.2..1.5);
        let center = WorldPoint::new(
            rng.random_range(-30.0..30.0),
            rng.random_range(-30.0..30.0),
            radius,
        );
        Sphere::new(center, radius).with_material(i + 1)
    }));
    spheres
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let options = Options::builder()
        .thread_count(WorkerCount::from_thread_count(cli.nthreads))
        .quick_render(cli.quick)
        .quiet(cli.quiet)
        .verbose(cli.verbose)
        .maybe_image_file(cli.outfile)
        .build();

    let build_started = Instant::now();
    let bvh = Bvh::builder()
        .primitives(sphere_field(cli.spheres, cli.seed))
        .max_prims_in_node(cli.max_prims)
        .split_method(cli.split_method)
        .build();
    if !options.quiet {
        println!(
            "Built BVH over {} spheres in {:.2?}",
            bvh.primitives().len(),
            build_started.elapsed()
        );
    }
    if options.verbose {
        bvh.print_statistics();
    }
    let scene = Scene::new(bvh);

    let resolution = options.resolution(ScreenSize::new(cli.width.get(), cli.height.get()));
    let camera = Camera::looking_at()
        .center(WorldPoint::new(0.0, -45.0, 18.0))
        .target(WorldPoint::new(0.0, 0.0, 0.0))
        .resolution(resolution)
        .focal_length(35e-3)
        .call();
    let settings = options.render_settings(RenderSettings {
        tile_size: cli.tile_size,
        sample_count: cli.samples,
    });
    let integrator = NormalShading::with_light(WorldVector::new(-1.0, -2.0, 3.0));
    let scheduler = options.scheduler();

    let tile_grid = ScreenBlock::from_size(resolution).tile_grid_size(settings.tile_size);
    let bar = if options.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new((tile_grid.x * tile_grid.y) as u64)
    };
    bar.set_style(
        ProgressStyle::with_template("{elapsed_precise} [{wide_bar}] {pos}/{len} tiles")
            .context("Invalid progress bar template")?,
    );

    let rendering = render(&scene, &camera, &integrator, &settings, &scheduler, |_, _| {
        bar.inc(1)
    })
    .context("Rendering failed")?;
    bar.finish();
    scheduler.terminate();

    if !options.quiet {
        rendering.statistics.print();
    }

    let image_file = options.image_file_or(Path::new(DEFAULT_IMAGE_FILE));
    rendering.save(image_file)?;
    if !options.quiet {
        println!("Saved {}", image_file.display());
    }

    Ok(())
}
