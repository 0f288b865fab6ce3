mod integrator;
mod machinery;
mod worker;

use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};

use image::RgbaImage;
use thiserror::Error;

use crate::{parallel::SchedulerError, util::Stats};

pub use integrator::{Integrator, NormalShading};
pub use machinery::render;

pub const DEFAULT_TILE_SIZE: NonZeroU32 = match NonZeroU32::new(16) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Copy, Clone, Debug)]
pub struct RenderSettings {
    pub tile_size: NonZeroU32,
    pub sample_count: NonZeroU32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            tile_size: DEFAULT_TILE_SIZE,
            sample_count: NonZeroU32::MIN,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to start the worker threads")]
    Scheduler(#[from] SchedulerError),
    #[error("Failed to save the image to {path:?}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Progress reported after each finished tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileProgress {
    pub finished: usize,
    pub total: usize,
}

#[derive(Clone, Debug)]
pub struct RenderStatistics {
    pub tile_count: usize,
    /// Camera rays traced by each thread, indexed by thread index
    pub rays_per_thread: Vec<u64>,
    pub elapsed: Duration,
}

impl RenderStatistics {
    pub fn total_rays(&self) -> u64 {
        self.rays_per_thread.iter().sum()
    }

    pub fn rays_per_second(&self) -> f64 {
        self.total_rays() as f64 / self.elapsed.as_secs_f64().max(1e-9)
    }

    pub fn print(&self) {
        println!(
            "Rendered {} tiles in {:.2?}, {} rays ({:.0} rays/s)",
            self.tile_count,
            self.elapsed,
            self.total_rays(),
            self.rays_per_second()
        );
        let per_thread: Stats = self.rays_per_thread.iter().map(|&rays| rays as usize).collect();
        println!("Rays per thread: {} (busiest {:.2}x average)", per_thread, per_thread.imbalance());
    }
}

/// Finished image together with the statistics of its render.
pub struct Rendering {
    pub image: RgbaImage,
    pub statistics: RenderStatistics,
}

impl Rendering {
    /// Save the image, format is chosen by the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let path = path.as_ref();
        self.image.save(path).map_err(|source| RenderError::ImageSave {
            path: path.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert2::assert;

    #[test]
    fn default_settings() {
        let settings = RenderSettings::default();
        assert!(settings.tile_size.get() == 16);
        assert!(settings.tile_size == DEFAULT_TILE_SIZE);
        assert!(settings.sample_count.get() == 1);
    }

    #[test]
    fn ray_statistics() {
        let statistics = RenderStatistics {
            tile_count: 4,
            rays_per_thread: vec![100, 300],
            elapsed: Duration::from_secs(2),
        };
        assert!(statistics.total_rays() == 400);
        assert!(statistics.rays_per_second() == 200.0);
        statistics.print();
    }
}
