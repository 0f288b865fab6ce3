use std::path::{Path, PathBuf};

use bon::Builder;

use crate::{
    geometry::ScreenSize,
    parallel::{Scheduler, WorkerCount},
    renderer::RenderSettings,
};

/// Quick renders divide the resolution in each direction by this.
const QUICK_RENDER_SCALE: u32 = 4;

/// Global options of a render, read only once set up.
#[derive(Clone, Debug, Default, Builder)]
pub struct Options {
    #[builder(default)]
    pub thread_count: WorkerCount,
    /// Lower resolution and a single sample per pixel
    #[builder(default)]
    pub quick_render: bool,
    /// No progress output
    #[builder(default)]
    pub quiet: bool,
    /// Print statistics of the acceleration structure and of the render
    #[builder(default)]
    pub verbose: bool,
    pub image_file: Option<PathBuf>,
}

impl Options {
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.thread_count)
    }

    pub fn resolution(&self, resolution: ScreenSize) -> ScreenSize {
        if self.quick_render {
            resolution.map(|x| (x / QUICK_RENDER_SCALE).max(1))
        } else {
            resolution
        }
    }

    pub fn render_settings(&self, settings: RenderSettings) -> RenderSettings {
        if self.quick_render {
            RenderSettings {
                sample_count: std::num::NonZeroU32::MIN,
                ..settings
            }
        } else {
            settings
        }
    }

    pub fn image_file_or<'a>(&'a self, default: &'a Path) -> &'a Path {
        self.image_file.as_deref().unwrap_or(default)
    }
}

#[cfg(test)]
mod test {
    use std::num::{NonZeroU32, NonZeroUsize};

    use super::*;
    use assert2::assert;
    use test_case::test_case;

    #[test]
    fn defaults() {
        let options = Options::builder().build();
        assert!(options.thread_count == WorkerCount::Auto);
        assert!(!options.quick_render);
        assert!(!options.quiet);
        assert!(!options.verbose);
        assert!(options.image_file.is_none());
        assert!(options.image_file_or(Path::new("out.png")) == Path::new("out.png"));
    }

    #[test_case(false, (640, 480) => (640, 480))]
    #[test_case(true, (640, 480) => (160, 120))]
    #[test_case(true, (3, 9) => (1, 2))]
    fn quick_render_resolution(quick_render: bool, resolution: (u32, u32)) -> (u32, u32) {
        let options = Options::builder().quick_render(quick_render).build();
        let scaled = options.resolution(ScreenSize::new(resolution.0, resolution.1));
        (scaled.x, scaled.y)
    }

    #[test]
    fn quick_render_single_sample() {
        let settings = RenderSettings {
            tile_size: NonZeroU32::new(32).unwrap(),
            sample_count: NonZeroU32::new(64).unwrap(),
        };

        let quick = Options::builder().quick_render(true).build().render_settings(settings);
        assert!(quick.sample_count.get() == 1);
        assert!(quick.tile_size.get() == 32);

        let full = Options::default().render_settings(settings);
        assert!(full.sample_count.get() == 64);
    }

    #[test]
    fn scheduler_uses_thread_count() {
        let options = Options::builder()
            .thread_count(WorkerCount::Manual(NonZeroUsize::new(3).unwrap()))
            .image_file("image.png".into())
            .build();
        assert!(options.scheduler().max_thread_index() == 3);
        assert!(options.image_file_or(Path::new("out.png")) == Path::new("image.png"));
    }
}
