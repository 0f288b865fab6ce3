pub mod arena;
mod camera;
pub mod geometry;
mod options;
pub mod parallel;
pub mod renderer;
pub mod scene;
mod screen_block;
pub mod util;

pub use crate::renderer::{RenderError, RenderSettings, Rendering, TileProgress, render};
pub use arena::MemoryArena;
pub use camera::Camera;
pub use options::Options;
pub use parallel::{Scheduler, WorkerCount};
pub use scene::{Primitive, Scene, bvh::Bvh};
pub use screen_block::ScreenBlockExt;
