//! GPU side of the compositor. [`compositor::StereoCompositor`] owns the
//! context, the stereo target and every pipeline; the rest are its parts.

pub mod compositor;
pub mod context;
pub mod mesh_cache;
pub mod pipelines;
pub mod projection;
pub mod targets;
pub mod uniforms;
pub mod video_texture;

pub use self::compositor::{CompositorSettings, StereoCompositor};
