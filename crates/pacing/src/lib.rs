//! Pacing: internal dependency-free timing primitives for the stereo compositor.
//!
//! - [`RingIndex`]: modulo cursor for ring-buffered GPU allocations.
//! - [`FramePacer`]: converts wall-clock deltas into "advance N video frames".
//! - [`DisplayLink`]: turns vsync callbacks into a frame duration and a
//!   predicted pose timestamp. [`VsyncClock`] measures the vsync spacing
//!   that feeds it.
//! - [`DynamicResolutionController`]: stepwise, hysteretic render-scale policy
//!   driven by GPU completion latency.
//! - [`FrameTiming`]: rolling per-cycle timing statistics for logging.
//!
//! All timestamps are `f64` seconds on a caller-chosen monotonic clock.

pub mod display_link;
pub mod pacer;
pub mod resolution;
pub mod ring;
pub mod stats;

pub use display_link::{DisplayLink, VsyncClock, VsyncTiming};
pub use pacer::FramePacer;
pub use resolution::{DynamicResolutionController, ResolutionTuning, ScaleChange};
pub use ring::RingIndex;
pub use stats::{FrameTiming, FrameTimingStats};
