//! Stereo passthrough compositor library.
//!
//! Each display cycle predicts the head pose, paces a decoded video against
//! the display rate and renders both eyes (video quad plus reconstructed room
//! planes) into one stereo texture, scaling its resolution with GPU load.

pub mod app;
pub mod colors;
pub mod config;
pub mod error;
pub mod frame_loop;
pub mod overlay;
pub mod pose;
pub mod renderer;
pub mod tracking;
pub mod video;
