//! Entry point for the stereo viewer.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use stereo_viewer::{app::App, config::Config, error::CompositorError};
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

fn main() -> Result<()> {
    // Initialize logging; default to "info" if RUST_LOG is unset.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    config.validate()?;
    let tuning = config.load_tuning()?;

    // The window mirrors the stereo texture, so size it to both eyes.
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Stereo Viewer")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 640))
            .build(&event_loop)?,
    );

    let mut app = pollster::block_on(App::new(window.clone(), &config, &tuning)).context("failed to start")?;

    // A fatal cycle error ends the loop and is returned from main.
    let mut fatal: Option<CompositorError> = None;

    event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => {
                if !app.handle_event(&event) {
                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::KeyboardInput { event, .. } => {
                            if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                                elwt.exit();
                            }
                        }
                        WindowEvent::RedrawRequested => match app.render() {
                            Ok(_) => {}
                            Err(CompositorError::SurfaceOutOfMemory) => {
                                log::error!("Surface out of memory, exiting");
                                fatal = Some(CompositorError::SurfaceOutOfMemory);
                                elwt.exit();
                            }
                            Err(e) => {
                                log::error!("Render error: {e}");
                                fatal = Some(e);
                                elwt.exit();
                            }
                        },
                        _ => {}
                    }
                }
            }
            Event::AboutToWait => {
                // Request a redraw each frame.
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    log::info!("Shutting down after {} frames", app.frame_loop.stats().total_frames);
    match fatal {
        Some(err) => Err(err).context("render loop failed"),
        None => Ok(()),
    }
}
