//! Live preview of the filter renderer
//!
//! Opens a window and feeds the renderer a synthetic camera: a moving NV12
//! test pattern generated on the CPU. Extra filter passes can be loaded from a
//! WGSL file and chained from the command line.
//!
//! # Usage
//! ```bash
//! cargo run --example preview -- --filters my_filters.wgsl --chain edges,outline --uses-blur
//! ```

mod app;
mod camera;

use app::PreviewApp;
use clap::Parser;
use std::path::PathBuf;
use winit::event_loop::{ControlFlow, EventLoop};

/// Command-line arguments for the preview
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// WGSL module with additional filter passes
    #[arg(long)]
    filters: Option<PathBuf>,

    /// Comma-separated filter passes to run, in order
    #[arg(long, value_delimiter = ',')]
    chain: Vec<String>,

    /// Whether the chained passes read the blurred image
    #[arg(long)]
    uses_blur: bool,

    /// YAML manifest mapping pass names to entry points
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Frames the GPU may have in flight
    #[arg(long, default_value_t = 2)]
    buffered_frames: usize,

    /// Follow the window orientation instead of locking to portrait
    #[arg(long)]
    tablet: bool,
}

fn main() -> Result<(), winit::error::EventLoopError> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to install tracing subscriber");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = PreviewApp::new(args);
    event_loop.run_app(&mut app)
}
