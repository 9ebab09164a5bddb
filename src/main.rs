//! dc1394-capture binary for testing firewire camera capture.

use clap::Parser;
use dc1394_capture::traits::Result;
use dc1394_capture::{
    BusCache, CameraDevice, CameraError, Candidate, Dc1394Bus, FrameRate, OpenOptions,
    PixelLayout, Speed,
};
use tracing_subscriber::EnvFilter;

/// Open a firewire camera and report captured frames.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Camera node on the bus.
    #[arg(long, default_value_t = 0)]
    node: u32,

    /// ISO speed in Mbit/s (100, 200, 400, 800, 1600 or 3200).
    #[arg(long, default_value = "400")]
    speed: Speed,

    /// Fixed frame rate; the fastest rate of the mode when omitted.
    #[arg(long)]
    frame_rate: Option<FrameRate>,

    /// Use the largest mode of this layout instead of the default preference.
    #[arg(long)]
    layout: Option<PixelLayout>,

    /// Stop after this many frames (0 captures until interrupted).
    #[arg(long, default_value_t = 0)]
    frames: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(&Args::parse()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut options = OpenOptions::node(args.node).with_speed(args.speed);
    if let Some(rate) = args.frame_rate {
        options = options.with_frame_rate(rate);
    }

    let mut cache = BusCache::<Dc1394Bus>::new();
    let mut camera = match args.layout {
        Some(layout) => {
            let mut largest = |candidates: &[Candidate]| {
                candidates
                    .iter()
                    .copied()
                    .filter(|c| c.layout == layout)
                    .max_by_key(Candidate::area)
                    // a zero-sized candidate is never offered, so negotiation rejects it
                    .unwrap_or(Candidate::new(layout, 0, 0))
            };
            cache.open(&options, &mut largest)?
        }
        None => cache.open_preferred(&options)?,
    };

    println!(
        "Format: {}x{} {}",
        camera.width(),
        camera.height(),
        camera.layout()
    );

    let mut count = 0u64;
    while args.frames == 0 || count < args.frames {
        let frame = camera.read()?;
        if frame.data.len() < frame.expected_len() {
            return Err(CameraError::Native {
                op: "dc1394_capture_dequeue",
                code: -1,
            });
        }
        println!(
            "Frame {}: {} bytes, timestamp: {:?}",
            frame.metadata.sequence,
            frame.data.len(),
            frame.metadata.timestamp
        );
        count += 1;
    }

    camera.close();
    Ok(())
}
