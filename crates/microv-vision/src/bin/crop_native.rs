//! CLI tool to map a display-space selection onto an image's native pixels.
//! Usage: cargo run -p microv-vision --features cli --bin crop_native -- \
//!        <image> <display_w> <display_h> <x> <y> <w> <h> [output.png]

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use microv_capture::{crop_region, FrameSize};
use microv_vision::{to_native, DisplayRect, SurfaceSize};

fn parse(args: &[String], i: usize, name: &str) -> Result<f64> {
    args[i]
        .parse::<f64>()
        .with_context(|| format!("{name} must be a number, got {:?}", args[i]))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 8 {
        bail!(
            "Usage: {} <image> <display_w> <display_h> <x> <y> <w> <h> [output.png]",
            args[0]
        );
    }

    let input_path = PathBuf::from(&args[1]);
    let displayed = SurfaceSize::new(parse(&args, 2, "display_w")?, parse(&args, 3, "display_h")?);
    let rect = DisplayRect {
        x: parse(&args, 4, "x")?,
        y: parse(&args, 5, "y")?,
        width: parse(&args, 6, "w")?,
        height: parse(&args, 7, "h")?,
    };
    let output_path = args
        .get(8)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./crop.png"));

    println!("Loading image: {}", input_path.display());
    let img = image::open(&input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?
        .to_rgba8();
    let native = FrameSize::of(&img);
    println!("Native size: {}x{}", native.width, native.height);
    println!(
        "Displayed at: {:.1}x{:.1}, scale x={:.4} y={:.4}",
        displayed.width,
        displayed.height,
        native.width as f64 / displayed.width,
        native.height as f64 / displayed.height,
    );

    let region = to_native(&rect, displayed, native)?;
    println!(
        "Display rect x={:.1} y={:.1} w={:.1} h={:.1} -> native x={:.1} y={:.1} w={:.1} h={:.1}",
        rect.x, rect.y, rect.width, rect.height, region.x, region.y, region.width, region.height,
    );

    let crop = crop_region(&img, &region)?;
    crop.save(&output_path)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    println!(
        "Crop {}x{} saved to: {}",
        crop.width(),
        crop.height(),
        output_path.display()
    );
    Ok(())
}
