extern crate argparse;

extern crate collatz;

use std::io;
use std::path::Path;
use std::process;

use argparse::{ArgumentParser, Store, StoreTrue};
use tracing::{error, info};

use collatz::ppm;
use collatz::render::{frame_path, group_frames, render_parallel, Palette, RenderConf};

fn main() {
    let defaults = RenderConf::default();
    let mut width = defaults.width;
    let mut height = defaults.height;
    let mut margin = defaults.margin;
    let mut thread_count = defaults.thread_count;
    let mut palette = defaults.palette.to_string();
    let mut output_fname: String = "collatz.png".to_string();
    let mut write_raw_ppm = false;
    let mut verbose = false;
    {
        let mut argparse = ArgumentParser::new();
        argparse.set_description(
            "Read curve records from collatz-gen on stdin and draw one image per frame.",
        );
        argparse.refer(&mut width).add_option(
            &["--width"],
            Store,
            "Width in pixels of the output image (default 1920)",
        );
        argparse.refer(&mut height).add_option(
            &["--height"],
            Store,
            "Height in pixels of the output image (default 1080)",
        );
        argparse.refer(&mut margin).add_option(
            &["--margin"],
            Store,
            "Empty border in pixels around the curves (default 20)",
        );
        argparse.refer(&mut thread_count).add_option(
            &["-t", "--threads"],
            Store,
            "Number of threads to use (default 3)",
        );
        argparse.refer(&mut palette).add_option(
            &["--palette"],
            Store,
            "'white' for white lines, 'peak' to color by how high each trajectory climbs \
             (default white)",
        );
        argparse.refer(&mut output_fname).add_option(
            &["-o", "--output"],
            Store,
            "Path of the output image (default 'collatz.png'); frames of an animation get a \
             _NNNN suffix",
        );
        argparse.refer(&mut write_raw_ppm).add_option(
            &["--ppm"],
            StoreTrue,
            "Also write the unscaled channel counts as a plain PPM next to each PNG",
        );
        argparse.refer(&mut verbose).add_option(
            &["-v", "--verbose"],
            StoreTrue,
            "Log debug output to stderr",
        );
        argparse.parse_args_or_exit();
    }
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let result = palette.parse::<Palette>().and_then(|palette| {
        let conf = RenderConf {
            width,
            height,
            margin,
            thread_count,
            palette,
        };
        conf.validate()?;
        info!("{}", conf);
        render_frames(&conf, Path::new(&output_fname), write_raw_ppm)
    });
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}

fn render_frames(conf: &RenderConf, output: &Path, write_raw_ppm: bool) -> collatz::Result<()> {
    let frames = group_frames(io::stdin().lock())?;
    let curve_count: usize = frames.values().map(|c| c.len()).sum();
    info!("Read {} curves in {} frame(s)", curve_count, frames.len());

    let frame_count = frames.len();
    for (frame, curves) in frames {
        let canvas = render_parallel(curves, conf)?;
        let png = frame_path(output, frame, frame_count);
        ppm::write_scaled_png(canvas.imgs(), &png, |val, mx| {
            ppm::fexp(val, 0.100) / ppm::fexp(mx, 0.100)
        })?;
        info!("Frame {} written to {}", frame, png.display());
        if write_raw_ppm {
            let raw = png.with_extension("ppm");
            ppm::write_ppm(canvas.imgs(), &raw)?;
            info!("Raw counts written to {}", raw.display());
        }
    }
    Ok(())
}
