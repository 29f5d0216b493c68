use std::cmp::max;
use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::{debug, warn};

use crate::curve::{Curve, CurveRecord, Point};
use crate::error::{Error, Result};
use crate::ppm::Img;

/// How curves are assigned to the red, green and blue channels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Palette {
    /// Every curve goes into every channel, giving white lines on black.
    White,
    /// Curves go to red, green or blue depending on how high their trajectory climbs relative to
    /// the rest of the frame.
    ByPeak,
}

impl FromStr for Palette {
    type Err = Error;
    fn from_str(s: &str) -> Result<Palette> {
        match s {
            "white" => Ok(Palette::White),
            "peak" => Ok(Palette::ByPeak),
            other => Err(Error::UnknownPalette(other.to_string())),
        }
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Palette::White => write!(f, "white"),
            Palette::ByPeak => write!(f, "peak"),
        }
    }
}

/// Everything the renderer needs to know; nothing about an image lives outside of this.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConf {
    pub width: i64,
    pub height: i64,
    pub margin: i64,
    pub thread_count: usize,
    pub palette: Palette,
}

impl Default for RenderConf {
    fn default() -> RenderConf {
        RenderConf {
            width: 1920,
            height: 1080,
            margin: 20,
            thread_count: 3,
            palette: Palette::White,
        }
    }
}

impl fmt::Display for RenderConf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RenderConf{{
    width: {},
    height: {},
    margin: {},
    thread_count: {},
    palette: {}
}}",
            self.width, self.height, self.margin, self.thread_count, self.palette
        )
    }
}

/// Largest canvas `RenderConf::validate` accepts, in pixels per channel.
pub const MAX_PIXELS: i64 = 1 << 28;

impl RenderConf {
    pub fn validate(&self) -> Result<()> {
        if self.width < 1 {
            return Err(Error::InvalidParameter {
                name: "width",
                value: self.width as f64,
            });
        }
        if self.height < 1 {
            return Err(Error::InvalidParameter {
                name: "height",
                value: self.height as f64,
            });
        }
        match self.width.checked_mul(self.height) {
            Some(pixels) if pixels <= MAX_PIXELS => (),
            _ => {
                return Err(Error::InvalidParameter {
                    name: "width*height",
                    value: self.width as f64 * self.height as f64,
                })
            }
        }
        let too_wide = match self.margin.checked_mul(2) {
            Some(both) => both >= self.width || both >= self.height,
            None => true,
        };
        if self.margin < 0 || too_wide {
            return Err(Error::InvalidParameter {
                name: "margin",
                value: self.margin as f64,
            });
        }
        Ok(())
    }
}

/// Line width for a trajectory that climbs to `peak`: tall trajectories are drawn thinner.
pub fn line_width(peak: u64) -> f64 {
    1.5 + 1.0 / (peak as f64).powf(0.025)
}

pub fn opacity(peak: u64) -> f64 {
    0.005 + 0.8 / (peak as f64).sqrt()
}

/// How one curve is drawn.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CurveStyle {
    pub width: f64,
    pub opacity: f64,
    pub channels: [bool; 3],
}

/// Derives a `CurveStyle` for each curve from where its peak falls among all the curves of a frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Styler {
    palette: Palette,
    min_peak: u64,
    max_peak: u64,
}

impl Styler {
    pub fn new(curves: &[Curve], palette: Palette) -> Styler {
        let min_peak = curves.iter().map(|c| c.peak).min().unwrap_or(1);
        let max_peak = curves.iter().map(|c| c.peak).max().unwrap_or(1);
        Styler {
            palette,
            min_peak,
            max_peak,
        }
    }

    pub fn style(&self, curve: &Curve) -> CurveStyle {
        CurveStyle {
            width: line_width(curve.peak),
            opacity: opacity(curve.peak),
            channels: self.channels(curve.peak),
        }
    }

    fn channels(&self, peak: u64) -> [bool; 3] {
        if self.palette == Palette::White || self.min_peak == self.max_peak {
            return [true, true, true];
        }
        // Peaks spread over orders of magnitude, so bucket on a log scale.
        let lo = (self.min_peak as f64).ln();
        let span = (self.max_peak as f64).ln() - lo;
        let t = ((peak.max(1) as f64).ln() - lo) / span;
        if t > 0.40 {
            [true, false, false]
        } else if t > 0.10 {
            [false, true, false]
        } else {
            [false, false, true]
        }
    }
}

/// Axis-aligned box around a set of curves, in curve space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    /// The box around every finite point of `curves`, or None when there are no such points.
    pub fn of(curves: &[Curve]) -> Option<Bounds> {
        let mut points = curves
            .iter()
            .flat_map(|c| c.points.iter())
            .filter(|p| p.x.is_finite() && p.y.is_finite());
        let first = points.next()?;
        let mut b = Bounds {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        for p in points {
            b.min_x = b.min_x.min(p.x);
            b.max_x = b.max_x.max(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_y = b.max_y.max(p.y);
        }
        Some(b)
    }
}

/// Maps curve space onto the image, centred, keeping the aspect ratio and leaving `margin` pixels
/// clear on the tighter axis. Curve-space y grows upward, image y grows downward.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    center: Point,
    zoom: f64,
    width: i64,
    height: i64,
}

impl Viewport {
    pub fn fit(bounds: &Bounds, conf: &RenderConf) -> Viewport {
        let span_x = (bounds.max_x - bounds.min_x).max(1e-9);
        let span_y = (bounds.max_y - bounds.min_y).max(1e-9);
        let usable_w = (conf.width - 2 * conf.margin) as f64;
        let usable_h = (conf.height - 2 * conf.margin) as f64;
        Viewport {
            center: Point::new(
                (bounds.min_x + bounds.max_x) / 2.0,
                (bounds.min_y + bounds.max_y) / 2.0,
            ),
            zoom: (usable_w / span_x).min(usable_h / span_y),
            width: conf.width,
            height: conf.height,
        }
    }

    pub fn to_pixel(&self, p: Point) -> (f64, f64) {
        (
            self.width as f64 / 2.0 + (p.x - self.center.x) * self.zoom,
            self.height as f64 / 2.0 - (p.y - self.center.y) * self.zoom,
        )
    }
}

/// Three channel images that curves are drawn into.
#[derive(Clone, Debug, PartialEq)]
pub struct Canvas {
    imgs: [Img; 3],
}

impl Canvas {
    pub fn new(width: i64, height: i64) -> Canvas {
        Canvas {
            imgs: [
                Img::new(width, height),
                Img::new(width, height),
                Img::new(width, height),
            ],
        }
    }

    pub fn imgs(&self) -> &[Img; 3] {
        &self.imgs
    }

    pub fn absorb(&mut self, other: &Canvas) {
        for (img, o) in self.imgs.iter_mut().zip(other.imgs.iter()) {
            img.absorb(o);
        }
    }

    fn stamp(&mut self, x: i64, y: i64, side: i64, channels: [bool; 3]) {
        for dy in 0..side {
            for dx in 0..side {
                for (img, on) in self.imgs.iter_mut().zip(channels.iter()) {
                    if *on {
                        img.incr_px(x + dx, y + dy, 1);
                    }
                }
            }
        }
    }

    /// Draws every segment of `curve`, stepping one pixel at a time along the longer axis and
    /// stamping a square brush as wide as the style's line width.
    pub fn draw_curve(&mut self, curve: &Curve, view: &Viewport, style: &CurveStyle) {
        let side = max(1, style.width.round() as i64);
        for pair in curve.points.windows(2) {
            let (x0, y0) = view.to_pixel(pair[0]);
            let (x1, y1) = view.to_pixel(pair[1]);
            if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
                continue;
            }
            let (dx, dy) = (x1 - x0, y1 - y0);
            let steps = max(1, dx.abs().max(dy.abs()).ceil() as i64);
            // Skip the shared endpoint so joints are not stamped twice.
            for i in 0..steps {
                let t = i as f64 / steps as f64;
                let x = (x0 + dx * t).floor() as i64;
                let y = (y0 + dy * t).floor() as i64;
                self.stamp(x, y, side, style.channels);
            }
        }
        if let Some(last) = curve.points.last() {
            let (x, y) = view.to_pixel(*last);
            if x.is_finite() && y.is_finite() {
                self.stamp(x.floor() as i64, y.floor() as i64, side, style.channels);
            }
        }
    }
}

/// Renders every curve into one canvas on the calling thread.
pub fn render_curves(curves: &[Curve], conf: &RenderConf) -> Result<Canvas> {
    conf.validate()?;
    let mut canvas = Canvas::new(conf.width, conf.height);
    let bounds = match Bounds::of(curves) {
        Some(b) => b,
        None => return Ok(canvas),
    };
    let view = Viewport::fit(&bounds, conf);
    let styler = Styler::new(curves, conf.palette);
    for curve in curves {
        canvas.draw_curve(curve, &view, &styler.style(curve));
    }
    Ok(canvas)
}

/// Renders the curves on `conf.thread_count` worker threads. Each worker draws into a canvas of
/// its own and the canvases are summed at the end, so the result does not depend on which worker
/// drew which curve.
pub fn render_parallel(curves: Vec<Curve>, conf: &RenderConf) -> Result<Canvas> {
    conf.validate()?;
    if conf.thread_count <= 1 {
        return render_curves(&curves, conf);
    }
    let mut canvas = Canvas::new(conf.width, conf.height);
    let bounds = match Bounds::of(&curves) {
        Some(b) => b,
        None => return Ok(canvas),
    };
    let view = Viewport::fit(&bounds, conf);
    let styler = Styler::new(&curves, conf.palette);

    let (sender, receiver) = unbounded::<Curve>();
    let total = curves.len();
    for curve in curves {
        // The receiver is still alive, so this cannot fail.
        let _ = sender.send(curve);
    }
    drop(sender);

    let mut children = vec![];
    for idx in 0..conf.thread_count {
        let receiver = receiver.clone();
        let (width, height) = (conf.width, conf.height);
        children.push(thread::spawn(move || {
            let mut local = Canvas::new(width, height);
            let mut drawn = 0;
            for curve in receiver.iter() {
                local.draw_curve(&curve, &view, &styler.style(&curve));
                drawn += 1;
            }
            debug!(worker = idx, drawn, "render worker finished");
            local
        }));
    }
    absorb_workers(&mut canvas, children)?;
    debug!(curves = total, "frame rendered");
    Ok(canvas)
}

// Every handle is joined, even after a panic, so no worker outlives the frame.
fn absorb_workers(canvas: &mut Canvas, children: Vec<thread::JoinHandle<Canvas>>) -> Result<()> {
    let mut panicked = 0;
    for child in children {
        match child.join() {
            Ok(local) => canvas.absorb(&local),
            Err(_) => panicked += 1,
        }
    }
    if panicked > 0 {
        return Err(Error::WorkerPanic(panicked));
    }
    Ok(())
}

/// Reads newline-delimited curve records and groups their curves by frame, frames in ascending
/// order and curves in the order they arrived. Blank lines are ignored and curves with fewer than
/// two points are skipped with a warning.
pub fn group_frames<R: BufRead>(reader: R) -> Result<BTreeMap<u32, Vec<Curve>>> {
    let mut frames: BTreeMap<u32, Vec<Curve>> = BTreeMap::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim() == "" {
            continue;
        }
        let record: CurveRecord = serde_json::from_str(&line)?;
        if record.curve.points.len() < 2 {
            warn!("Skipping curve on line {} with fewer than two points", lineno + 1);
            continue;
        }
        frames.entry(record.frame).or_default().push(record.curve);
    }
    if frames.is_empty() {
        return Err(Error::NoCurves);
    }
    Ok(frames)
}

/// Where a frame's image goes: `output` as a `.png` when there is only one frame, otherwise
/// `<stem>_<frame>.png` with the frame number padded to four digits.
pub fn frame_path(output: &Path, frame: u32, frame_count: usize) -> PathBuf {
    if frame_count == 1 {
        return output.with_extension("png");
    }
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "collatz".to_string());
    output.with_file_name(format!("{}_{:04}.png", stem, frame))
}
