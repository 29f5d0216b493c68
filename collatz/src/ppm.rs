use std::cmp::max;
use std::f64::consts;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// The Img struct is the simplest possible implementation of an image: a two dimensional array of
/// pixels, each pixel represented only as a single integer counting how much ink landed on it.
/// Three Img structs together make an RGB image, one per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Img {
    width: i64,
    height: i64,
    maximum: i64,
    pixels: Vec<i64>,
}

// This fexp scaling function is taken from here: https://www.brodie-tyrrell.org/bbrot/
pub fn fexp(x: f64, factor: f64) -> f64 {
    1.0 - (consts::E.powf(-factor * x))
}

impl Img {
    pub fn new(w: i64, h: i64) -> Img {
        Img {
            width: w,
            height: h,
            maximum: 1,
            pixels: vec![0; (w * h) as usize],
        }
    }
    pub fn maximum(&self) -> i64 {
        self.maximum
    }
    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return None;
        }
        Some(((self.width * y) + x) as usize)
    }
    pub fn px(&self, x: i64, y: i64) -> i64 {
        self.index(x, y).map(|i| self.pixels[i]).unwrap_or(0)
    }
    /// Adds `amount` to a pixel; pixels off the edge of the image are ignored.
    pub fn incr_px(&mut self, x: i64, y: i64, amount: i64) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] += amount;
            self.maximum = max(self.maximum, self.pixels[i]);
        }
    }
    /// Pixel-wise sum of another image of the same size into this one.
    pub fn absorb(&mut self, other: &Img) {
        for (px, o) in self.pixels.iter_mut().zip(other.pixels.iter()) {
            *px += *o;
            self.maximum = max(self.maximum, *px);
        }
    }
    /// Returns the pixel specified scaled to a u8 by passing the raw value of the pixel and the
    /// maximum value to delegate. `delegate` must return a value between 0.0 and 1.0, inclusive.
    pub fn scaled_pix_delegate<F>(&self, x: i64, y: i64, mx: i64, delegate: F) -> u8
    where
        F: Fn(f64, f64) -> f64,
    {
        let val = self.px(x, y) as f64;
        (delegate(val, mx as f64).max(0.0).min(1.0) * 255.0) as u8
    }
}

fn brightest(imgs: &[Img; 3]) -> i64 {
    max(imgs[0].maximum, max(imgs[1].maximum, imgs[2].maximum))
}

// write_ppm writes a plain PPM from the three channel images, unscaled.
pub fn write_ppm(imgs: &[Img; 3], fname: &Path) -> Result<()> {
    let mut ppm = BufWriter::new(File::create(fname)?);

    writeln!(ppm, "P3\n# Created by collatz-render")?;
    writeln!(ppm, "{} {}", imgs[0].width, imgs[0].height)?;
    writeln!(ppm, "{}", brightest(imgs))?;
    for pidx in 0..imgs[0].pixels.len() {
        writeln!(
            ppm,
            "{} {} {}",
            imgs[0].pixels[pidx], imgs[1].pixels[pidx], imgs[2].pixels[pidx]
        )?;
    }
    ppm.flush()?;
    Ok(())
}

/// Writes the channel images as an 8-bit PNG, with every channel scaled by `scale_func` against
/// the brightest pixel of all three channels so their relative brightness survives.
pub fn write_scaled_png<F>(imgs: &[Img; 3], fname: &Path, scale_func: F) -> Result<()>
where
    F: Fn(f64, f64) -> f64,
{
    let mx = brightest(imgs);
    let mut imgbuf =
        image::ImageBuffer::<image::Rgb<u8>, Vec<u8>>::new(imgs[0].width as u32, imgs[0].height as u32);
    for (x, y, pixel) in imgbuf.enumerate_pixels_mut() {
        let r = imgs[0].scaled_pix_delegate(x as i64, y as i64, mx, &scale_func);
        let g = imgs[1].scaled_pix_delegate(x as i64, y as i64, mx, &scale_func);
        let b = imgs[2].scaled_pix_delegate(x as i64, y as i64, mx, &scale_func);

        *pixel = image::Rgb([r, g, b]);
    }
    imgbuf.save(fname)?;
    Ok(())
}

pub fn write_png(imgs: &[Img; 3], fname: &Path) -> Result<()> {
    write_scaled_png(imgs, fname, |val, mx| val / mx)
}
