// SYNOID Video Veil Color Correction
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Keeps generated frames from drifting in color: the reference image's
// per-channel histograms are imposed on the generated image, then the
// generated image's own luminosity is restored.

use image::{Rgb, RgbImage};

const BINS: usize = 256;

/// Reference color statistics taken from one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorCorrection {
    cdfs: [[f64; BINS]; 3],
}

fn channel_cdfs(image: &RgbImage) -> [[f64; BINS]; 3] {
    let mut hist = [[0u64; BINS]; 3];
    for px in image.pixels() {
        for c in 0..3 {
            hist[c][px[c] as usize] += 1;
        }
    }
    let total = (image.width() as u64 * image.height() as u64).max(1) as f64;
    let mut cdfs = [[0.0; BINS]; 3];
    for c in 0..3 {
        let mut acc = 0u64;
        for v in 0..BINS {
            acc += hist[c][v];
            cdfs[c][v] = acc as f64 / total;
        }
    }
    cdfs
}

fn luma(r: f64, g: f64, b: f64) -> f64 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Shift `rgb` to luminosity `l`, pulling out-of-gamut results back in
/// along the gray axis.
fn set_luminosity(rgb: [f64; 3], l: f64) -> [f64; 3] {
    let d = l - luma(rgb[0], rgb[1], rgb[2]);
    let mut c = [rgb[0] + d, rgb[1] + d, rgb[2] + d];
    let lum = luma(c[0], c[1], c[2]);
    let n = c.iter().cloned().fold(f64::INFINITY, f64::min);
    let x = c.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if n < 0.0 && lum - n > f64::EPSILON {
        for v in c.iter_mut() {
            *v = lum + (*v - lum) * lum / (lum - n);
        }
    }
    if x > 255.0 && x - lum > f64::EPSILON {
        for v in c.iter_mut() {
            *v = lum + (*v - lum) * (255.0 - lum) / (x - lum);
        }
    }
    c
}

impl ColorCorrection {
    pub fn from_image(reference: &RgbImage) -> Self {
        Self {
            cdfs: channel_cdfs(reference),
        }
    }

    /// Per-channel lookup tables mapping `image` values onto the reference.
    fn lookup_tables(&self, image: &RgbImage) -> [[u8; BINS]; 3] {
        let source = channel_cdfs(image);
        let mut luts = [[0u8; BINS]; 3];
        for c in 0..3 {
            let reference = &self.cdfs[c];
            let mut r = 0usize;
            for v in 0..BINS {
                while r < BINS - 1 && reference[r] + 1e-12 < source[c][v] {
                    r += 1;
                }
                luts[c][v] = r as u8;
            }
        }
        luts
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let luts = self.lookup_tables(image);
        let mut out = RgbImage::new(image.width(), image.height());
        for (x, y, px) in image.enumerate_pixels() {
            let matched = [
                luts[0][px[0] as usize] as f64,
                luts[1][px[1] as usize] as f64,
                luts[2][px[2] as usize] as f64,
            ];
            let target = luma(px[0] as f64, px[1] as f64, px[2] as f64);
            let blended = set_luminosity(matched, target);
            out.put_pixel(
                x,
                y,
                Rgb([
                    blended[0].round().clamp(0.0, 255.0) as u8,
                    blended[1].round().clamp(0.0, 255.0) as u8,
                    blended[2].round().clamp(0.0, 255.0) as u8,
                ]),
            );
        }
        out
    }
}
