//! Pixel heuristics used by the built-in analyzer.

use image::imageops::{self, FilterType};
use image::RgbImage;
use sieve_core::analysis::round_to;

/// Longest side after downscaling.
pub const MAX_DIMENSION: u32 = 1280;

/// Skin-tone window in OpenCV HSV units (H: 0..=180, S/V: 0..=255).
const SKIN_HUE_MAX: f64 = 20.0;
const SKIN_SAT_MIN: f64 = 20.0;
const SKIN_VAL_MIN: f64 = 70.0;

/// Downscale so the longest side is at most [`MAX_DIMENSION`], keeping the
/// aspect ratio. Smaller images are returned unchanged.
pub fn downscale(image: RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if longest <= MAX_DIMENSION {
        return image;
    }
    let scale = MAX_DIMENSION as f64 / longest as f64;
    let nw = ((w as f64 * scale) as u32).max(1);
    let nh = ((h as f64 * scale) as u32).max(1);
    imageops::resize(&image, nw, nh, FilterType::Triangle)
}

/// OpenCV-style HSV conversion: hue in `0..180`, saturation and value in
/// `0..=255`.
fn to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h_deg = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h_deg = if h_deg < 0.0 { h_deg + 360.0 } else { h_deg };
    (h_deg / 2.0, s, v)
}

/// Fraction of pixels falling inside the skin-tone window.
pub fn skin_ratio(image: &RgbImage) -> f64 {
    let total = image.width() as u64 * image.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let skin = image
        .pixels()
        .filter(|p| {
            let (h, s, v) = to_hsv(p[0], p[1], p[2]);
            h <= SKIN_HUE_MAX && s >= SKIN_SAT_MIN && v >= SKIN_VAL_MIN
        })
        .count() as u64;
    skin as f64 / total as f64
}

/// Variance of the 4-neighbour Laplacian over the 8-bit grayscale image.
///
/// Every pixel contributes. Neighbours past the edge are mirrored without
/// repeating the edge pixel (`dcb|abcd|cba`), matching OpenCV's default
/// `BORDER_REFLECT_101`.
pub fn laplacian_variance(image: &RgbImage) -> f64 {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }

    let gray: Vec<f64> = image
        .pixels()
        .map(|p| (0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64).round())
        .collect();
    let at = |x: i64, y: i64| {
        let x = reflect_101(x, w as i64);
        let y = reflect_101(y, h as i64);
        gray[(y * w as i64 + x) as usize]
    };

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let lap = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }
    let n = (w as u64 * h as u64) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

fn reflect_101(i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    if i < 0 {
        -i
    } else if i >= len {
        2 * len - 2 - i
    } else {
        i
    }
}

/// Combine sharpness and resolution into a score in `0.0..=1.0`.
pub fn quality_score(blur: f64, width: u32, height: u32) -> f64 {
    let resolution = width.min(height) as f64 / 1000.0;
    round_to((blur / 100.0 + resolution).min(1.0), 2)
}
