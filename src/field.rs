//! Per-pixel scalar passes over a source frame: luminance, Gaussian
//! smoothing and Sobel edge strength.
//!
//! Every pass takes an immutable [`ScalarField`] and returns a freshly
//! allocated one of the same dimensions.

use image::RgbaImage;

const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Binomial weights; the 5x5 kernel is their outer product.
const GAUSS_1D: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
const GAUSS_NORM: f32 = 256.0;

/// Upper bound of a normalized edge field.
pub const EDGE_MAX: f32 = 255.0;

/// Peak gradients below this are float residue from the blur, not edges.
const FLAT_EPSILON: f32 = 1e-3;

/// A rectangular buffer of `f32` samples, one per source pixel, stored
/// row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl ScalarField {
    /// Zero-filled field.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    /// Wraps an existing row-major buffer. Returns `None` if the length does
    /// not match the dimensions.
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[self.index(x, y)]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Largest sample, or 0 for an empty field.
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }

    /// `(min, max)` of the samples, or `None` for an empty field.
    pub fn range(&self) -> Option<(f32, f32)> {
        let mut it = self.data.iter().copied();
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Perceptual luma of one pixel, alpha ignored.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32
}

/// Brightness map of a frame.
pub fn luminance(frame: &RgbaImage) -> ScalarField {
    let (width, height) = frame.dimensions();
    let data = frame.pixels().map(|px| luma(px[0], px[1], px[2])).collect();
    ScalarField { width, height, data }
}

/// 5x5 Gaussian blur. The two-pixel border keeps its input values, so the
/// output range stays inside the input range.
pub fn smooth(field: &ScalarField) -> ScalarField {
    let (w, h) = (field.width as usize, field.height as usize);
    let mut out = field.clone();
    if w < 5 || h < 5 {
        return out;
    }

    let src = &field.data;
    for y in 2..h - 2 {
        for x in 2..w - 2 {
            let mut acc = 0.0;
            for (ky, wy) in GAUSS_1D.iter().enumerate() {
                let row = (y + ky - 2) * w;
                for (kx, wx) in GAUSS_1D.iter().enumerate() {
                    acc += wy * wx * src[row + x + kx - 2];
                }
            }
            out.data[y * w + x] = acc / GAUSS_NORM;
        }
    }
    out
}

/// Raw Sobel gradient magnitude. The one-pixel border stays at zero.
pub fn sobel_magnitude(field: &ScalarField) -> ScalarField {
    let (w, h) = (field.width as usize, field.height as usize);
    let mut out = ScalarField::zeros(field.width, field.height);
    if w < 3 || h < 3 {
        return out;
    }

    let v = &field.data;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let a = v[(y - 1) * w + (x - 1)];
            let b = v[(y - 1) * w + x];
            let c = v[(y - 1) * w + (x + 1)];
            let d = v[y * w + (x - 1)];
            let f = v[y * w + (x + 1)];
            let g = v[(y + 1) * w + (x - 1)];
            let hh = v[(y + 1) * w + x];
            let i = v[(y + 1) * w + (x + 1)];

            let gx = -a + c - 2.0 * d + 2.0 * f - g + i;
            let gy = -a - 2.0 * b - c + g + 2.0 * hh + i;
            out.data[y * w + x] = (gx * gx + gy * gy).sqrt();
        }
    }
    out
}

/// Sobel magnitude rescaled so the strongest edge in the frame is 255.
/// A flat frame yields an all-zero field.
pub fn edge_strength(smoothed: &ScalarField) -> ScalarField {
    let mut magnitude = sobel_magnitude(smoothed);
    let max = magnitude.max();
    if max < FLAT_EPSILON {
        return ScalarField::zeros(magnitude.width, magnitude.height);
    }
    let scale = EDGE_MAX / max;
    for v in &mut magnitude.data {
        *v *= scale;
    }
    magnitude
}
