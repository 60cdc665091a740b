use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

use crate::config::PreprocessConfig;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Unsupported document container: {0}")]
    UnsupportedFormat(String),
    #[error("Image contains no pixels")]
    Empty,
}

/// Binarized, deskewed grayscale pixels ready for recognition.
/// Always has non-zero width and height.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster(GrayImage);

impl Raster {
    pub fn new(image: GrayImage) -> Result<Self, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::Empty);
        }
        Ok(Self(image))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    /// PNG encoding, for engines that only accept encoded images.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(self.0.clone())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        Ok(buf)
    }
}

/// Decode → grayscale → NL-means denoise → adaptive threshold → deskew.
/// The stage order is fixed.
pub fn preprocess(data: &[u8], cfg: &PreprocessConfig) -> Result<Raster, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    if data.starts_with(b"%PDF") {
        return Err(DecodeError::UnsupportedFormat("application/pdf".into()));
    }

    let img = image::load_from_memory(data)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError::Empty);
    }
    let img = limit_size(img, cfg.max_dimension);
    let rgb = img.to_rgb8();
    let gray: GrayImage = image::imageops::grayscale(&rgb);
    debug!(width = gray.width(), height = gray.height(), "decoded image");

    let denoised = denoise_nl_means(
        &gray,
        cfg.denoise_strength,
        cfg.denoise_template_window,
        cfg.denoise_search_window,
    );
    let binary = adaptive_threshold_gaussian(&denoised, cfg.threshold_block_size, cfg.threshold_c);
    let deskewed = deskew(binary, cfg.deskew_deadband_degrees);

    Raster::new(deskewed)
}

fn limit_size(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if max_dimension > 0 && (img.width() > max_dimension || img.height() > max_dimension) {
        img.resize(max_dimension, max_dimension, image::imageops::FilterType::Lanczos3)
    } else {
        img
    }
}

// ── Denoising ─────────────────────────────────────────────────────────────────

/// Non-local means. Patch distances for each search offset come from an
/// integral image of squared differences, so each pixel costs O(search²).
pub fn denoise_nl_means(
    image: &GrayImage,
    strength: f32,
    template_window: u32,
    search_window: u32,
) -> GrayImage {
    if strength <= 0.0 {
        return image.clone();
    }
    let (w, h) = (image.width() as i64, image.height() as i64);
    let ht = (template_window / 2) as i64;
    let hs = (search_window / 2) as i64;
    let pad = ht + hs;

    // Source with a replicated border wide enough for any patch at any offset.
    let pw = w + 2 * pad;
    let padded: Vec<f32> = (0..(h + 2 * pad))
        .flat_map(|py| {
            let sy = (py - pad).clamp(0, h - 1) as u32;
            (0..pw).map(move |px| {
                let sx = (px - pad).clamp(0, w - 1) as u32;
                image.get_pixel(sx, sy)[0] as f32
            })
        })
        .collect();
    let px = |x: i64, y: i64| padded[((y + pad) * pw + x + pad) as usize];

    // Squared differences are needed for every pixel plus a template
    // half-width margin.
    let rw = (w + 2 * ht) as usize;
    let rh = (h + 2 * ht) as usize;
    let stride = rw + 1;
    let mut integral = vec![0f64; stride * (rh + 1)];

    let patch_area = ((2 * ht + 1) * (2 * ht + 1)) as f64;
    let h2 = (strength as f64) * (strength as f64);

    let n = (w * h) as usize;
    let mut num = vec![0f64; n];
    let mut den = vec![0f64; n];

    for dy in -hs..=hs {
        for dx in -hs..=hs {
            for ry in 0..rh {
                let mut row_sum = 0f64;
                let y = ry as i64 - ht;
                for rx in 0..rw {
                    let x = rx as i64 - ht;
                    let d = px(x, y) - px(x + dx, y + dy);
                    row_sum += (d * d) as f64;
                    integral[(ry + 1) * stride + rx + 1] = integral[ry * stride + rx + 1] + row_sum;
                }
            }

            let span = (2 * ht) as usize + 1;
            for y in 0..h {
                for x in 0..w {
                    // Patch centred at (x, y) covers region cells [x, x + span).
                    let (x0, y0) = (x as usize, y as usize);
                    let (x1, y1) = (x0 + span, y0 + span);
                    let sum = integral[y1 * stride + x1] - integral[y0 * stride + x1]
                        - integral[y1 * stride + x0]
                        + integral[y0 * stride + x0];
                    let dist = (sum / patch_area).max(0.0);
                    let weight = (-dist / h2).exp();
                    let i = (y * w + x) as usize;
                    num[i] += weight * px(x + dx, y + dy) as f64;
                    den[i] += weight;
                }
            }
        }
    }

    ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
        let i = (y as i64 * w + x as i64) as usize;
        let v = if den[i] > 0.0 { num[i] / den[i] } else { px(x as i64, y as i64) as f64 };
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

// ── Thresholding ──────────────────────────────────────────────────────────────

/// Locally-windowed binarization: a pixel is white when it is brighter than
/// its Gaussian-weighted neighbourhood mean minus `c`.
pub fn adaptive_threshold_gaussian(image: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let block = if block_size % 2 == 0 { block_size + 1 } else { block_size }.max(3);
    let mean = gaussian_blur_replicate(image, block);

    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let src = image.get_pixel(x, y)[0] as i32;
        let local = mean.get_pixel(x, y)[0] as i32;
        Luma([if src > local - c { 255 } else { 0 }])
    })
}

fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= total;
    }
    kernel
}

fn gaussian_blur_replicate(image: &GrayImage, size: u32) -> GrayImage {
    let kernel = gaussian_kernel(size);
    let half = (size / 2) as i64;
    let (w, h) = (image.width() as i64, image.height() as i64);

    let mut horizontal = vec![0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x + k as i64 - half).clamp(0, w - 1);
                acc += weight * image.get_pixel(sx as u32, y as u32)[0] as f32;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
        let mut acc = 0f32;
        for (k, weight) in kernel.iter().enumerate() {
            let sy = (y as i64 + k as i64 - half).clamp(0, h - 1);
            acc += weight * horizontal[(sy * w + x as i64) as usize];
        }
        Luma([acc.round().clamp(0.0, 255.0) as u8])
    })
}

// ── Deskew ────────────────────────────────────────────────────────────────────

/// Skew of the minimum-area rectangle around all non-zero pixels, in degrees,
/// normalized into (-45, 45]. `None` when the image has no foreground.
pub fn skew_angle(image: &GrayImage) -> Option<f32> {
    // The convex hull only depends on the extreme foreground pixel of each row.
    let mut points: Vec<Point<i32>> = Vec::new();
    for y in 0..image.height() {
        let mut first = None;
        let mut last = 0u32;
        for x in 0..image.width() {
            if image.get_pixel(x, y)[0] > 0 {
                if first.is_none() {
                    first = Some(x);
                }
                last = x;
            }
        }
        if let Some(first) = first {
            points.push(Point::new(first as i32, y as i32));
            if last != first {
                points.push(Point::new(last as i32, y as i32));
            }
        }
    }
    if points.is_empty() {
        return None;
    }

    let hull = convex_hull(&points[..]);
    Some(normalize_angle(min_area_rect_angle(&hull)))
}

/// Edge angle (degrees) of the minimum-area enclosing rectangle, by rotating
/// calipers over the hull edges.
fn min_area_rect_angle(hull: &[Point<i32>]) -> f32 {
    if hull.len() < 2 {
        return 0.0;
    }
    let pts: Vec<(f64, f64)> = hull.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let n = pts.len();

    let mut best_area = f64::MAX;
    let mut best_angle = 0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        let (ex, ey) = (pts[j].0 - pts[i].0, pts[j].1 - pts[i].1);
        let len = (ex * ex + ey * ey).sqrt();
        if len < f64::EPSILON {
            continue;
        }
        let (nx, ny) = (ex / len, ey / len);
        let (mut min_n, mut max_n, mut min_p, mut max_p) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for &(x, y) in &pts {
            let (rx, ry) = (x - pts[i].0, y - pts[i].1);
            let along = nx * rx + ny * ry;
            let across = -ny * rx + nx * ry;
            min_n = min_n.min(along);
            max_n = max_n.max(along);
            min_p = min_p.min(across);
            max_p = max_p.max(across);
        }
        let area = (max_n - min_n) * (max_p - min_p);
        if area < best_area {
            best_area = area;
            best_angle = ny.atan2(nx).to_degrees();
        }
    }
    best_angle as f32
}

/// A rectangle's orientation is only defined modulo 90°; fold into (-45, 45].
fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % 90.0;
    if a <= -45.0 {
        a += 90.0;
    } else if a > 45.0 {
        a -= 90.0;
    }
    a
}

/// Rotate the image so the detected skew is removed. Angles within the
/// deadband, and images without foreground, are returned untouched.
pub fn deskew(image: GrayImage, deadband_degrees: f32) -> GrayImage {
    let Some(angle) = skew_angle(&image) else {
        debug!("no foreground pixels, skipping deskew");
        return image;
    };
    if angle.abs() <= deadband_degrees {
        return image;
    }
    debug!(angle, "deskewing");
    rotate_bicubic_replicate(&image, angle)
}

/// Rotate by `-angle_degrees` about the centre, sampling with bicubic
/// interpolation and clamping out-of-range samples to the nearest edge.
fn rotate_bicubic_replicate(image: &GrayImage, angle_degrees: f32) -> GrayImage {
    let (w, h) = (image.width(), image.height());
    let theta = (angle_degrees as f64).to_radians();
    let (sin, cos) = theta.sin_cos();
    let cx = (w / 2) as f64;
    let cy = (h / 2) as f64;

    ImageBuffer::from_fn(w, h, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        let sx = cx + cos * dx - sin * dy;
        let sy = cy + sin * dx + cos * dy;
        Luma([sample_bicubic(image, sx, sy)])
    })
}

fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.75;
    let t = t.abs();
    if t <= 1.0 {
        (A + 2.0) * t * t * t - (A + 3.0) * t * t + 1.0
    } else if t < 2.0 {
        A * t * t * t - 5.0 * A * t * t + 8.0 * A * t - 4.0 * A
    } else {
        0.0
    }
}

fn sample_bicubic(image: &GrayImage, sx: f64, sy: f64) -> u8 {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f64;
    let fy = sy - y0 as f64;

    let mut acc = 0f64;
    for j in -1..=2i64 {
        let wy = cubic_weight(j as f64 - fy);
        let py = (y0 + j).clamp(0, h - 1) as u32;
        for i in -1..=2i64 {
            let wx = cubic_weight(i as f64 - fx);
            let px = (x0 + i).clamp(0, w - 1) as u32;
            acc += wx * wy * image.get_pixel(px, py)[0] as f64;
        }
    }
    acc.round().clamp(0.0, 255.0) as u8
}
