use image::{DynamicImage, GenericImageView, GrayImage};
use serde::Serialize;

const MIN_SIDE_PX: u32 = 320;
const MIN_CONTRAST: f32 = 0.2;
const MAX_BUSY_SCORE: f32 = 0.35;
const ANALYSIS_SIDE_PX: u32 = 512;
const EDGE_STRENGTH: i32 = 64;

/// Cheap image quality signals gathered before recognition. Findings are
/// warnings only; nothing here stops a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecheckReport {
    pub width: u32,
    pub height: u32,
    pub contrast: f32,
    pub busy_score: f32,
    pub warnings: Vec<String>,
}

pub fn preflight(bytes: &[u8]) -> PrecheckReport {
    let image = match image::load_from_memory(bytes) {
        Ok(image) => image,
        Err(err) => {
            return PrecheckReport {
                width: 0,
                height: 0,
                contrast: 0.0,
                busy_score: 0.0,
                warnings: vec![format!("could not decode image for precheck: {}", err)],
            };
        }
    };
    let (width, height) = image.dimensions();
    let gray = analysis_luma(image);
    let contrast = luminance_spread(&gray);
    let busy_score = edge_density(&gray);

    let mut warnings = Vec::new();
    if width.min(height) < MIN_SIDE_PX {
        warnings.push(format!(
            "image is small ({}x{}); text recognition may be unreliable",
            width, height
        ));
    }
    if contrast < MIN_CONTRAST {
        warnings.push(format!("low contrast ({:.2}); text may be hard to read", contrast));
    }
    if busy_score > MAX_BUSY_SCORE {
        warnings.push(format!(
            "busy background ({:.2}); overlaid copy may need a backing panel",
            busy_score
        ));
    }

    PrecheckReport {
        width,
        height,
        contrast,
        busy_score,
        warnings,
    }
}

fn analysis_luma(image: DynamicImage) -> GrayImage {
    let (width, height) = image.dimensions();
    if width.max(height) > ANALYSIS_SIDE_PX {
        image
            .thumbnail(ANALYSIS_SIDE_PX, ANALYSIS_SIDE_PX)
            .to_luma8()
    } else {
        image.to_luma8()
    }
}

/// Spread between the 5th and 95th luminance percentiles, in [0, 1].
fn luminance_spread(gray: &GrayImage) -> f32 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let percentile = |fraction: f64| {
        let target = (total as f64 * fraction).ceil().max(1.0) as u64;
        let mut seen = 0u64;
        for (value, count) in histogram.iter().enumerate() {
            seen += count;
            if seen >= target {
                return value as f32;
            }
        }
        255.0
    };
    (percentile(0.95) - percentile(0.05)) / 255.0
}

/// Fraction of interior pixels with a strong central-difference gradient.
fn edge_density(gray: &GrayImage) -> f32 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }
    let at = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as i32;
    let mut strong = 0u64;
    let mut total = 0u64;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = at(x + 1, y) - at(x - 1, y);
            let gy = at(x, y + 1) - at(x, y - 1);
            if gx.abs() + gy.abs() > EDGE_STRENGTH {
                strong += 1;
            }
            total += 1;
        }
    }
    strong as f32 / total.max(1) as f32
}
