use crate::ax::ScreenRegion;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SenderLabel {
    Me,
    Other,
    Unknown,
}

impl SenderLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SenderLabel::Me => "ME",
            SenderLabel::Other => "OTHER",
            SenderLabel::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SenderLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Geometry is in screen points and scaled to image pixels before sampling.
const BAND_MAX_HEIGHT: f64 = 40.0;
const EDGE_MARGIN: f64 = 5.0;
const SAMPLE_MAX_WIDTH: f64 = 100.0;

const DARK_FLOOR: f64 = 20.0;
const BRIGHT_FLOOR: f64 = 40.0;
const CHROMA_MIN: u8 = 10;

const MIN_SIGNAL_PIXELS: f64 = 10.0;
const MIN_SIGNAL_FRACTION: f64 = 0.01;
const DOMINANCE_RATIO: f64 = 1.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BandSample {
    colored: u32,
    total: u32,
}

/// Guesses who sent a message from which edge of its row carries bubble fill.
///
/// `image` is a capture of `list`; `message` is the row's bounds in the same
/// screen coordinates. A capture taken at a backing scale factor (Retina) is
/// handled by deriving the scale from image size over region size.
pub fn classify_sender(image: &RgbImage, list: ScreenRegion, message: ScreenRegion) -> SenderLabel {
    if list.is_empty() || message.is_empty() || image.width() == 0 || image.height() == 0 {
        return SenderLabel::Unknown;
    }
    let scale_x = f64::from(image.width()) / list.width;
    let scale_y = f64::from(image.height()) / list.height;

    let rel_x = message.x - list.x;
    let rel_y = message.y - list.y;

    let band_height = BAND_MAX_HEIGHT.min(message.height);
    let center_y = rel_y + message.height / 2.0;
    let top = (center_y - band_height / 2.0) * scale_y;
    let bottom = top + band_height * scale_y;

    let sample_width = SAMPLE_MAX_WIDTH.min(message.width / 3.0);
    let left_x0 = rel_x + EDGE_MARGIN;
    let left_x1 = left_x0 + sample_width;
    let right_x1 = rel_x + message.width - EDGE_MARGIN;
    let right_x0 = right_x1 - sample_width;

    let left = count_colored_pixels(image, left_x0 * scale_x, top, left_x1 * scale_x, bottom);
    let right = count_colored_pixels(image, right_x0 * scale_x, top, right_x1 * scale_x, bottom);
    decide(left, right)
}

fn decide(left: BandSample, right: BandSample) -> SenderLabel {
    let avg_area = f64::from(left.total + right.total) / 2.0;
    let min_signal = MIN_SIGNAL_PIXELS.max(avg_area * MIN_SIGNAL_FRACTION);
    let left_colored = f64::from(left.colored);
    let right_colored = f64::from(right.colored);

    if left_colored < min_signal && right_colored < min_signal {
        return SenderLabel::Unknown;
    }
    if right_colored >= left_colored * DOMINANCE_RATIO {
        return SenderLabel::Me;
    }
    if left_colored >= right_colored * DOMINANCE_RATIO {
        return SenderLabel::Other;
    }
    SenderLabel::Unknown
}

fn count_colored_pixels(image: &RgbImage, x0: f64, y0: f64, x1: f64, y1: f64) -> BandSample {
    let left = x0.max(0.0) as u32;
    let top = y0.max(0.0) as u32;
    let right = (x1.max(0.0) as u32).min(image.width());
    let bottom = (y1.max(0.0) as u32).min(image.height());
    if right <= left || bottom <= top {
        return BandSample::default();
    }

    let mut colored = 0u32;
    for y in top..bottom {
        for x in left..right {
            if is_colored(image.get_pixel(x, y).0) {
                colored += 1;
            }
        }
    }
    BandSample {
        colored,
        total: (right - left) * (bottom - top),
    }
}

// Drops near-black background; keeps bright or saturated bubble fill.
fn is_colored([r, g, b]: [u8; 3]) -> bool {
    let brightness = (f64::from(r) + f64::from(g) + f64::from(b)) / 3.0;
    if brightness < DARK_FLOOR {
        return false;
    }
    let chroma = r.max(g).max(b) - r.min(g).min(b);
    brightness > BRIGHT_FLOOR || chroma > CHROMA_MIN
}
