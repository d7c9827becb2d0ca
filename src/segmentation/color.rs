use image::{GrayImage, RgbImage};

/// 8-bit HSV with hue on the half-degree scale (0..=180), saturation and
/// value on 0..=255.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [
        (h / 2.0).round().min(180.0) as u8,
        s.round() as u8,
        max as u8,
    ]
}

/// Inclusive HSV box used to pick the tracked object's color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub low: [u8; 3],
    pub high: [u8; 3],
}

impl HsvRange {
    pub fn new(low: [u8; 3], high: [u8; 3]) -> Self {
        Self { low, high }
    }

    /// Inclusive on both bounds, per channel.
    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.low[c] <= hsv[c] && hsv[c] <= self.high[c])
    }

    /// 255 where the pixel's HSV value falls inside the range.
    pub fn mask(&self, frame: &RgbImage) -> GrayImage {
        let mut out = GrayImage::new(frame.width(), frame.height());
        for (px, o) in frame.pixels().zip(out.iter_mut()) {
            if self.contains(rgb_to_hsv(px[0], px[1], px[2])) {
                *o = 255;
            }
        }
        out
    }
}
