//! Alpha-only post effects: edge softening and solid background compositing

use crate::config::{BackgroundColor, MAX_SOFTEN_RADIUS};
use crate::types::{RasterImage, CHANNELS};
use image::{imageops, GrayImage};

/// Blur the alpha channel with a Gaussian of standard deviation `radius`
///
/// RGB is untouched. A zero, negative, subnormal or non-finite radius
/// returns an identical copy. Radii above [`MAX_SOFTEN_RADIUS`] are
/// clamped to it. Output is deterministic.
#[must_use]
pub fn soften_edges(image: &RasterImage, radius: f32) -> RasterImage {
    if !radius.is_normal() || radius < 0.0 {
        return image.clone();
    }

    let Some(alpha) = GrayImage::from_raw(image.width(), image.height(), image.alpha_channel())
    else {
        return image.clone();
    };
    let blurred = imageops::blur(&alpha, radius.min(MAX_SOFTEN_RADIUS));

    let mut output = image.clone();
    for (px, a) in output
        .as_bytes_mut()
        .chunks_exact_mut(CHANNELS)
        .zip(blurred.into_raw())
    {
        px[3] = a;
    }
    output
}

/// Blend `image` over an opaque solid colour; the result is fully opaque
#[must_use]
pub fn composite_over(image: &RasterImage, color: BackgroundColor) -> RasterImage {
    let background = [color.r, color.g, color.b];
    let mut output = image.clone();
    for px in output.as_bytes_mut().chunks_exact_mut(CHANNELS) {
        let alpha = u32::from(px[3]);
        for (channel, bg) in px.iter_mut().zip(background) {
            let blended = u32::from(*channel) * alpha + u32::from(bg) * (255 - alpha);
            *channel = ((blended + 127) / 255) as u8;
        }
        px[3] = u8::MAX;
    }
    output
}
