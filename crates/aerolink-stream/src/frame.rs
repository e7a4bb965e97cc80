//! Raw capture buffer → JPEG conversion.
//!
//! The simulator reports `(width, height, data)` but the buffer does not
//! always match: lagging captures come back empty, truncated, or padded.
//! The buffer is admitted under exactly three layouts, selected by length
//! against `height * width * {4, 3, 1}` — four-channel color, three-channel
//! color, or single-channel greyscale. Everything else is a decode failure.

use aerolink_rpc::RawImage;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Normalize `raw` to 3-channel color and encode it as JPEG.
///
/// Returns `None` on empty/undersized buffers, unrecognized sizes, or
/// encode failure. Never panics.
pub fn encode_jpeg(raw: &RawImage) -> Option<Vec<u8>> {
    let rgb = normalize_rgb(raw)?;
    let mut out = Cursor::new(Vec::new());
    match DynamicImage::ImageRgb8(rgb).write_to(&mut out, ImageFormat::Jpeg) {
        Ok(()) => Some(out.into_inner()),
        Err(e) => {
            debug!(error = %e, "JPEG encode failed");
            None
        }
    }
}

/// Classify the buffer layout by length and widen it to RGB8.
fn normalize_rgb(raw: &RawImage) -> Option<RgbImage> {
    let (w, h) = (raw.width, raw.height);
    if w == 0 || h == 0 {
        return None;
    }
    let pixels = (w as usize) * (h as usize);

    let rgb_bytes: Vec<u8> = if raw.data.len() == pixels * 4 {
        // Four-channel color: drop the alpha plane.
        raw.data
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    } else if raw.data.len() == pixels * 3 {
        raw.data.clone()
    } else if raw.data.len() == pixels {
        // Greyscale: replicate the single channel.
        raw.data.iter().flat_map(|&v| [v, v, v]).collect()
    } else {
        debug!(
            len = raw.data.len(),
            width = w,
            height = h,
            "capture buffer length matches no admissible layout"
        );
        return None;
    };

    RgbImage::from_raw(w, h, rgb_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(w: u32, h: u32, len: usize) -> RawImage {
        RawImage {
            width: w,
            height: h,
            data: vec![0x40; len],
        }
    }

    #[test]
    fn four_channel_buffer_encodes() {
        let jpeg = encode_jpeg(&raw(8, 6, 8 * 6 * 4)).expect("RGBA layout must encode");
        let decoded = image::load_from_memory(&jpeg).expect("output must be a decodable JPEG");
        assert_eq!(decoded.width(), 8);
        assert_eq!(decoded.height(), 6);
    }

    #[test]
    fn three_channel_buffer_encodes() {
        assert!(encode_jpeg(&raw(8, 6, 8 * 6 * 3)).is_some());
    }

    #[test]
    fn greyscale_buffer_encodes() {
        let jpeg = encode_jpeg(&raw(8, 6, 8 * 6)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 8);
    }

    #[test]
    fn unrecognized_lengths_are_rejected() {
        for len in [0, 1, 8 * 6 * 2, 8 * 6 * 4 - 1, 8 * 6 * 4 + 1, 8 * 6 * 5] {
            assert!(
                encode_jpeg(&raw(8, 6, len)).is_none(),
                "length {len} must be rejected"
            );
        }
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(encode_jpeg(&raw(0, 6, 0)).is_none());
        assert!(encode_jpeg(&raw(8, 0, 0)).is_none());
    }

    #[test]
    fn alpha_plane_is_dropped_not_blended() {
        // One red RGBA pixel with a garbage alpha value.
        let image = RawImage {
            width: 1,
            height: 1,
            data: vec![200, 10, 10, 7],
        };
        let jpeg = encode_jpeg(&image).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        let px = decoded.get_pixel(0, 0);
        // JPEG is lossy; the pixel must still be unmistakably red.
        assert!(px[0] > 150 && px[1] < 80 && px[2] < 80, "pixel was {px:?}");
    }
}
