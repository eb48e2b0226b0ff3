//! Mapping on-screen selections to source-image pixels.
//!
//! The operator draws a rectangle over a scaled preview of the captured
//! frame. [`CropTransform`] converts that rectangle into the frame's own
//! pixel space and cuts the region out.

use crate::camera::{Frame, Resolution};

/// Rendered size of the element showing the captured frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Rectangle in on-screen pixels of the rendered preview.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Rectangle in the native pixel space of a captured frame.
///
/// Only produced by [`CropTransform::to_native`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NativeRect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Errors from mapping or extracting a crop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CropError {
    #[error("Please select a region with a non-zero width and height")]
    Degenerate,

    #[error("Selection has negative or non-finite dimensions")]
    InvalidRect,

    #[error("Preview has no rendered size yet ({width}x{height})")]
    InvalidDisplay { width: f64, height: f64 },

    #[error("Selection lies outside the captured image")]
    OutOfBounds,

    #[error("Captured frame is corrupt")]
    BadFrame,
}

/// Scale factors between a rendered preview and its native frame.
///
/// Build one at submission time from the preview's current rendered size;
/// layout can reflow between drawing the rectangle and submitting it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropTransform {
    scale_x: f64,
    scale_y: f64,
    native: Resolution,
}

impl CropTransform {
    /// # Errors
    /// `CropError::InvalidDisplay` if the display has no positive finite size.
    pub fn new(display: DisplaySize, native: Resolution) -> Result<Self, CropError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(display.width) || !valid(display.height) || native.width == 0 || native.height == 0
        {
            return Err(CropError::InvalidDisplay {
                width: display.width,
                height: display.height,
            });
        }
        Ok(Self {
            scale_x: f64::from(native.width) / display.width,
            scale_y: f64::from(native.height) / display.height,
            native,
        })
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    /// Map a display rectangle into native pixels.
    ///
    /// The result is clamped to the frame bounds so a drag that overshoots
    /// the preview edge still selects pixels inside the image.
    ///
    /// # Errors
    /// * `CropError::InvalidRect` - negative or non-finite input
    /// * `CropError::Degenerate` - zero width or height after scaling
    /// * `CropError::OutOfBounds` - rectangle entirely outside the frame
    pub fn to_native(&self, rect: DisplayRect) -> Result<NativeRect, CropError> {
        let fields = [rect.x, rect.y, rect.width, rect.height];
        if fields.iter().any(|v| !v.is_finite()) || rect.width < 0.0 || rect.height < 0.0 {
            return Err(CropError::InvalidRect);
        }

        let width = rect.width * self.scale_x;
        let height = rect.height * self.scale_y;
        if width == 0.0 || height == 0.0 {
            return Err(CropError::Degenerate);
        }

        let nat_w = f64::from(self.native.width);
        let nat_h = f64::from(self.native.height);
        let x0 = (rect.x * self.scale_x).clamp(0.0, nat_w);
        let y0 = (rect.y * self.scale_y).clamp(0.0, nat_h);
        let x1 = (rect.x * self.scale_x + width).clamp(0.0, nat_w);
        let y1 = (rect.y * self.scale_y + height).clamp(0.0, nat_h);

        if x1 <= x0 || y1 <= y0 {
            return Err(CropError::OutOfBounds);
        }

        Ok(NativeRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Copy the `rect` region of `frame` into a new frame of that size.
///
/// Fractional edges are rounded to the nearest pixel.
pub fn extract(frame: &Frame, rect: NativeRect) -> Result<Frame, CropError> {
    if !frame.is_valid() {
        return Err(CropError::BadFrame);
    }

    let x0 = (rect.x.round() as u32).min(frame.width);
    let y0 = (rect.y.round() as u32).min(frame.height);
    let x1 = ((rect.x + rect.width).round() as u32).min(frame.width);
    let y1 = ((rect.y + rect.height).round() as u32).min(frame.height);
    if x1 <= x0 || y1 <= y0 {
        return Err(CropError::Degenerate);
    }

    let out_w = (x1 - x0) as usize;
    let out_h = (y1 - y0) as usize;
    let bpp = Frame::BYTES_PER_PIXEL;
    let src_stride = frame.width as usize * bpp;

    let mut data = Vec::with_capacity(out_w * out_h * bpp);
    for row in y0 as usize..y1 as usize {
        let start = row * src_stride + x0 as usize * bpp;
        data.extend_from_slice(&frame.data[start..start + out_w * bpp]);
    }

    Ok(Frame::new(data, out_w as u32, out_h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        Frame::new(data, width, height)
    }

    #[test]
    fn test_scale_factors() {
        let t = CropTransform::new(
            DisplaySize::new(960.0, 540.0),
            Resolution {
                width: 1920,
                height: 1080,
            },
        )
        .unwrap();
        assert_eq!(t.scale_x(), 2.0);
        assert_eq!(t.scale_y(), 2.0);
    }

    #[test]
    fn test_to_native_scales_rect() {
        let t = CropTransform::new(
            DisplaySize::new(640.0, 360.0),
            Resolution {
                width: 1920,
                height: 1080,
            },
        )
        .unwrap();
        let native = t.to_native(DisplayRect::new(10.0, 20.0, 100.0, 50.0)).unwrap();
        assert_eq!(
            native,
            NativeRect {
                x: 30.0,
                y: 60.0,
                width: 300.0,
                height: 150.0
            }
        );
    }

    #[test]
    fn test_to_native_uses_independent_axes() {
        let t = CropTransform::new(
            DisplaySize::new(100.0, 100.0),
            Resolution {
                width: 200,
                height: 50,
            },
        )
        .unwrap();
        let native = t.to_native(DisplayRect::new(10.0, 10.0, 20.0, 20.0)).unwrap();
        assert_eq!(native.x, 20.0);
        assert_eq!(native.y, 5.0);
        assert_eq!(native.width, 40.0);
        assert_eq!(native.height, 10.0);
    }

    #[test]
    fn test_zero_width_is_degenerate() {
        let t = CropTransform::new(
            DisplaySize::new(320.0, 180.0),
            Resolution {
                width: 1920,
                height: 1080,
            },
        )
        .unwrap();
        assert_eq!(
            t.to_native(DisplayRect::new(10.0, 10.0, 0.0, 40.0)),
            Err(CropError::Degenerate)
        );
        assert_eq!(
            t.to_native(DisplayRect::new(10.0, 10.0, 40.0, 0.0)),
            Err(CropError::Degenerate)
        );
    }

    #[test]
    fn test_negative_and_nan_rejected() {
        let t = CropTransform::new(
            DisplaySize::new(100.0, 100.0),
            Resolution {
                width: 100,
                height: 100,
            },
        )
        .unwrap();
        assert_eq!(
            t.to_native(DisplayRect::new(0.0, 0.0, -5.0, 10.0)),
            Err(CropError::InvalidRect)
        );
        assert_eq!(
            t.to_native(DisplayRect::new(f64::NAN, 0.0, 5.0, 10.0)),
            Err(CropError::InvalidRect)
        );
    }

    #[test]
    fn test_overshoot_is_clamped() {
        let t = CropTransform::new(
            DisplaySize::new(100.0, 100.0),
            Resolution {
                width: 100,
                height: 100,
            },
        )
        .unwrap();
        let native = t.to_native(DisplayRect::new(90.0, 95.0, 30.0, 30.0)).unwrap();
        assert_eq!(native.x + native.width, 100.0);
        assert_eq!(native.y + native.height, 100.0);

        assert_eq!(
            t.to_native(DisplayRect::new(150.0, 10.0, 10.0, 10.0)),
            Err(CropError::OutOfBounds)
        );
    }

    #[test]
    fn test_invalid_display_size() {
        let native = Resolution {
            width: 100,
            height: 100,
        };
        assert!(matches!(
            CropTransform::new(DisplaySize::new(0.0, 100.0), native),
            Err(CropError::InvalidDisplay { .. })
        ));
        assert!(matches!(
            CropTransform::new(DisplaySize::new(100.0, f64::INFINITY), native),
            Err(CropError::InvalidDisplay { .. })
        ));
    }

    #[test]
    fn test_extract_copies_region() {
        let frame = gradient(8, 6);
        let rect = NativeRect {
            x: 2.0,
            y: 1.0,
            width: 3.0,
            height: 2.0,
        };
        let cropped = extract(&frame, rect).unwrap();
        assert_eq!((cropped.width, cropped.height), (3, 2));
        assert!(cropped.is_valid());
        // Top-left pixel of the crop is source (2, 1)
        assert_eq!(&cropped.data[0..3], &[2, 1, 0]);
        // Bottom-right pixel is source (4, 2)
        let last = cropped.data.len() - 3;
        assert_eq!(&cropped.data[last..], &[4, 2, 0]);
    }

    #[test]
    fn test_extract_rounds_fractional_edges() {
        let frame = gradient(10, 10);
        let rect = NativeRect {
            x: 1.4,
            y: 1.6,
            width: 2.2,
            height: 2.2,
        };
        let cropped = extract(&frame, rect).unwrap();
        // x: 1..4, y: 2..4
        assert_eq!((cropped.width, cropped.height), (3, 2));
        assert_eq!(&cropped.data[0..3], &[1, 2, 0]);
    }

    #[test]
    fn test_extract_subpixel_rect_is_degenerate() {
        let frame = gradient(10, 10);
        let rect = NativeRect {
            x: 3.1,
            y: 3.1,
            width: 0.2,
            height: 4.0,
        };
        assert!(matches!(extract(&frame, rect), Err(CropError::Degenerate)));
    }

    #[test]
    fn test_extract_rejects_corrupt_frame() {
        let frame = Frame::new(vec![0; 10], 4, 4);
        let rect = NativeRect {
            x: 0.0,
            y: 0.0,
            width: 2.0,
            height: 2.0,
        };
        assert!(matches!(extract(&frame, rect), Err(CropError::BadFrame)));
    }
}
