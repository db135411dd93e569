use crate::errors::EncodeError;
use crate::frame::{EncodedFrame, VideoFrame};
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use geometry::Size;
use std::str::FromStr;

pub const MIN_CAPTURE_WIDTH: u32 = 160;
pub const MAX_CAPTURE_WIDTH: u32 = 1920;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Webp,
    Jpeg,
}

impl Codec {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Codec::Webp => "image/webp",
            Codec::Jpeg => "image/jpeg",
        }
    }

    /// Pick the codec to use for this process.
    ///
    /// `Auto` prefers lossy WebP when the encoder works on this build and falls
    /// back to JPEG otherwise.
    pub fn resolve(preference: CodecPreference) -> Codec {
        match preference {
            CodecPreference::Jpeg => Codec::Jpeg,
            CodecPreference::Webp | CodecPreference::Auto => {
                if webp_supported() {
                    Codec::Webp
                } else {
                    tracing::info!("WebP encoder unavailable, falling back to JPEG");
                    Codec::Jpeg
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecPreference {
    #[default]
    Auto,
    Webp,
    Jpeg,
}

impl FromStr for CodecPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "webp" => Ok(Self::Webp),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            other => Err(format!(
                "{} is not a supported codec. Use `auto`, `webp` or `jpeg`.",
                other
            )),
        }
    }
}

fn webp_supported() -> bool {
    let sample = [0u8; 2 * 2 * 3];
    encode_webp(&sample, Size::new(2, 2), 0.5).is_ok_and(|out| !out.is_empty())
}

/// `quality` in `[0, 1]`, mapped onto libwebp's 0-100 scale.
fn encode_webp(rgb: &[u8], size: Size, quality: f32) -> Result<Vec<u8>, EncodeError> {
    let encoder = webp::Encoder::from_rgb(rgb, size.width, size.height);
    let memory = encoder
        .encode_simple(false, quality.clamp(0.0, 1.0) * 100.0)
        .map_err(|e| EncodeError::Webp(format!("{e:?}")))?;
    Ok(memory.to_vec())
}

/// Capture surface size for a stream: the target width with the native aspect ratio.
///
/// Empty when the native size is not known yet.
pub fn capture_size_for(native: Size, target_width: u32) -> Size {
    if native.is_empty() || target_width == 0 {
        return Size::default();
    }
    let height = (target_width as f64 * native.height as f64 / native.width as f64).round() as u32;
    Size::new(target_width, height.max(1))
}

struct CaptureSurface {
    size: Size,
    pixels: Vec<u8>,
}

/// Downsamples the live frame into a fixed-size offscreen surface and
/// compresses it for transmission. One encoder per stream.
pub struct CaptureEncoder {
    target_width: u32,
    quality: f32,
    codec: Codec,
    surface: Option<CaptureSurface>,
    resizer: Resizer,
}

impl CaptureEncoder {
    pub fn new(target_width: u32, quality: f32, codec: Codec) -> Self {
        Self {
            target_width: target_width.clamp(MIN_CAPTURE_WIDTH, MAX_CAPTURE_WIDTH),
            quality: quality.clamp(0.0, 1.0),
            codec,
            surface: None,
            resizer: Resizer::new(),
        }
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Size of the current surface, if one has been allocated.
    pub fn capture_size(&self) -> Option<Size> {
        self.surface.as_ref().map(|s| s.size)
    }

    /// (Re)allocate the surface for `native` at `target_width`; only reallocates
    /// when the resulting dimensions change.
    pub fn ensure_capture_surface(&mut self, native: Size, target_width: u32) -> Size {
        self.target_width = target_width.clamp(MIN_CAPTURE_WIDTH, MAX_CAPTURE_WIDTH);
        let size = capture_size_for(native, self.target_width);

        if size.is_empty() {
            self.surface = None;
            return size;
        }

        if self.surface.as_ref().map(|s| s.size) != Some(size) {
            tracing::debug!(
                width = size.width,
                height = size.height,
                native_width = native.width,
                native_height = native.height,
                "Allocating capture surface"
            );
            self.surface = Some(CaptureSurface {
                size,
                pixels: vec![0u8; (size.width * size.height * 3) as usize],
            });
        }

        size
    }

    /// Draw `frame` into the surface and compress it.
    ///
    /// `None` means no frame is available this tick (no dimensions yet, or the
    /// codec failed); it is never an error for the caller.
    pub fn encode_current_frame(&mut self, frame: &VideoFrame) -> Option<EncodedFrame> {
        if !frame.is_ready() {
            tracing::trace!("Video frame not ready, skipping encode");
            return None;
        }

        self.ensure_capture_surface(frame.size(), self.target_width);

        match self.try_encode(frame) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                tracing::debug!(error = %e, "Frame encode skipped");
                None
            }
        }
    }

    fn try_encode(&mut self, frame: &VideoFrame) -> Result<EncodedFrame, EncodeError> {
        let surface = self.surface.as_mut().ok_or(EncodeError::SurfaceNotReady)?;
        let size = surface.size;

        if frame.size() == size {
            surface.pixels.copy_from_slice(&frame.rgb);
        } else {
            let src = ImageRef::new(frame.width, frame.height, &frame.rgb, PixelType::U8x3)
                .map_err(|e| EncodeError::Resize(e.to_string()))?;
            let mut dst =
                Image::from_slice_u8(size.width, size.height, &mut surface.pixels, PixelType::U8x3)
                    .map_err(|e| EncodeError::Resize(e.to_string()))?;
            self.resizer
                .resize(
                    &src,
                    &mut dst,
                    &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
                )
                .map_err(|e| EncodeError::Resize(e.to_string()))?;
        }

        let bytes = compress(&surface.pixels, size, self.codec, self.quality)?;

        Ok(EncodedFrame {
            bytes,
            size,
            codec: self.codec,
        })
    }
}

/// Compress a packed RGB8 buffer with lossy `codec` at `quality` in `[0, 1]`.
pub fn compress(rgb: &[u8], size: Size, codec: Codec, quality: f32) -> Result<Vec<u8>, EncodeError> {
    let expected = (size.width * size.height * 3) as usize;
    if rgb.len() != expected {
        return Err(EncodeError::SizeMismatch {
            expected,
            actual: rgb.len(),
        });
    }

    match codec {
        Codec::Jpeg => {
            let quality = (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as i32;
            let image = turbojpeg::Image {
                pixels: rgb,
                width: size.width as usize,
                pitch: size.width as usize * 3,
                height: size.height as usize,
                format: turbojpeg::PixelFormat::RGB,
            };
            let buf = turbojpeg::compress(image, quality, turbojpeg::Subsamp::Sub2x2)?;
            Ok(buf.to_vec())
        }
        Codec::Webp => encode_webp(rgb, size, quality),
    }
}
