use crate::errors::DecodeError;
use common::span_debug;

/// Decoded RGB8 view into a decoder's internal buffer.
pub struct Decoded<'a> {
    pub rgb: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// Decodes raw camera buffers to packed RGB8.
pub trait FrameDecoder: Send {
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<Decoded<'_>, DecodeError>;
}

/// YUYV (YUV 4:2:2) decoder.
///
/// YUYV packs 2 pixels in 4 bytes: [Y0, U, Y1, V]
#[derive(Default)]
pub struct YuyvDecoder {
    rgb_buffer: Vec<u8>,
}

impl YuyvDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for YuyvDecoder {
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<Decoded<'_>, DecodeError> {
        let _s = span_debug!("decode_yuyv");

        let bytes_per_row = (width * 2) as usize;
        if height == 0 || raw.len() < bytes_per_row * height as usize {
            return Err(DecodeError::Truncated {
                width,
                height,
                actual: raw.len(),
            });
        }

        let rgb_size = (width * height * 3) as usize;
        if self.rgb_buffer.len() != rgb_size {
            self.rgb_buffer.resize(rgb_size, 0);
        }

        // Drivers may pad rows.
        let stride = raw.len() / height as usize;

        let mut out_idx = 0;
        for row in 0..height as usize {
            let row_start = row * stride;
            let row_data = &raw[row_start..row_start + bytes_per_row];

            for chunk in row_data.chunks_exact(4) {
                let y0 = chunk[0] as i32;
                let u = chunk[1] as i32 - 128;
                let y1 = chunk[2] as i32;
                let v = chunk[3] as i32 - 128;

                // BT.601 fixed-point coefficients (8-bit fraction)
                let rv = (359 * v) >> 8;
                let gu = (88 * u + 183 * v) >> 8;
                let bu = (454 * u) >> 8;

                for y in [y0, y1] {
                    self.rgb_buffer[out_idx] = (y + rv).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 1] = (y - gu).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 2] = (y + bu).clamp(0, 255) as u8;
                    out_idx += 3;
                }
            }
        }

        Ok(Decoded {
            rgb: &self.rgb_buffer,
            width,
            height,
        })
    }
}

/// MJPEG decoder using turbojpeg (libjpeg-turbo). Frame size comes from the
/// JPEG header, not the negotiated format.
pub struct MjpegDecoder {
    decompressor: turbojpeg::Decompressor,
    rgb_buffer: Vec<u8>,
}

impl MjpegDecoder {
    pub fn new() -> Result<Self, DecodeError> {
        Ok(Self {
            decompressor: turbojpeg::Decompressor::new()?,
            rgb_buffer: Vec::new(),
        })
    }
}

impl FrameDecoder for MjpegDecoder {
    fn decode(&mut self, raw: &[u8], _width: u32, _height: u32) -> Result<Decoded<'_>, DecodeError> {
        let _s = span_debug!("decode_mjpeg");

        let header = self.decompressor.read_header(raw)?;
        let width = header.width;
        let height = header.height;
        let rgb_size = width * height * 3;

        if self.rgb_buffer.len() != rgb_size {
            self.rgb_buffer.resize(rgb_size, 0);
        }

        let output = turbojpeg::Image {
            pixels: &mut self.rgb_buffer[..],
            width,
            pitch: width * 3,
            height,
            format: turbojpeg::PixelFormat::RGB,
        };

        self.decompressor.decompress(raw, output)?;

        Ok(Decoded {
            rgb: &self.rgb_buffer,
            width: width as u32,
            height: height as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{Codec, compress};
    use geometry::Size;

    #[test]
    fn yuyv_neutral_chroma_is_gray() {
        let mut decoder = YuyvDecoder::new();
        // 2x1 image: Y=128, neutral U/V
        let yuyv = vec![128, 128, 128, 128];
        let decoded = decoder.decode(&yuyv, 2, 1).unwrap();
        assert_eq!(decoded.rgb, &[128, 128, 128, 128, 128, 128]);
    }

    #[test]
    fn yuyv_padded_rows_are_skipped() {
        let mut decoder = YuyvDecoder::new();
        // 2x2 image with 4 bytes of padding per row
        let yuyv = vec![
            16, 128, 16, 128, 0, 0, 0, 0, //
            235, 128, 235, 128, 9, 9, 9, 9,
        ];
        let decoded = decoder.decode(&yuyv, 2, 2).unwrap();
        assert_eq!(decoded.rgb.len(), 12);
        assert_eq!(&decoded.rgb[..3], &[16, 16, 16]);
        assert_eq!(&decoded.rgb[6..9], &[235, 235, 235]);
    }

    #[test]
    fn yuyv_truncated_buffer_is_rejected() {
        let mut decoder = YuyvDecoder::new();
        assert!(matches!(
            decoder.decode(&[0u8; 6], 4, 1),
            Err(DecodeError::Truncated { actual: 6, .. })
        ));
    }

    #[test]
    fn mjpeg_decoder_rejects_invalid_data() {
        let mut decoder = MjpegDecoder::new().unwrap();
        assert!(decoder.decode(&[0, 1, 2, 3], 640, 480).is_err());
    }

    #[test]
    fn mjpeg_decoder_reads_size_from_header() {
        let rgb = vec![90u8; 32 * 16 * 3];
        let jpeg = compress(&rgb, Size::new(32, 16), Codec::Jpeg, 0.9).unwrap();

        let mut decoder = MjpegDecoder::new().unwrap();
        let decoded = decoder.decode(&jpeg, 0, 0).unwrap();
        assert_eq!((decoded.width, decoded.height), (32, 16));
        assert_eq!(decoded.rgb.len(), 32 * 16 * 3);
    }
}
