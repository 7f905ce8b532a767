use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame buffer too short: got {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },

    #[error("JPEG decode failed: {0}")]
    Jpeg(#[from] turbojpeg::Error),
}

/// Decodes raw camera frames to RGB (3 bytes per pixel).
pub trait PixelDecoder: Send {
    /// Returns a reference to the decoder's internal buffer.
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<&[u8], DecodeError>;
}

/// YUYV (YUV 4:2:2) decoder. YUYV packs 2 pixels in 4 bytes: [Y0, U, Y1, V].
pub struct YuyvDecoder {
    rgb: Vec<u8>,
}

impl Default for YuyvDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl YuyvDecoder {
    pub fn new() -> Self {
        Self { rgb: Vec::new() }
    }
}

impl PixelDecoder for YuyvDecoder {
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<&[u8], DecodeError> {
        let pixel_count = (width * height) as usize;
        let rgb_size = pixel_count * 3;
        let bytes_per_row = (width * 2) as usize;

        if raw.len() < bytes_per_row * height as usize {
            return Err(DecodeError::Truncated {
                got: raw.len(),
                need: bytes_per_row * height as usize,
            });
        }

        if self.rgb.len() < rgb_size {
            self.rgb.resize(rgb_size, 0);
        }

        // Drivers may pad each row; derive the stride from the buffer itself.
        let stride = raw.len() / height as usize;

        let mut out = 0;
        for row in 0..height as usize {
            let row_data = &raw[row * stride..row * stride + bytes_per_row];

            for chunk in row_data.chunks_exact(4) {
                let y0 = chunk[0] as i32;
                let u = chunk[1] as i32 - 128;
                let y1 = chunk[2] as i32;
                let v = chunk[3] as i32 - 128;

                // BT.601 fixed-point coefficients (8-bit fraction)
                // R = Y + 1.402*V  -> Y + (359*V >> 8)
                // G = Y - 0.344*U - 0.714*V -> Y - ((88*U + 183*V) >> 8)
                // B = Y + 1.772*U -> Y + (454*U >> 8)
                let rv = (359 * v) >> 8;
                let gu = (88 * u + 183 * v) >> 8;
                let bu = (454 * u) >> 8;

                self.rgb[out] = (y0 + rv).clamp(0, 255) as u8;
                self.rgb[out + 1] = (y0 - gu).clamp(0, 255) as u8;
                self.rgb[out + 2] = (y0 + bu).clamp(0, 255) as u8;
                out += 3;

                self.rgb[out] = (y1 + rv).clamp(0, 255) as u8;
                self.rgb[out + 1] = (y1 - gu).clamp(0, 255) as u8;
                self.rgb[out + 2] = (y1 + bu).clamp(0, 255) as u8;
                out += 3;
            }
        }

        Ok(&self.rgb[..rgb_size])
    }
}

/// MJPEG decoder backed by turbojpeg (libjpeg-turbo).
pub struct MjpegDecoder {
    decompressor: turbojpeg::Decompressor,
    rgb: Vec<u8>,
}

impl MjpegDecoder {
    pub fn new() -> Result<Self, DecodeError> {
        Ok(Self {
            decompressor: turbojpeg::Decompressor::new()?,
            rgb: Vec::new(),
        })
    }
}

impl PixelDecoder for MjpegDecoder {
    fn decode(&mut self, raw: &[u8], _width: u32, _height: u32) -> Result<&[u8], DecodeError> {
        let header = self.decompressor.read_header(raw)?;
        let rgb_size = header.width * header.height * 3;

        if self.rgb.len() < rgb_size {
            self.rgb.resize(rgb_size, 0);
        }

        let output = turbojpeg::Image {
            pixels: &mut self.rgb[..rgb_size],
            width: header.width,
            pitch: header.width * 3,
            height: header.height,
            format: turbojpeg::PixelFormat::RGB,
        };

        self.decompressor.decompress(raw, output)?;

        Ok(&self.rgb[..rgb_size])
    }
}
