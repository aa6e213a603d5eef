//! Interleaved 8-bit pixel buffer.

use crate::error::ImageError;

/// A `width x height` image with `channels` interleaved bytes per pixel.
///
/// Rows are tightly packed (`width * channels` bytes each) and kept in the
/// order they were read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl Image {
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = Self::byte_len(width, height, channels)?;
        if data.len() != expected {
            return Err(ImageError::InvalidParameter(format!(
                "pixel buffer holds {} bytes, {}x{}x{} needs {}",
                data.len(),
                width,
                height,
                channels,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A black image.
    pub fn zeros(width: usize, height: usize, channels: usize) -> Result<Self, ImageError> {
        let len = Self::byte_len(width, height, channels)?;
        Ok(Self {
            width,
            height,
            channels,
            data: vec![0; len],
        })
    }

    fn byte_len(width: usize, height: usize, channels: usize) -> Result<usize, ImageError> {
        let invalid = ImageError::InvalidDimensions {
            width,
            height,
            channels,
        };
        if width == 0 || height == 0 || channels == 0 {
            return Err(invalid);
        }
        width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(channels))
            .ok_or(invalid)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Bytes in one row.
    pub fn row_len(&self) -> usize {
        self.width * self.channels
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let len = self.row_len();
        &self.data[y * len..(y + 1) * len]
    }

    /// Channel `c` of pixel (x, y).
    pub fn sample(&self, x: usize, y: usize, c: usize) -> u8 {
        self.data[(y * self.width + x) * self.channels + c]
    }

    /// The `channels` bytes of pixel (x, y).
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let img = Image::new(2, 2, 3, (0..12).collect()).unwrap();
        assert_eq!(img.row(1), &[6, 7, 8, 9, 10, 11]);
        assert_eq!(img.pixel(1, 0), &[3, 4, 5]);
        assert_eq!(img.sample(0, 1, 2), 8);
    }

    #[test]
    fn test_rejects_bad_buffers() {
        assert!(Image::new(2, 2, 3, vec![0; 11]).is_err());
        assert!(matches!(
            Image::zeros(0, 4, 3),
            Err(ImageError::InvalidDimensions { width: 0, .. })
        ));
    }
}
