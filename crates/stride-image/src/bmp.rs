//! Uncompressed Windows bitmap reader and writer.
//!
//! Only the `BITMAPINFOHEADER` layout with 24 or 32 bits per pixel and no
//! compression is supported. Rows are kept in file order (bottom-up for a
//! positive height); every operation in this crate is row-order agnostic so
//! the orientation survives a load/save cycle untouched.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::ImageError;
use crate::image::Image;

/// `"BM"` read as a little-endian `u16`.
pub const SIGNATURE: u16 = 0x4D42;

pub const FILE_HEADER_LEN: usize = 14;
pub const INFO_HEADER_LEN: usize = 40;

/// The 14-byte file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub signature: u16,
    pub file_size: u32,
    pub reserved: u32,
    pub data_offset: u32,
}

/// The 40-byte `BITMAPINFOHEADER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoHeader {
    pub header_size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bits_per_pixel: u16,
    pub compression: u32,
    pub image_size: u32,
    pub x_pixels_per_meter: i32,
    pub y_pixels_per_meter: i32,
    pub colors_used: u32,
    pub colors_important: u32,
}

/// A decoded bitmap: headers plus tightly packed pixel rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub file_header: FileHeader,
    pub info_header: InfoHeader,
    pub image: Image,
}

/// Bytes in one on-disk row, padded to a multiple of four.
pub fn padded_row_len(width: usize, channels: usize) -> usize {
    (width * channels + 3) & !3
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }
}

impl Bitmap {
    /// Wrap an image with freshly computed headers.
    pub fn from_image(image: Image) -> Result<Self, ImageError> {
        let bits_per_pixel = match image.channels() {
            3 => 24,
            4 => 32,
            n => {
                return Err(ImageError::Unsupported(format!(
                    "{n} channels per pixel (only 3 or 4 can be written)"
                )))
            }
        };
        let too_large = || ImageError::Unsupported("image too large for a bitmap".into());

        let row = padded_row_len(image.width(), image.channels());
        let image_size = row.checked_mul(image.height()).ok_or_else(too_large)?;
        let data_offset = FILE_HEADER_LEN + INFO_HEADER_LEN;
        let file_size = image_size.checked_add(data_offset).ok_or_else(too_large)?;

        Ok(Self {
            file_header: FileHeader {
                signature: SIGNATURE,
                file_size: u32::try_from(file_size).map_err(|_| too_large())?,
                reserved: 0,
                data_offset: data_offset as u32,
            },
            info_header: InfoHeader {
                header_size: INFO_HEADER_LEN as u32,
                width: i32::try_from(image.width()).map_err(|_| too_large())?,
                height: i32::try_from(image.height()).map_err(|_| too_large())?,
                planes: 1,
                bits_per_pixel,
                compression: 0,
                image_size: image_size as u32,
                x_pixels_per_meter: 2835,
                y_pixels_per_meter: 2835,
                colors_used: 0,
                colors_important: 0,
            },
            image,
        })
    }

    /// Replace the pixels, keeping the row orientation and resolution
    /// metadata of `self`.
    pub fn with_image(&self, image: Image) -> Result<Self, ImageError> {
        let mut out = Self::from_image(image)?;
        if self.info_header.height < 0 {
            out.info_header.height = -out.info_header.height;
        }
        out.info_header.x_pixels_per_meter = self.info_header.x_pixels_per_meter;
        out.info_header.y_pixels_per_meter = self.info_header.y_pixels_per_meter;
        Ok(out)
    }
}

/// Parse a bitmap from memory.
pub fn decode(bytes: &[u8]) -> Result<Bitmap, ImageError> {
    let headers = FILE_HEADER_LEN + INFO_HEADER_LEN;
    if bytes.len() < headers {
        return Err(ImageError::Truncated {
            needed: headers,
            actual: bytes.len(),
        });
    }

    let mut r = Reader { bytes, pos: 0 };
    let file_header = FileHeader {
        signature: r.u16(),
        file_size: r.u32(),
        reserved: r.u32(),
        data_offset: r.u32(),
    };
    if file_header.signature != SIGNATURE {
        return Err(ImageError::InvalidSignature(file_header.signature));
    }

    let info_header = InfoHeader {
        header_size: r.u32(),
        width: r.i32(),
        height: r.i32(),
        planes: r.u16(),
        bits_per_pixel: r.u16(),
        compression: r.u32(),
        image_size: r.u32(),
        x_pixels_per_meter: r.i32(),
        y_pixels_per_meter: r.i32(),
        colors_used: r.u32(),
        colors_important: r.u32(),
    };

    if info_header.compression != 0 {
        return Err(ImageError::Unsupported(format!(
            "compression method {}",
            info_header.compression
        )));
    }
    let channels = match info_header.bits_per_pixel {
        24 => 3,
        32 => 4,
        bpp => return Err(ImageError::Unsupported(format!("{bpp} bits per pixel"))),
    };
    if info_header.width <= 0 || info_header.height == 0 {
        return Err(ImageError::InvalidDimensions {
            width: info_header.width.max(0) as usize,
            height: info_header.height.unsigned_abs() as usize,
            channels,
        });
    }

    let width = info_header.width as usize;
    let height = info_header.height.unsigned_abs() as usize;
    let stride = padded_row_len(width, channels);
    let packed = width * channels;
    let offset = file_header.data_offset as usize;
    if offset < headers {
        return Err(ImageError::Unsupported(format!(
            "pixel data offset {offset} overlaps the headers"
        )));
    }

    // image_size may legally be 0 for uncompressed data
    let needed = stride
        .checked_mul(height)
        .and_then(|n| n.checked_add(offset))
        .ok_or(ImageError::InvalidDimensions {
            width,
            height,
            channels,
        })?;
    if bytes.len() < needed {
        return Err(ImageError::Truncated {
            needed,
            actual: bytes.len(),
        });
    }

    let mut data = Vec::with_capacity(packed * height);
    for row in bytes[offset..needed].chunks_exact(stride) {
        data.extend_from_slice(&row[..packed]);
    }

    debug!(
        "decoded {}x{} bitmap, {} bpp, stride {}",
        width, height, info_header.bits_per_pixel, stride
    );

    Ok(Bitmap {
        file_header,
        info_header,
        image: Image::new(width, height, channels, data)?,
    })
}

/// Serialise a bitmap, padding every row to four bytes.
pub fn encode(bitmap: &Bitmap) -> Vec<u8> {
    let fh = &bitmap.file_header;
    let ih = &bitmap.info_header;
    let image = &bitmap.image;

    let stride = padded_row_len(image.width(), image.channels());
    let offset = fh.data_offset as usize;
    let mut out = Vec::with_capacity(offset + stride * image.height());

    out.extend_from_slice(&fh.signature.to_le_bytes());
    out.extend_from_slice(&fh.file_size.to_le_bytes());
    out.extend_from_slice(&fh.reserved.to_le_bytes());
    out.extend_from_slice(&fh.data_offset.to_le_bytes());

    out.extend_from_slice(&ih.header_size.to_le_bytes());
    out.extend_from_slice(&ih.width.to_le_bytes());
    out.extend_from_slice(&ih.height.to_le_bytes());
    out.extend_from_slice(&ih.planes.to_le_bytes());
    out.extend_from_slice(&ih.bits_per_pixel.to_le_bytes());
    out.extend_from_slice(&ih.compression.to_le_bytes());
    out.extend_from_slice(&ih.image_size.to_le_bytes());
    out.extend_from_slice(&ih.x_pixels_per_meter.to_le_bytes());
    out.extend_from_slice(&ih.y_pixels_per_meter.to_le_bytes());
    out.extend_from_slice(&ih.colors_used.to_le_bytes());
    out.extend_from_slice(&ih.colors_important.to_le_bytes());

    out.resize(offset, 0);

    let padding = stride - image.row_len();
    for y in 0..image.height() {
        out.extend_from_slice(image.row(y));
        out.extend(std::iter::repeat(0u8).take(padding));
    }
    out
}

pub fn load(path: &Path) -> Result<Bitmap, ImageError> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

pub fn save(path: &Path, bitmap: &Bitmap) -> Result<(), ImageError> {
    fs::write(path, encode(bitmap))?;
    Ok(())
}
