//! 3x3 integer convolution.

use rayon::prelude::*;

use crate::error::ImageError;
use crate::image::Image;

/// A 3x3 integer kernel with a divisor applied to each weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel3 {
    pub weights: [[i32; 3]; 3],
    pub divisor: i32,
}

/// Laplacian-style edge detector.
pub const EDGE_DETECT: Kernel3 = Kernel3 {
    weights: [[-1, -1, -1], [-1, 8, -1], [-1, -1, -1]],
    divisor: 1,
};

/// Convolve every channel independently.
///
/// The one-pixel border is left at zero. Sums are divided with truncation
/// toward zero and then clamped to `0..=255`. Rows are processed in parallel
/// on the current Rayon pool.
pub fn convolve(image: &Image, kernel: &Kernel3) -> Result<Image, ImageError> {
    if kernel.divisor == 0 {
        return Err(ImageError::InvalidParameter("kernel divisor must be non-zero".into()));
    }

    let (w, h, c) = (image.width(), image.height(), image.channels());
    let mut out = vec![0u8; w * h * c];
    if w < 3 || h < 3 {
        return Image::new(w, h, c, out);
    }

    let row_len = image.row_len();
    out.par_chunks_mut(row_len)
        .enumerate()
        .skip(1)
        .take(h - 2)
        .for_each(|(y, row)| {
            for x in 1..w - 1 {
                for ch in 0..c {
                    let mut sum = 0i32;
                    for (ky, weights) in kernel.weights.iter().enumerate() {
                        for (kx, &weight) in weights.iter().enumerate() {
                            let sample = image.sample(x + kx - 1, y + ky - 1, ch);
                            sum += i32::from(sample) * weight;
                        }
                    }
                    row[x * c + ch] = (sum / kernel.divisor).clamp(0, 255) as u8;
                }
            }
        });

    Image::new(w, h, c, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_of_constant_image_is_zero() {
        let img = Image::new(5, 4, 3, vec![120; 60]).unwrap();
        let out = convolve(&img, &EDGE_DETECT).unwrap();
        assert!(out.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_edge_highlights_a_spike() {
        let mut data = vec![0u8; 3 * 3 * 3];
        // green channel of the centre pixel
        data[(3 + 1) * 3 + 1] = 10;
        let img = Image::new(3, 3, 3, data).unwrap();
        let out = convolve(&img, &EDGE_DETECT).unwrap();
        assert_eq!(out.pixel(1, 1), &[0, 80, 0]);
        assert_eq!(out.pixel(0, 0), &[0, 0, 0]);
    }

    #[test]
    fn test_blur_keeps_constant_interior() {
        let img = Image::new(4, 4, 4, vec![90; 64]).unwrap();
        let blur = Kernel3 {
            weights: [[1; 3]; 3],
            divisor: 9,
        };
        let out = convolve(&img, &blur).unwrap();
        assert_eq!(out.pixel(1, 2), &[90, 90, 90, 90]);
        assert_eq!(out.pixel(3, 3), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_zero_divisor_rejected() {
        let img = Image::zeros(3, 3, 3).unwrap();
        let kernel = Kernel3 {
            weights: [[0; 3]; 3],
            divisor: 0,
        };
        assert!(matches!(
            convolve(&img, &kernel),
            Err(ImageError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_tiny_image_is_all_border() {
        let img = Image::new(2, 2, 3, vec![200; 12]).unwrap();
        let out = convolve(&img, &EDGE_DETECT).unwrap();
        assert!(out.as_bytes().iter().all(|&b| b == 0));
    }
}
