//! Integer-factor upscaling.

use std::thread;

use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use stride_core::PartitionPlan;

use crate::error::ImageError;
use crate::filter::{convolve, EDGE_DETECT};
use crate::image::Image;

pub const DEFAULT_FACTOR: usize = 2;

/// Interpolation used to fill the enlarged grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// Each source pixel becomes a `factor x factor` block.
    Nearest,
    /// Catmull-Rom cubic over a clamped 4x4 neighbourhood.
    #[default]
    Bicubic,
    /// Nearest-neighbour with output rows split across one scoped thread per
    /// worker, see [`nearest_banded`].
    Banded,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Nearest => "nearest",
            Method::Bicubic => "bicubic",
            Method::Banded => "banded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpscaleOptions {
    pub factor: usize,
    pub method: Method,
    /// Run [`EDGE_DETECT`] over the enlarged image.
    pub edge_filter: bool,
}

impl Default for UpscaleOptions {
    fn default() -> Self {
        Self {
            factor: DEFAULT_FACTOR,
            method: Method::default(),
            edge_filter: true,
        }
    }
}

fn scaled_size(image: &Image, factor: usize) -> Result<(usize, usize), ImageError> {
    if factor == 0 {
        return Err(ImageError::InvalidParameter("upscale factor must be at least 1".into()));
    }
    let w = image.width().checked_mul(factor);
    let h = image.height().checked_mul(factor);
    match (w, h) {
        (Some(w), Some(h)) if w.checked_mul(h).and_then(|n| n.checked_mul(image.channels())).is_some() => {
            Ok((w, h))
        }
        _ => Err(ImageError::InvalidDimensions {
            width: image.width().saturating_mul(factor),
            height: image.height().saturating_mul(factor),
            channels: image.channels(),
        }),
    }
}

/// Write output rows `first_row..` of a nearest upscale into `band`.
fn fill_nearest_rows(image: &Image, factor: usize, first_row: usize, band: &mut [u8]) {
    let c = image.channels();
    let out_row_len = image.row_len() * factor;
    for (i, row) in band.chunks_exact_mut(out_row_len).enumerate() {
        let src_y = (first_row + i) / factor;
        for (x, px) in row.chunks_exact_mut(c).enumerate() {
            px.copy_from_slice(image.pixel(x / factor, src_y));
        }
    }
}

/// Nearest-neighbour upscale, rows in parallel on the current Rayon pool.
pub fn nearest(image: &Image, factor: usize) -> Result<Image, ImageError> {
    let (w, h) = scaled_size(image, factor)?;
    let c = image.channels();
    let mut out = vec![0u8; w * h * c];

    out.par_chunks_mut(w * c)
        .enumerate()
        .for_each(|(y, row)| fill_nearest_rows(image, factor, y, row));

    Image::new(w, h, c, out)
}

/// Nearest-neighbour upscale with output rows split across `workers`
/// scoped threads by a [`PartitionPlan`].
///
/// Produces the same pixels as [`nearest`].
pub fn nearest_banded(image: &Image, factor: usize, workers: usize) -> Result<Image, ImageError> {
    let (w, h) = scaled_size(image, factor)?;
    let c = image.channels();
    let plan = PartitionPlan::new(h, workers)?;
    let row_len = w * c;
    let mut out = vec![0u8; row_len * h];

    let mut bands = Vec::with_capacity(plan.workers());
    let mut rest: &mut [u8] = &mut out;
    for assignment in plan.iter() {
        let (band, tail) = std::mem::take(&mut rest).split_at_mut(assignment.count * row_len);
        rest = tail;
        bands.push((assignment, band));
    }

    thread::scope(|s| {
        let handles: Vec<_> = bands
            .into_iter()
            .map(|(assignment, band)| {
                let handle = s.spawn(move || {
                    fill_nearest_rows(image, factor, assignment.offset, band);
                });
                (assignment.rank, handle)
            })
            .collect();

        for (rank, handle) in handles {
            handle.join().map_err(|_| ImageError::WorkerFailed {
                rank,
                reason: "panicked".into(),
            })?;
        }
        Ok::<(), ImageError>(())
    })?;

    debug!("banded upscale of {} rows over {} workers", h, plan.workers());
    Image::new(w, h, c, out)
}

/// Catmull-Rom cubic through `b` (t = 0) and `c` (t = 1).
pub fn cubic_hermite(a: f64, b: f64, c: f64, d: f64, t: f64) -> f64 {
    let a3 = -a / 2.0 + (3.0 * b) / 2.0 - (3.0 * c) / 2.0 + d / 2.0;
    let a2 = a - (5.0 * b) / 2.0 + 2.0 * c - d / 2.0;
    let a1 = -a / 2.0 + c / 2.0;
    a3 * t * t * t + a2 * t * t + a1 * t + b
}

/// Bicubic upscale, rows in parallel on the current Rayon pool.
///
/// Output pixel (i, j) samples the source at `((w-1)/new_w * j,
/// (h-1)/new_h * i)`. Neighbours outside the image are clamped to the edge;
/// results are clamped to `0..=255` and truncated.
pub fn bicubic(image: &Image, factor: usize) -> Result<Image, ImageError> {
    let (new_w, new_h) = scaled_size(image, factor)?;
    let (w, h, c) = (image.width(), image.height(), image.channels());
    let x_ratio = (w - 1) as f64 / new_w as f64;
    let y_ratio = (h - 1) as f64 / new_h as f64;

    let mut out = vec![0u8; new_w * new_h * c];
    out.par_chunks_mut(new_w * c).enumerate().for_each(|(i, row)| {
        let py = y_ratio * i as f64;
        let y = py as usize;
        let dy = py - y as f64;
        let rows = [-1isize, 0, 1, 2].map(|m| (y as isize + m).clamp(0, h as isize - 1) as usize);

        for (j, px) in row.chunks_exact_mut(c).enumerate() {
            let fx = x_ratio * j as f64;
            let x = fx as usize;
            let dx = fx - x as f64;
            let cols = [-1isize, 0, 1, 2].map(|n| (x as isize + n).clamp(0, w as isize - 1) as usize);

            for (k, out_sample) in px.iter_mut().enumerate() {
                let col = rows.map(|sy| {
                    let p = cols.map(|sx| f64::from(image.sample(sx, sy, k)));
                    cubic_hermite(p[0], p[1], p[2], p[3], dx)
                });
                let value = cubic_hermite(col[0], col[1], col[2], col[3], dy);
                *out_sample = value.clamp(0.0, 255.0) as u8;
            }
        }
    });

    Image::new(new_w, new_h, c, out)
}

/// Upscaling pipeline bound to a dedicated thread pool.
pub struct Upscaler {
    threads: usize,
    pool: ThreadPool,
    options: UpscaleOptions,
}

impl Upscaler {
    pub fn new(threads: usize, options: UpscaleOptions) -> Result<Self, ImageError> {
        if threads == 0 {
            return Err(ImageError::InvalidParameter("thread count must be at least 1".into()));
        }
        if options.factor == 0 {
            return Err(ImageError::InvalidParameter("upscale factor must be at least 1".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("stride-image-{i}"))
            .build()
            .map_err(|e| ImageError::InvalidParameter(format!("thread pool: {e}")))?;
        Ok(Self {
            threads,
            pool,
            options,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn options(&self) -> &UpscaleOptions {
        &self.options
    }

    /// Enlarge `image`, then edge-filter it if enabled.
    pub fn run(&self, image: &Image) -> Result<Image, ImageError> {
        let UpscaleOptions {
            factor,
            method,
            edge_filter,
        } = self.options;

        info!(
            "Upscaling {}x{} by {} ({}, edge filter {}) on {} threads",
            image.width(),
            image.height(),
            factor,
            method.name(),
            if edge_filter { "on" } else { "off" },
            self.threads
        );

        self.pool.install(|| {
            let enlarged = match method {
                Method::Nearest => nearest(image, factor)?,
                Method::Bicubic => bicubic(image, factor)?,
                Method::Banded => nearest_banded(image, factor, self.threads)?,
            };
            if edge_filter {
                convolve(&enlarged, &EDGE_DETECT)
            } else {
                Ok(enlarged)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: usize, h: usize, c: usize) -> Image {
        let data = (0..w * h * c).map(|i| (i * 13 % 256) as u8).collect();
        Image::new(w, h, c, data).unwrap()
    }

    #[test]
    fn test_nearest_replicates_blocks() {
        let img = Image::new(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let out = nearest(&img, 2).unwrap();
        assert_eq!((out.width(), out.height()), (4, 2));
        assert_eq!(out.row(0), &[1, 2, 3, 1, 2, 3, 4, 5, 6, 4, 5, 6]);
        assert_eq!(out.row(1), out.row(0));
    }

    #[test]
    fn test_banded_matches_nearest() {
        let img = gradient(5, 3, 4);
        let reference = nearest(&img, 3).unwrap();
        for workers in [1, 2, 4, 9, 20] {
            assert_eq!(nearest_banded(&img, 3, workers).unwrap(), reference);
        }
    }

    #[test]
    fn test_factor_one_is_identity() {
        let img = gradient(4, 3, 3);
        assert_eq!(nearest(&img, 1).unwrap(), img);
    }

    #[test]
    fn test_bicubic_of_constant_is_constant() {
        let img = Image::new(3, 3, 3, vec![77; 27]).unwrap();
        let out = bicubic(&img, 2).unwrap();
        assert_eq!((out.width(), out.height()), (6, 6));
        assert!(out.as_bytes().iter().all(|&b| b == 77));
    }

    #[test]
    fn test_bicubic_origin_is_source_origin() {
        let img = gradient(4, 4, 3);
        let out = bicubic(&img, 2).unwrap();
        assert_eq!(out.pixel(0, 0), img.pixel(0, 0));
    }

    #[test]
    fn test_cubic_hermite_endpoints() {
        assert_eq!(cubic_hermite(0.0, 10.0, 20.0, 30.0, 0.0), 10.0);
        assert_eq!(cubic_hermite(0.0, 10.0, 20.0, 30.0, 1.0), 20.0);
        assert_eq!(cubic_hermite(0.0, 10.0, 20.0, 30.0, 0.5), 15.0);
    }

    #[test]
    fn test_zero_factor_rejected() {
        let img = gradient(2, 2, 3);
        assert!(nearest(&img, 0).is_err());
        assert!(bicubic(&img, 0).is_err());
        assert!(Upscaler::new(
            2,
            UpscaleOptions {
                factor: 0,
                ..Default::default()
            }
        )
        .is_err());
    }

    #[test]
    fn test_upscaler_thread_count_does_not_change_output() {
        let img = gradient(6, 5, 3);
        let options = UpscaleOptions::default();
        let one = Upscaler::new(1, options).unwrap().run(&img).unwrap();
        let four = Upscaler::new(4, options).unwrap().run(&img).unwrap();
        assert_eq!(one, four);
        assert_eq!((one.width(), one.height()), (12, 10));
    }

    #[test]
    fn test_upscaler_banded_matches_nearest() {
        let img = gradient(5, 7, 3);
        let run = |method| {
            let options = UpscaleOptions {
                factor: 3,
                method,
                edge_filter: true,
            };
            Upscaler::new(4, options).unwrap().run(&img).unwrap()
        };
        assert_eq!(run(Method::Banded), run(Method::Nearest));
    }

    #[test]
    fn test_upscaler_without_filter_keeps_interior() {
        let img = Image::new(2, 2, 3, vec![50; 12]).unwrap();
        let options = UpscaleOptions {
            factor: 2,
            method: Method::Nearest,
            edge_filter: false,
        };
        let out = Upscaler::new(2, options).unwrap().run(&img).unwrap();
        assert!(out.as_bytes().iter().all(|&b| b == 50));
    }
}
