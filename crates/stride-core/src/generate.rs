//! Seeded random inputs.
//!
//! Every generator takes its seed explicitly so a run can be reproduced
//! exactly. Wall-clock seeding exists only as [`clock_seed`], which the
//! command-line front end calls when the user does not pass `--seed`.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::CoreError;
use crate::types::{element_count, try_zeroed, Matrix, Vector};

/// Fill a `rows x cols` matrix with values uniform in `[0, 1)`.
pub fn generate_matrix(rows: usize, cols: usize, seed: u64) -> Result<Matrix, CoreError> {
    let mut data = try_zeroed(element_count(rows, cols)?)?;
    fill_uniform(&mut data, seed);
    Matrix::new(rows, cols, data)
}

/// Fill a vector of `len` values uniform in `[0, 1)`.
pub fn generate_vector(len: usize, seed: u64) -> Result<Vector, CoreError> {
    if len == 0 {
        return Err(CoreError::EmptyVector);
    }
    let mut data = try_zeroed(len)?;
    fill_uniform(&mut data, seed);
    Vector::new(data)
}

/// Seed derived from the system clock, for runs that do not need to be
/// reproducible.
pub fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() ^ u64::from(d.subsec_nanos()))
        .unwrap_or(0)
}

fn fill_uniform(buf: &mut [f64], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for x in buf.iter_mut() {
        *x = rng.gen::<f64>();
    }
}
