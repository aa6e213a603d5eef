//! # Stride Core
//!
//! The data model and numerical kernels shared by every execution strategy
//! in the Stride workspace. Backends in `stride-compute` only decide *where*
//! rows are multiplied; the arithmetic itself always goes through
//! [`kernel`], which is what makes every strategy bit-identical to the
//! sequential product.
//!
//! ## Modules
//!
//! - [`types`]: Flat row-major [`Matrix`] and [`Vector`].
//! - [`generate`]: Seeded random inputs.
//! - [`partition`]: Contiguous row partitioning across workers.
//! - [`kernel`]: Row-block and tiled matrix-vector kernels.
//! - [`io`]: Plain-text matrix/vector files.
//! - [`report`]: Text report of inputs and result.

pub mod error;
pub mod generate;
pub mod io;
pub mod kernel;
pub mod partition;
pub mod report;
pub mod types;

pub use error::CoreError;
pub use partition::{Assignment, PartitionPlan};
pub use types::{Matrix, Vector};
