//! # Stride Compute
//!
//! Execution strategies for dense matrix-vector products. Every backend
//! implements [`ComputeBackend`](backend::ComputeBackend) and returns a
//! result bit-identical to the sequential kernel in `stride-core`.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Model |
//! |---------|-------------|-------|
//! | Sequential | always | single thread |
//! | CPU (Rayon) | `cpu` (default) | shared memory, row chunks |
//! | Tiled (Rayon) | `cpu` (default) | shared memory, row tiles |
//! | Distributed | `distributed` (default) | message passing between worker threads |
//! | MPI | `mpi` | message passing between processes |

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "cpu")]
pub mod tiled;

#[cfg(feature = "distributed")]
pub mod distributed;

#[cfg(feature = "mpi")]
pub mod cluster;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, SequentialBackend};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;

#[cfg(feature = "cpu")]
pub use tiled::TiledBackend;

#[cfg(feature = "distributed")]
pub use distributed::{DistributedBackend, DistributedRun, Phase};

#[cfg(feature = "mpi")]
pub use cluster::MpiBackend;
