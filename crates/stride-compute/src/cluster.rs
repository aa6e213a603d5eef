//! MPI backend for runs across processes.
//!
//! Gated behind the `mpi` feature. Launch the binary under `mpirun`; the
//! world size is the worker count and rank 0 is the coordinator. The
//! protocol mirrors [`crate::distributed`]:
//!
//! 1. rank 0 broadcasts a header `[status, rows, cols, tile]`; a zero status
//!    means the configuration was rejected and every rank stops;
//! 2. every rank derives the same [`PartitionPlan`] from the header;
//! 3. `scatter_varcount` hands each rank its row block, `broadcast` the vector;
//! 4. each rank multiplies locally and `gather_varcount` collects the rows
//!    on rank 0 at their plan offsets.

use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::traits::*;
use mpi::Count;

use stride_core::kernel::{check_shapes, check_tile_divisible, multiply_rows, multiply_tiled};
use stride_core::{CoreError, Matrix, PartitionPlan, Vector};

use crate::backend::{BackendType, ComputeError, DeviceInfo};

/// Rank of the coordinating process.
pub const ROOT_RANK: i32 = 0;

const STATUS_ABORT: u64 = 0;
const STATUS_OK: u64 = 1;

fn to_counts(values: &[usize]) -> Result<Vec<Count>, ComputeError> {
    values
        .iter()
        .map(|&v| {
            Count::try_from(v).map_err(|_| {
                ComputeError::Unavailable(format!("{v} elements exceed the MPI count range"))
            })
        })
        .collect()
}

/// Everything rank 0 needs for the varcount collectives, converted to MPI
/// counts up front so no conversion can fail after the header is sent.
struct Layout {
    plan: PartitionPlan,
    send_counts: Vec<Count>,
    send_displs: Vec<Count>,
    recv_counts: Vec<Count>,
    recv_displs: Vec<Count>,
}

impl Layout {
    fn new(plan: PartitionPlan, cols: usize) -> Result<Self, ComputeError> {
        // the vector broadcast length is an MPI count too
        to_counts(&[cols])?;
        Ok(Self {
            send_counts: to_counts(&plan.element_counts(cols))?,
            send_displs: to_counts(&plan.element_offsets(cols))?,
            recv_counts: to_counts(plan.counts())?,
            recv_displs: to_counts(plan.offsets())?,
            plan,
        })
    }
}

fn local_product(
    block: &[f64],
    cols: usize,
    vector: &[f64],
    count: usize,
    tile: Option<usize>,
) -> Result<Vec<f64>, CoreError> {
    let mut local = vec![0.0; count];
    match tile {
        Some(t) => multiply_tiled(block, cols, vector, &mut local, t)?,
        None => multiply_rows(block, cols, vector, &mut local)?,
    }
    Ok(local)
}

/// Backend driving one MPI world.
pub struct MpiBackend {
    universe: Universe,
    tile_size: Option<usize>,
}

impl MpiBackend {
    /// Initialise MPI. Fails if it was already initialised in this process.
    pub fn initialize(tile_size: Option<usize>) -> Result<Self, ComputeError> {
        if tile_size == Some(0) {
            return Err(CoreError::InvalidTileSize.into());
        }
        let universe = mpi::initialize()
            .ok_or_else(|| ComputeError::Unavailable("MPI is already initialised".into()))?;
        Ok(Self {
            universe,
            tile_size,
        })
    }

    pub fn rank(&self) -> usize {
        self.universe.world().rank() as usize
    }

    pub fn size(&self) -> usize {
        self.universe.world().size() as usize
    }

    pub fn is_root(&self) -> bool {
        self.universe.world().rank() == ROOT_RANK
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("MPI ({} processes)", self.size()),
            backend_type: BackendType::Mpi,
            workers: self.size(),
        }
    }

    fn layout(&self, matrix: &Matrix, vector: &Vector) -> Result<Layout, ComputeError> {
        check_shapes(matrix, vector)?;
        if let Some(tile) = self.tile_size {
            check_tile_divisible(matrix.rows(), matrix.cols(), tile)?;
        }
        let plan = PartitionPlan::new(matrix.rows(), self.size())?;
        Layout::new(plan, matrix.cols())
    }

    /// Cancel a run from rank 0 before it starts. Every rank in
    /// [`MpiBackend::serve`] returns [`ComputeError::Aborted`].
    pub fn abort_run(&self) {
        let world = self.universe.world();
        let mut header = [STATUS_ABORT, 0, 0, 0];
        world.process_at_rank(ROOT_RANK).broadcast_into(&mut header[..]);
    }

    /// Coordinator side; call on rank 0 only while every other rank is in
    /// [`MpiBackend::serve`].
    pub fn matvec_root(&self, matrix: &Matrix, vector: &Vector) -> Result<Vector, ComputeError> {
        let world = self.universe.world();
        let root = world.process_at_rank(ROOT_RANK);

        let planned = self.layout(matrix, vector);
        let mut header = match &planned {
            Ok(_) => [
                STATUS_OK,
                matrix.rows() as u64,
                matrix.cols() as u64,
                self.tile_size.unwrap_or(0) as u64,
            ],
            Err(_) => [STATUS_ABORT, 0, 0, 0],
        };
        root.broadcast_into(&mut header[..]);
        let layout = planned?;
        let plan = &layout.plan;
        log::debug!("mpi root: plan counts {:?}", plan.counts());

        let cols = matrix.cols();
        let mut block = vec![0.0; plan.count(0) * cols];
        {
            let partition = Partition::new(
                matrix.as_slice(),
                &layout.send_counts[..],
                &layout.send_displs[..],
            );
            root.scatter_varcount_into_root(&partition, &mut block[..]);
        }

        let mut x = vector.as_slice().to_vec();
        root.broadcast_into(&mut x[..]);

        let local = local_product(&block, cols, &x, plan.count(0), self.tile_size)?;

        let mut result = vec![0.0; plan.rows()];
        {
            let mut partition = PartitionMut::new(
                &mut result[..],
                &layout.recv_counts[..],
                &layout.recv_displs[..],
            );
            root.gather_varcount_into_root(&local[..], &mut partition);
        }

        Ok(Vector::new(result)?)
    }

    /// Worker side; call on every rank except 0.
    pub fn serve(&self) -> Result<(), ComputeError> {
        let world = self.universe.world();
        let root = world.process_at_rank(ROOT_RANK);

        let mut header = [STATUS_ABORT; 4];
        root.broadcast_into(&mut header[..]);
        if header[0] != STATUS_OK {
            return Err(ComputeError::Aborted(
                "coordinator rejected the run configuration".into(),
            ));
        }
        let rows = header[1] as usize;
        let cols = header[2] as usize;
        let tile = match header[3] {
            0 => None,
            t => Some(t as usize),
        };

        let plan = PartitionPlan::new(rows, self.size())?;
        let rank = self.rank();
        let count = plan.count(rank);

        let mut block = vec![0.0; count * cols];
        root.scatter_varcount_into(&mut block[..]);

        let mut x = vec![0.0; cols];
        root.broadcast_into(&mut x[..]);

        let local = local_product(&block, cols, &x, count, tile)?;
        log::debug!("mpi rank {rank}: computed {count} rows");
        root.gather_varcount_into(&local[..]);
        Ok(())
    }
}
