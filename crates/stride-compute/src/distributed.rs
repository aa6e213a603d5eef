//! Distributed-memory backend built on message passing.
//!
//! A coordinator and `P` workers share no data. One run walks the phases
//!
//! ```text
//! Init -> Partition -> Distribute -> Compute -> Collect -> Report -> Done
//! ```
//!
//! and any failure moves straight to `Abort`:
//!
//! - **Partition**: the coordinator validates the shapes and builds a
//!   [`PartitionPlan`]. Configuration errors stop the run here, before any
//!   worker has been given data.
//! - **Distribute**: each worker receives its own contiguous row block
//!   (scatter, in rank order) and then a private copy of the vector
//!   (broadcast). A worker cannot start computing before both arrive.
//! - **Compute**: workers run the row or tiled kernel on their block.
//! - **Collect**: the coordinator waits for every worker's local result and
//!   writes it at the worker's row offset. Collection is all-or-nothing.
//!
//! Workers are scoped threads that communicate only through
//! `std::sync::mpsc` channels and owned buffers. The `mpi` feature provides
//! the same protocol across processes.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use stride_core::kernel::{check_shapes, check_tile_divisible, multiply_rows, multiply_tiled};
use stride_core::{CoreError, Matrix, PartitionPlan, Vector};

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// Phases of one distributed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Partition,
    Distribute,
    Compute,
    Collect,
    Report,
    Done,
    Abort,
}

/// Messages from the coordinator to one worker, in the order they are sent.
enum ToWorker {
    /// The worker's row block (scatter).
    Rows {
        count: usize,
        cols: usize,
        block: Vec<f64>,
    },
    /// A private copy of the vector (broadcast).
    Vector(Vec<f64>),
}

/// A worker's local result, sent back to the coordinator.
struct LocalResult {
    rank: usize,
    values: Result<Vec<f64>, String>,
}

/// Outcome of a successful distributed run.
#[derive(Debug, Clone)]
pub struct DistributedRun {
    pub result: Vector,
    pub plan: PartitionPlan,
    /// Phases visited, in order.
    pub trace: Vec<Phase>,
}

struct PhaseTracker {
    trace: Vec<Phase>,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            trace: vec![Phase::Init],
        }
    }

    fn enter(&mut self, phase: Phase) {
        log::debug!("distributed run: {:?} -> {:?}", self.current(), phase);
        self.trace.push(phase);
    }

    fn current(&self) -> Phase {
        self.trace.last().copied().unwrap_or(Phase::Init)
    }

    fn abort(&mut self, err: ComputeError) -> ComputeError {
        log::error!("distributed run aborted during {:?}: {}", self.current(), err);
        self.trace.push(Phase::Abort);
        err
    }
}

/// Backend that scatters row blocks to `workers` message-passing workers.
#[derive(Debug, Clone)]
pub struct DistributedBackend {
    workers: usize,
    tile_size: Option<usize>,
}

impl DistributedBackend {
    pub fn new(workers: usize) -> Result<Self, ComputeError> {
        if workers == 0 {
            return Err(CoreError::InvalidWorkerCount(workers).into());
        }
        Ok(Self {
            workers,
            tile_size: None,
        })
    }

    /// Use the tiled kernel on each worker. Matrices passed to this backend
    /// must then have both dimensions divisible by `tile_size`.
    pub fn with_tile_size(mut self, tile_size: usize) -> Result<Self, ComputeError> {
        if tile_size == 0 {
            return Err(CoreError::InvalidTileSize.into());
        }
        self.tile_size = Some(tile_size);
        Ok(self)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn tile_size(&self) -> Option<usize> {
        self.tile_size
    }

    /// Validate the inputs and plan the row distribution.
    pub fn plan(&self, matrix: &Matrix, vector: &Vector) -> Result<PartitionPlan, CoreError> {
        check_shapes(matrix, vector)?;
        if let Some(tile) = self.tile_size {
            check_tile_divisible(matrix.rows(), matrix.cols(), tile)?;
        }
        PartitionPlan::new(matrix.rows(), self.workers)
    }

    /// Run the full scatter/compute/gather protocol.
    pub fn run(&self, matrix: &Matrix, vector: &Vector) -> Result<DistributedRun, ComputeError> {
        let mut tracker = PhaseTracker::new();

        tracker.enter(Phase::Partition);
        let plan = match self.plan(matrix, vector) {
            Ok(plan) => plan,
            Err(e) => return Err(tracker.abort(e.into())),
        };

        let tile = self.tile_size;
        let (report_tx, report_rx) = mpsc::channel::<LocalResult>();

        let outcome = thread::scope(|scope| {
            let mut inboxes = Vec::with_capacity(plan.workers());
            let mut handles = Vec::with_capacity(plan.workers());
            let mut spawn_error = None;

            for rank in 0..plan.workers() {
                let (tx, rx) = mpsc::channel::<ToWorker>();
                let outbox = report_tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("stride-worker-{rank}"))
                    .spawn_scoped(scope, move || worker_main(rank, rx, outbox, tile));
                match spawned {
                    Ok(handle) => {
                        inboxes.push(tx);
                        handles.push((rank, handle));
                    }
                    Err(e) => {
                        spawn_error = Some(ComputeError::WorkerFailed {
                            rank,
                            reason: format!("spawn failed: {e}"),
                        });
                        break;
                    }
                }
            }
            // Only workers hold report senders from here on.
            drop(report_tx);

            let outcome = match spawn_error {
                Some(err) => {
                    drop(inboxes);
                    Err(err)
                }
                None => coordinate(&plan, matrix, vector, inboxes, &report_rx, &mut tracker),
            };

            // Join explicitly so a panicking worker becomes an error instead
            // of a panic in the coordinator.
            let mut joined = Ok(());
            for (rank, handle) in handles {
                if handle.join().is_err() && joined.is_ok() {
                    joined = Err(ComputeError::WorkerFailed {
                        rank,
                        reason: "worker panicked".into(),
                    });
                }
            }
            match joined {
                Err(e) => Err(e),
                Ok(()) => outcome,
            }
        });

        let result = match outcome {
            Ok(values) => values,
            Err(e) => return Err(tracker.abort(e)),
        };

        tracker.enter(Phase::Report);
        let result = Vector::new(result).map_err(|e| tracker.abort(e.into()))?;
        tracker.enter(Phase::Done);

        Ok(DistributedRun {
            result,
            plan,
            trace: tracker.trace,
        })
    }
}

/// Coordinator side of distribute and collect. Dropping `inboxes` on any
/// early return closes every worker's channel, which halts them.
fn coordinate(
    plan: &PartitionPlan,
    matrix: &Matrix,
    vector: &Vector,
    inboxes: Vec<Sender<ToWorker>>,
    reports: &Receiver<LocalResult>,
    tracker: &mut PhaseTracker,
) -> Result<Vec<f64>, ComputeError> {
    let cols = matrix.cols();
    let gone = |rank: usize| ComputeError::WorkerFailed {
        rank,
        reason: "inbox closed before distribution finished".into(),
    };

    tracker.enter(Phase::Distribute);
    for asg in plan.iter() {
        let block = matrix.row_block(asg.offset, asg.count).to_vec();
        inboxes[asg.rank]
            .send(ToWorker::Rows {
                count: asg.count,
                cols,
                block,
            })
            .map_err(|_| gone(asg.rank))?;
    }
    for (rank, inbox) in inboxes.iter().enumerate() {
        inbox
            .send(ToWorker::Vector(vector.as_slice().to_vec()))
            .map_err(|_| gone(rank))?;
    }
    drop(inboxes);

    tracker.enter(Phase::Compute);

    let mut result = Vector::zeros(plan.rows())?.into_vec();
    let mut received = vec![false; plan.workers()];
    for _ in 0..plan.workers() {
        let report = reports.recv().map_err(|_| {
            ComputeError::Aborted("a worker exited before reporting its rows".into())
        })?;
        if tracker.current() != Phase::Collect {
            tracker.enter(Phase::Collect);
        }

        let rank = report.rank;
        let values = report
            .values
            .map_err(|reason| ComputeError::WorkerFailed { rank, reason })?;
        let rows = plan.range(rank);
        if received[rank] || values.len() != rows.len() {
            return Err(ComputeError::WorkerFailed {
                rank,
                reason: format!(
                    "returned {} values for {} assigned rows",
                    values.len(),
                    rows.len()
                ),
            });
        }
        received[rank] = true;
        result[rows].copy_from_slice(&values);
    }
    Ok(result)
}

/// Worker side: receive rows, receive the vector, compute, report.
///
/// A closed inbox before both messages arrive means the run was aborted; the
/// worker then exits without reporting.
fn worker_main(
    rank: usize,
    inbox: Receiver<ToWorker>,
    outbox: Sender<LocalResult>,
    tile: Option<usize>,
) {
    let (count, cols, block) = match inbox.recv() {
        Ok(ToWorker::Rows { count, cols, block }) => (count, cols, block),
        Ok(ToWorker::Vector(_)) => {
            let _ = outbox.send(LocalResult {
                rank,
                values: Err("vector arrived before row block".into()),
            });
            return;
        }
        Err(_) => return,
    };
    let vector = match inbox.recv() {
        Ok(ToWorker::Vector(v)) => v,
        Ok(ToWorker::Rows { .. }) => {
            let _ = outbox.send(LocalResult {
                rank,
                values: Err("received a second row block".into()),
            });
            return;
        }
        Err(_) => return,
    };

    let mut local = vec![0.0; count];
    let status = match tile {
        Some(t) => multiply_tiled(&block, cols, &vector, &mut local, t),
        None => multiply_rows(&block, cols, &vector, &mut local),
    };
    log::debug!("worker {rank}: computed {count} rows");

    // The coordinator may already have aborted; nothing to do if so.
    let _ = outbox.send(LocalResult {
        rank,
        values: status.map(|()| local).map_err(|e| e.to_string()),
    });
}

impl ComputeBackend for DistributedBackend {
    fn device_info(&self) -> DeviceInfo {
        let name = match self.tile_size {
            Some(t) => format!("Distributed ({} workers, {}x{} tiles)", self.workers, t, t),
            None => format!("Distributed ({} workers)", self.workers),
        };
        DeviceInfo {
            name,
            backend_type: BackendType::Distributed,
            workers: self.workers,
        }
    }

    fn matvec(&self, matrix: &Matrix, vector: &Vector) -> Result<Vector, ComputeError> {
        self.run(matrix, vector).map(|run| run.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_example_two_workers() {
        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();
        let v = Vector::new(vec![1.0, 1.0]).unwrap();
        let run = DistributedBackend::new(2).unwrap().run(&a, &v).unwrap();
        assert_eq!(run.result.as_slice(), &[3.0, 7.0, 11.0]);
        assert_eq!(run.plan.counts(), &[2, 1]);
    }

    #[test]
    fn test_phase_trace() {
        let a = Matrix::identity(4).unwrap();
        let v = Vector::new(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let run = DistributedBackend::new(3).unwrap().run(&a, &v).unwrap();
        assert_eq!(
            run.trace,
            vec![
                Phase::Init,
                Phase::Partition,
                Phase::Distribute,
                Phase::Compute,
                Phase::Collect,
                Phase::Report,
                Phase::Done,
            ]
        );
    }

    #[test]
    fn test_tile_mismatch_aborts_before_distribution() {
        let backend = DistributedBackend::new(2).unwrap().with_tile_size(4).unwrap();
        let a = Matrix::zeros(6, 8).unwrap();
        let v = Vector::zeros(8).unwrap();
        assert!(matches!(
            backend.run(&a, &v),
            Err(ComputeError::Core(CoreError::TileMismatch { rows: 6, cols: 8, tile: 4 }))
        ));
    }

    #[test]
    fn test_invalid_construction() {
        assert!(DistributedBackend::new(0).is_err());
        assert!(DistributedBackend::new(2).unwrap().with_tile_size(0).is_err());
    }
}
