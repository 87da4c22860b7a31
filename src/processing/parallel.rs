// src/processing/parallel.rs
use std::{
    any::Any,
    num::NonZero,
    ops::Range,
    panic::{self, AssertUnwindSafe},
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::CdiError;

/// Cells per partition when the caller does not choose.
pub const DEFAULT_CHUNK_CELLS: usize = 256;

/// Cell-local computation the executor can split across workers.
///
/// Output is laid out cell-major: for a partition covering `cells`,
/// `out[(cell - cells.start) * series_len() + t]` is written for every cell
/// and output time step.
pub trait CellKernel: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Number of flattened lat × lon cells.
    fn cell_count(&self) -> usize;

    /// Length of each cell's output time series.
    fn series_len(&self) -> usize;

    /// Computes every cell in `cells` into `out`.
    fn compute_partition(
        &self,
        cells: Range<usize>,
        out: &mut [Option<f64>],
    ) -> Result<(), CdiError>;
}

/// How many workers the executor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerCount {
    /// Everything on the calling thread.
    Single,
    /// All available execution units minus one.
    #[default]
    AllButOne,
    /// All available execution units.
    All,
    Fixed(NonZero<usize>),
}

impl WorkerCount {
    pub fn from_count(count: usize) -> Result<Self, CdiError> {
        NonZero::new(count)
            .map(WorkerCount::Fixed)
            .ok_or_else(|| CdiError::config("worker count must be positive, got 0"))
    }

    pub fn resolve(self) -> usize {
        let cpus = num_cpus::get().max(1);
        match self {
            WorkerCount::Single => 1,
            WorkerCount::AllButOne => cpus.saturating_sub(1).max(1),
            WorkerCount::All => cpus,
            WorkerCount::Fixed(n) => n.get(),
        }
    }
}

impl FromStr for WorkerCount {
    type Err = CdiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(WorkerCount::Single),
            "all" => Ok(WorkerCount::All),
            "all-but-one" | "all_but_one" => Ok(WorkerCount::AllButOne),
            other => {
                let n: i64 = other.parse().map_err(|_| {
                    CdiError::config(format!(
                        "invalid worker count '{s}': expected a positive number, 'single', 'all' or 'all-but-one'"
                    ))
                })?;
                if n <= 0 {
                    return Err(CdiError::config(format!(
                        "non-positive worker count {n}"
                    )));
                }
                Ok(if n == 1 {
                    WorkerCount::Single
                } else {
                    WorkerCount::from_count(n as usize)?
                })
            }
        }
    }
}

/// A contiguous block of flattened lat × lon cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub cells: Range<usize>,
}

/// Splits a cell-local computation into spatial partitions, runs them on a
/// worker pool and reassembles the result in cell order.
///
/// The assembled output does not depend on the worker count, the chunk size
/// or the order in which workers finish.
pub struct ParallelGridExecutor {
    workers: usize,
    chunk_cells: usize,
}

impl ParallelGridExecutor {
    pub fn new(workers: WorkerCount) -> Self {
        Self {
            workers: workers.resolve(),
            chunk_cells: DEFAULT_CHUNK_CELLS,
        }
    }

    pub fn single() -> Self {
        Self::new(WorkerCount::Single)
    }

    pub fn with_chunk_cells(mut self, chunk_cells: usize) -> Result<Self, CdiError> {
        if chunk_cells == 0 {
            return Err(CdiError::config("partition size must be at least one cell"));
        }
        self.chunk_cells = chunk_cells;
        Ok(self)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn chunk_cells(&self) -> usize {
        self.chunk_cells
    }

    pub fn partitions(&self, n_cells: usize) -> Vec<Partition> {
        (0..n_cells)
            .step_by(self.chunk_cells)
            .enumerate()
            .map(|(index, start)| Partition {
                index,
                cells: start..(start + self.chunk_cells).min(n_cells),
            })
            .collect()
    }

    /// Runs `kernel` over every cell and returns the cell-major output.
    ///
    /// The first failing partition cancels the rest of the run and its error
    /// is returned; results from other partitions are discarded.
    pub fn execute<K>(&self, kernel: &K) -> Result<Vec<Option<f64>>, CdiError>
    where
        K: CellKernel + ?Sized,
    {
        let n_cells = kernel.cell_count();
        let len = kernel.series_len();
        let partitions = self.partitions(n_cells);
        let mut assembly = vec![None; n_cells * len];

        info!(
            kernel = kernel.name(),
            cells = n_cells,
            steps = len,
            partitions = partitions.len(),
            workers = self.workers,
            "dispatching grid computation"
        );

        if self.workers <= 1 || partitions.len() <= 1 {
            for partition in &partitions {
                let out = &mut assembly[partition.cells.start * len..partition.cells.end * len];
                run_unit(kernel, partition, out)?;
            }
            return Ok(assembly);
        }

        let (req_tx, req_rx): (Sender<Partition>, Receiver<Partition>) = flume::unbounded();
        let (res_tx, res_rx) = flume::unbounded::<(Partition, Vec<Option<f64>>)>();
        for partition in &partitions {
            // req_rx is alive until the end of this function
            let _ = req_tx.send(partition.clone());
        }
        drop(req_tx);

        let cancelled = AtomicBool::new(false);
        let failure: Mutex<Option<CdiError>> = Mutex::new(None);
        let workers = self.workers.min(partitions.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                let req_rx = req_rx.clone();
                let res_tx = res_tx.clone();
                let cancelled = &cancelled;
                let failure = &failure;

                scope.spawn(move || {
                    for partition in req_rx {
                        if cancelled.load(Ordering::Acquire) {
                            break;
                        }
                        let mut out = vec![None; partition.cells.len() * len];
                        match run_unit(kernel, &partition, &mut out) {
                            Ok(()) => {
                                if res_tx.send((partition, out)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let mut slot = failure.lock();
                                if slot.is_none() {
                                    *slot = Some(e);
                                }
                                cancelled.store(true, Ordering::Release);
                                break;
                            }
                        }
                    }
                });
            }
            drop(res_tx);

            // Merge barrier: each partition owns a disjoint slot
            for (partition, block) in res_rx {
                if cancelled.load(Ordering::Acquire) {
                    continue;
                }
                assembly[partition.cells.start * len..partition.cells.end * len]
                    .copy_from_slice(&block);
            }
        });

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }

        debug!(kernel = kernel.name(), "grid computation merged");
        Ok(assembly)
    }
}

fn run_unit<K>(kernel: &K, partition: &Partition, out: &mut [Option<f64>]) -> Result<(), CdiError>
where
    K: CellKernel + ?Sized,
{
    debug!(
        kernel = kernel.name(),
        partition = partition.index,
        cells = ?partition.cells,
        "computing partition"
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        kernel.compute_partition(partition.cells.clone(), out)
    }));

    let cause = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };

    Err(CdiError::WorkerFailure {
        partition: partition.index,
        cells: partition.cells.clone(),
        cause,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
