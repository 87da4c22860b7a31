// src/processing/mod.rs
pub mod combine;
pub mod missing;
pub mod parallel;
pub mod rank;
pub mod variables;

// Re-export main components
pub use combine::{AlignedAxis, CompositeInput, TimeAlignment, WeightedCompositeCombiner};
pub use missing::{CellRule, CellStatus, MissingDataPolicy, SliceStatus};
pub use parallel::{CellKernel, ParallelGridExecutor, Partition, WorkerCount};
pub use rank::ClimatologyPercentileRanker;
pub use variables::{IndexVariable, Orientation};
