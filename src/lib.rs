// src/lib.rs
pub mod cli;
pub mod config;
pub mod error;
pub mod grid;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod processing;
pub mod weights;

pub use error::CdiError;
pub use grid::GridDataset;
