// src/io/mod.rs
pub mod reader;
pub mod time;
pub mod writer;

pub use reader::{read_grid, read_grids, GridSource};
pub use writer::{write_grid, NODATA_VALUE};

/// Dataset metadata item naming the stored variable.
pub const VARIABLE_KEY: &str = "VARIABLE";
pub const UNITS_KEY: &str = "UNITS";
/// Band metadata item holding the ISO date of the band.
pub const TIME_KEY: &str = "TIME";
