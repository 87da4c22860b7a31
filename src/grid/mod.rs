// src/grid/mod.rs
pub mod calendar;
pub mod dataset;

pub use calendar::{month_groups, CalendarMonthGroup};
pub use dataset::{GridDataset, GridView, COORD_TOLERANCE};
