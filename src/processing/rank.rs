// src/processing/rank.rs
use std::ops::Range;

use tracing::{info, warn};

use crate::error::CdiError;
use crate::grid::{month_groups, CalendarMonthGroup, GridDataset};
use crate::processing::parallel::{CellKernel, ParallelGridExecutor};

/// Units attached to every ranked grid.
pub const PERCENTILE_UNITS: &str = "percentile rank";

/// Fewest non-missing values a calendar-month population needs to be ranked.
pub const MIN_POPULATION: usize = 2;

/// Replaces each value with its percentile rank among the values of the same
/// cell and calendar month across all years.
///
/// Ties share their mean rank and the rank is scaled as
/// `(rank - 1) / (n - 1) * 100`, so the smallest value of a month scores 0,
/// the largest 100 and a constant history 50. A month with fewer than
/// [`MIN_POPULATION`] values is missing for every year at that cell.
#[derive(Debug, Clone, Default)]
pub struct ClimatologyPercentileRanker {
    drop_empty_slices: bool,
}

impl ClimatologyPercentileRanker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes time steps with no ranked value anywhere from the output.
    pub fn with_drop_empty_slices(mut self, drop: bool) -> Self {
        self.drop_empty_slices = drop;
        self
    }

    pub fn rank(
        &self,
        grid: &GridDataset,
        executor: &ParallelGridExecutor,
    ) -> Result<GridDataset, CdiError> {
        let kernel = RankKernel::new(grid);
        for group in &kernel.groups {
            info!(
                variable = grid.variable(),
                month = group.month,
                years = group.indices.len(),
                "ranking calendar month"
            );
        }

        let values = executor.execute(&kernel)?;
        let ranked = GridDataset::new(
            grid.variable(),
            grid.lat().to_vec(),
            grid.lon().to_vec(),
            grid.times().to_vec(),
            values,
        )?
        .with_units(PERCENTILE_UNITS);

        if !self.drop_empty_slices {
            return Ok(ranked);
        }

        let empty = ranked.empty_slices();
        if !empty.is_empty() {
            warn!(
                variable = grid.variable(),
                dropped = empty.len(),
                "dropping time steps with no ranked values"
            );
        }
        ranked.drop_empty_slices()
    }
}

/// Per-cell ranking work unit shared by all workers.
pub struct RankKernel<'a> {
    grid: &'a GridDataset,
    groups: Vec<CalendarMonthGroup>,
    name: String,
}

impl<'a> RankKernel<'a> {
    pub fn new(grid: &'a GridDataset) -> Self {
        Self {
            grid,
            groups: month_groups(grid.times()),
            name: format!("rank:{}", grid.variable()),
        }
    }
}

impl CellKernel for RankKernel<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn cell_count(&self) -> usize {
        self.grid.n_cells()
    }

    fn series_len(&self) -> usize {
        self.grid.n_times()
    }

    fn compute_partition(
        &self,
        cells: Range<usize>,
        out: &mut [Option<f64>],
    ) -> Result<(), CdiError> {
        let n = self.grid.n_times();
        let mut population = Vec::new();
        for (offset, cell) in cells.enumerate() {
            rank_series(
                self.grid.series(cell),
                &self.groups,
                &mut population,
                &mut out[offset * n..(offset + 1) * n],
            );
        }
        Ok(())
    }
}

/// Ranks one cell's series month by month. `population` is scratch space.
pub fn rank_series(
    series: &[Option<f64>],
    groups: &[CalendarMonthGroup],
    population: &mut Vec<f64>,
    out: &mut [Option<f64>],
) {
    for group in groups {
        population.clear();
        population.extend(group.indices.iter().filter_map(|&t| series[t]).map(canonical));

        if population.len() < MIN_POPULATION {
            for &t in &group.indices {
                out[t] = None;
            }
            continue;
        }

        population.sort_unstable_by(f64::total_cmp);
        let sorted: &[f64] = population;
        for &t in &group.indices {
            out[t] = series[t].map(|v| percentile_rank(sorted, canonical(v)));
        }
    }
}

/// Percentile rank of `value` within `sorted`, which must contain it.
pub fn percentile_rank(sorted: &[f64], value: f64) -> f64 {
    let below = sorted.partition_point(|x| x.total_cmp(&value).is_lt());
    let through = sorted.partition_point(|x| x.total_cmp(&value).is_le());
    let ties = (through - below) as f64;
    let mean_rank = below as f64 + (ties + 1.0) / 2.0;
    (mean_rank - 1.0) / (sorted.len() as f64 - 1.0) * 100.0
}

// -0.0 and 0.0 must tie
fn canonical(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}
