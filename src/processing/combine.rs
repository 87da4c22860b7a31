// src/processing/combine.rs
use std::collections::HashSet;
use std::ops::Range;

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CdiError;
use crate::grid::GridDataset;
use crate::processing::missing::{CellStatus, MissingDataPolicy, SliceStatus};
use crate::processing::parallel::{CellKernel, ParallelGridExecutor};
use crate::processing::variables::{IndexVariable, Orientation};
use crate::weights::WeightVector;

pub const COMPOSITE_UNITS: &str = "weighted percentile rank";

/// How differing input time axes are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeAlignment {
    /// Dates present in every input.
    #[default]
    Intersection,
    /// Dates present in any input; an input without the date counts as
    /// missing everywhere on it.
    Union,
}

/// One ranked grid taking part in a composite.
#[derive(Debug, Clone)]
pub struct CompositeInput {
    name: String,
    grid: GridDataset,
    orientation: Orientation,
}

impl CompositeInput {
    /// Registers `grid` under `name`; the orientation comes from the variable
    /// registry.
    pub fn new(name: impl Into<String>, grid: GridDataset) -> Self {
        let name = name.into();
        let orientation = IndexVariable::resolve(&name).orientation();
        Self {
            name,
            grid,
            orientation,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &GridDataset {
        &self.grid
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }
}

/// Common time axis of several grids plus, per input, where each date sits
/// in that input's own axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedAxis {
    pub times: Vec<NaiveDate>,
    /// `lookup[step][input]`
    pub lookup: Vec<Vec<Option<usize>>>,
}

impl AlignedAxis {
    pub fn build(grids: &[&GridDataset], alignment: TimeAlignment) -> Self {
        let union = grids
            .iter()
            .map(|g| g.times().iter().copied())
            .kmerge()
            .dedup();

        let times: Vec<NaiveDate> = match alignment {
            TimeAlignment::Union => union.collect(),
            TimeAlignment::Intersection => union
                .filter(|d| grids.iter().all(|g| g.time_index(*d).is_some()))
                .collect(),
        };

        let lookup = times
            .iter()
            .map(|d| grids.iter().map(|g| g.time_index(*d)).collect())
            .collect();

        Self { times, lookup }
    }
}

/// Weighted mean of several ranked grids.
///
/// At every cell and date the weights of the inputs that are present are
/// renormalised to sum to one, so a missing input never drags the composite
/// toward zero. Missing-data handling follows the [`MissingDataPolicy`].
#[derive(Debug)]
pub struct WeightedCompositeCombiner {
    inputs: Vec<CompositeInput>,
    weights: Vec<f64>,
    policy: MissingDataPolicy,
    alignment: TimeAlignment,
    output_variable: String,
}

impl WeightedCompositeCombiner {
    /// Validates the inputs and weights. Nothing is computed yet.
    pub fn new(inputs: Vec<CompositeInput>, weights: &WeightVector) -> Result<Self, CdiError> {
        let Some(first) = inputs.first() else {
            return Err(CdiError::config("a composite needs at least one input"));
        };

        let mut seen = HashSet::new();
        if let Some(dup) = inputs.iter().find(|i| !seen.insert(i.name.as_str())) {
            return Err(CdiError::config(format!(
                "input '{}' registered twice",
                dup.name
            )));
        }

        for input in &inputs[1..] {
            first.grid.ensure_coregistered(&input.grid)?;
        }

        let names: Vec<&str> = inputs.iter().map(|i| i.name.as_str()).collect();
        let weights = weights.resolve(&names)?;

        for input in inputs.iter().filter(|i| i.orientation == Orientation::Inverted) {
            info!(
                input = %input.name,
                variable = %IndexVariable::resolve(&input.name),
                "input contributes inverted ranks (100 - rank)"
            );
        }

        Ok(Self {
            inputs,
            weights,
            policy: MissingDataPolicy::default(),
            alignment: TimeAlignment::default(),
            output_variable: "cdi".to_string(),
        })
    }

    pub fn with_policy(mut self, policy: MissingDataPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_alignment(mut self, alignment: TimeAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_output_variable(mut self, name: impl Into<String>) -> Self {
        self.output_variable = name.into();
        self
    }

    /// Resolved weight of each input, in registration order.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn combine(&self, executor: &ParallelGridExecutor) -> Result<GridDataset, CdiError> {
        let grids: Vec<&GridDataset> = self.inputs.iter().map(|i| &i.grid).collect();
        let axis = AlignedAxis::build(&grids, self.alignment);
        let presence: Vec<Vec<bool>> = grids.iter().map(|g| g.slice_presence()).collect();

        let mut times = Vec::with_capacity(axis.times.len());
        let mut steps = Vec::with_capacity(axis.times.len());
        let mut dropped = Vec::new();
        for (date, lookup) in axis.times.iter().zip(&axis.lookup) {
            let has_data: Vec<bool> = lookup
                .iter()
                .zip(&presence)
                .map(|(t, present)| t.is_some_and(|t| present[t]))
                .collect();
            match self.policy.slice_status(&has_data) {
                SliceStatus::Retained => {
                    times.push(*date);
                    steps.push(lookup.clone());
                }
                SliceStatus::Dropped => dropped.push(*date),
            }
        }

        if !dropped.is_empty() {
            warn!(
                dropped = dropped.len(),
                dates = %dropped.iter().join(", "),
                "dropping dates with no data in any input"
            );
        }
        info!(
            variable = %self.output_variable,
            inputs = %self.inputs.iter().map(|i| i.name.as_str()).join(", "),
            dates = times.len(),
            "combining ranked grids"
        );

        let kernel = CompositeKernel {
            name: format!("combine:{}", self.output_variable),
            grids,
            orientations: self.inputs.iter().map(|i| i.orientation).collect(),
            weights: &self.weights,
            steps,
            policy: self.policy,
        };
        let values = executor.execute(&kernel)?;

        let first = &self.inputs[0].grid;
        Ok(GridDataset::new(
            self.output_variable.clone(),
            first.lat().to_vec(),
            first.lon().to_vec(),
            times,
            values,
        )?
        .with_units(COMPOSITE_UNITS))
    }
}

struct CompositeKernel<'a> {
    name: String,
    grids: Vec<&'a GridDataset>,
    orientations: Vec<Orientation>,
    weights: &'a [f64],
    /// `steps[s][input]`: the input's time index for output step `s`
    steps: Vec<Vec<Option<usize>>>,
    policy: MissingDataPolicy,
}

impl CellKernel for CompositeKernel<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn cell_count(&self) -> usize {
        self.grids[0].n_cells()
    }

    fn series_len(&self) -> usize {
        self.steps.len()
    }

    fn compute_partition(
        &self,
        cells: Range<usize>,
        out: &mut [Option<f64>],
    ) -> Result<(), CdiError> {
        let len = self.steps.len();
        let n_inputs = self.grids.len();
        let mut missing = vec![false; n_inputs];
        let mut ranks = vec![0.0; n_inputs];

        for (offset, cell) in cells.enumerate() {
            let series: Vec<&[Option<f64>]> = self.grids.iter().map(|g| g.series(cell)).collect();

            for (s, lookup) in self.steps.iter().enumerate() {
                for i in 0..n_inputs {
                    let value = lookup[i].and_then(|t| series[i][t]);
                    missing[i] = value.is_none();
                    ranks[i] = value.map_or(0.0, |r| self.orientations[i].apply(r));
                }

                out[offset * len + s] = match self.policy.cell_status(&missing) {
                    CellStatus::Missing => None,
                    CellStatus::Computable => weighted_mean(&ranks, self.weights, &missing),
                };
            }
        }
        Ok(())
    }
}

/// Weighted mean over the entries not flagged missing, or `None` if their
/// weights sum to zero.
pub fn weighted_mean(values: &[f64], weights: &[f64], missing: &[bool]) -> Option<f64> {
    let (sum, weight) = values
        .iter()
        .zip(weights)
        .zip(missing)
        .filter(|(_, &m)| !m)
        .fold((0.0, 0.0), |(sum, weight), ((v, w), _)| (sum + w * v, weight + w));

    (weight > 0.0).then(|| sum / weight)
}
