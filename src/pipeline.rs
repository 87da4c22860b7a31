// src/pipeline.rs
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::CdiError;
use crate::grid::GridDataset;
use crate::io::{read_grids, write_grid};
use crate::processing::{
    ClimatologyPercentileRanker, CompositeInput, ParallelGridExecutor, WeightedCompositeCombiner,
};
use crate::weights::WeightVector;

/// Ranks the configured inputs and combines them into the CDI.
///
/// Configuration is validated in [`CdiPipeline::new`]; grid shapes are
/// validated before any ranking or combination is dispatched.
pub struct CdiPipeline {
    config: PipelineConfig,
    weights: WeightVector,
    executor: ParallelGridExecutor,
}

impl CdiPipeline {
    pub fn new(config: PipelineConfig, executor: ParallelGridExecutor) -> Result<Self, CdiError> {
        let weights = config.validate()?;
        Ok(Self {
            config,
            weights,
            executor,
        })
    }

    /// Reads every input, computes the CDI and writes it to the configured
    /// output. Nothing is written if any step fails.
    pub fn run(&self) -> Result<GridDataset, CdiError> {
        let grids = read_grids(&self.config.sources())?;
        let cdi = self.compute(grids)?;
        write_grid(&cdi, &self.config.output)?;
        Ok(cdi)
    }

    /// Computes the CDI from grids already in memory, given in the same order
    /// as the configured inputs.
    pub fn compute(&self, grids: Vec<GridDataset>) -> Result<GridDataset, CdiError> {
        if grids.len() != self.config.inputs.len() {
            return Err(CdiError::config(format!(
                "{} grids supplied for {} configured inputs",
                grids.len(),
                self.config.inputs.len()
            )));
        }
        if let Some((first, rest)) = grids.split_first() {
            for grid in rest {
                first.ensure_coregistered(grid)?;
            }
        }

        let ranker =
            ClimatologyPercentileRanker::new().with_drop_empty_slices(self.config.drop_empty_ranked);

        let mut inputs = Vec::with_capacity(grids.len());
        for (input, grid) in self.config.inputs.iter().zip(grids) {
            let grid = if input.rank {
                info!(input = %input.name, "percentile ranking");
                ranker.rank(&grid, &self.executor)?
            } else {
                grid
            };

            let composite = CompositeInput::new(input.name.clone(), grid);
            inputs.push(match input.orientation_override() {
                Some(orientation) => composite.with_orientation(orientation),
                None => composite,
            });
        }

        WeightedCompositeCombiner::new(inputs, &self.weights)?
            .with_policy(self.config.policy())
            .with_alignment(self.config.alignment)
            .with_output_variable(self.config.output_variable.clone())
            .combine(&self.executor)
    }
}
