// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;

use cdi_engine::cli::{Cli, CombineArgs, Commands, RankArgs};
use cdi_engine::config::{InputConfig, PipelineConfig, WorkerSetting};
use cdi_engine::io::{read_grid, write_grid, GridSource};
use cdi_engine::logging;
use cdi_engine::pipeline::CdiPipeline;
use cdi_engine::processing::{ClimatologyPercentileRanker, ParallelGridExecutor, WorkerCount};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let output = match &cli.command {
        Commands::Rank(args) => {
            let executor = executor(cli.workers.unwrap_or_default(), cli.chunk_cells)?;
            rank(args, &executor)?;
            args.output.clone()
        }
        Commands::Combine(args) => {
            let config = combine_config(args, cli.chunk_cells);
            let executor = executor(cli.workers.unwrap_or_default(), cli.chunk_cells)?;
            CdiPipeline::new(config, executor)?
                .run()
                .context("composite computation failed")?;
            args.output.clone()
        }
        Commands::Run { config } => {
            let config = PipelineConfig::load(config)
                .with_context(|| format!("cannot load pipeline config {}", config.display()))?;
            let executor = match cli.workers {
                Some(workers) => executor(workers, cli.chunk_cells.or(config.chunk_cells))?,
                None => config.executor()?,
            };
            let output = config.output.clone();
            CdiPipeline::new(config, executor)?
                .run()
                .context("pipeline run failed")?;
            output
        }
    };

    println!("Processing complete: {}", output.display());
    Ok(())
}

fn executor(workers: WorkerCount, chunk_cells: Option<usize>) -> Result<ParallelGridExecutor> {
    let executor = ParallelGridExecutor::new(workers);
    Ok(match chunk_cells {
        Some(n) => executor.with_chunk_cells(n)?,
        None => executor,
    })
}

fn rank(args: &RankArgs, executor: &ParallelGridExecutor) -> Result<()> {
    let source = GridSource::new(args.variable.clone(), args.input.clone(), args.variable.clone());
    let grid = read_grid(&source)
        .with_context(|| format!("cannot read {}", args.input.display()))?;

    let ranked = ClimatologyPercentileRanker::new()
        .with_drop_empty_slices(args.drop_empty)
        .rank(&grid, executor)?;
    write_grid(&ranked, &args.output)?;
    Ok(())
}

fn combine_config(args: &CombineArgs, chunk_cells: Option<usize>) -> PipelineConfig {
    PipelineConfig {
        inputs: args
            .inputs
            .iter()
            .map(|source| InputConfig {
                name: source.name.clone(),
                path: source.path.clone(),
                variable: Some(source.variable.clone()),
                rank: args.rank,
                invert: None,
            })
            .collect(),
        output: args.output.clone(),
        weights: Default::default(),
        weights_file: args.weights.clone(),
        workers: WorkerSetting::default(),
        chunk_cells,
        alignment: args.alignment.into(),
        cell_rule: args.cell_rule(),
        output_variable: args.output_var.clone(),
        drop_empty_ranked: false,
    }
}
