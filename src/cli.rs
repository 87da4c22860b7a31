use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::io::GridSource;
use crate::processing::{CellRule, TimeAlignment, WorkerCount};

#[derive(Parser)]
#[command(name = "cdi-engine", version)]
#[command(about = "Composite drought indicator from percentile-ranked climate grids")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Worker pool size: a number, single, all or all-but-one
    #[arg(short, long, global = true)]
    pub workers: Option<WorkerCount>,

    /// Grid cells per parallel work unit
    #[arg(long, global = true)]
    pub chunk_cells: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Percentile rank one variable against its calendar-month history
    Rank(RankArgs),

    /// Combine index grids into the composite drought indicator
    Combine(CombineArgs),

    /// Run a full pipeline described by a JSON config file
    Run {
        /// Pipeline config file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Args)]
pub struct RankArgs {
    /// Input grid file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Variable to rank
    #[arg(long = "var")]
    pub variable: String,

    /// Output grid file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Drop time steps that end up with no ranked value anywhere
    #[arg(long)]
    pub drop_empty: bool,
}

#[derive(Args)]
pub struct CombineArgs {
    /// Input grid as NAME=PATH or NAME:VAR=PATH (repeat for each index)
    #[arg(short, long = "input", required = true)]
    pub inputs: Vec<GridSource>,

    /// Output grid file
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON weight file ({"name": weight, ...}); unlisted inputs share equally
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// Inputs are raw index values: percentile rank them first
    #[arg(long)]
    pub rank: bool,

    /// How to merge differing input time axes
    #[arg(long, value_enum, default_value_t = AlignmentArg::Intersection)]
    pub alignment: AlignmentArg,

    /// Mark a cell missing when any input is missing there
    #[arg(long)]
    pub strict: bool,

    /// Name of the output variable
    #[arg(long, default_value = "cdi")]
    pub output_var: String,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AlignmentArg {
    Intersection,
    Union,
}

impl From<AlignmentArg> for TimeAlignment {
    fn from(arg: AlignmentArg) -> Self {
        match arg {
            AlignmentArg::Intersection => TimeAlignment::Intersection,
            AlignmentArg::Union => TimeAlignment::Union,
        }
    }
}

impl CombineArgs {
    pub fn cell_rule(&self) -> CellRule {
        if self.strict {
            CellRule::Strict
        } else {
            CellRule::Available
        }
    }
}
