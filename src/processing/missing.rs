// src/processing/missing.rs
use serde::{Deserialize, Serialize};

/// What to do with a cell where some, but not all, inputs are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CellRule {
    /// Combine whatever is present, renormalising the weights.
    #[default]
    Available,
    /// Any missing input makes the cell missing.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    Computable,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceStatus {
    Retained,
    /// Removed from the output time axis altogether.
    Dropped,
}

/// Two-level missing-data rule for composites.
///
/// Cell level: a cell with every input missing is missing; a partially
/// missing cell follows the [`CellRule`]. Either way the time step stays in
/// the output. Slice level: a time step where every input is missing in every
/// cell is dropped from the output time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MissingDataPolicy {
    cell_rule: CellRule,
}

impl MissingDataPolicy {
    pub fn new(cell_rule: CellRule) -> Self {
        Self { cell_rule }
    }

    pub fn strict() -> Self {
        Self::new(CellRule::Strict)
    }

    pub fn cell_rule(&self) -> CellRule {
        self.cell_rule
    }

    /// `missing[i]` is true when input `i` has no value at this cell and time.
    pub fn cell_status(&self, missing: &[bool]) -> CellStatus {
        let n_missing = missing.iter().filter(|&&m| m).count();
        match self.cell_rule {
            _ if n_missing == missing.len() => CellStatus::Missing,
            CellRule::Strict if n_missing > 0 => CellStatus::Missing,
            _ => CellStatus::Computable,
        }
    }

    /// `has_data[i]` is true when input `i` holds a value in at least one
    /// cell at this time step.
    pub fn slice_status(&self, has_data: &[bool]) -> SliceStatus {
        if has_data.iter().any(|&d| d) {
            SliceStatus::Retained
        } else {
            SliceStatus::Dropped
        }
    }
}
