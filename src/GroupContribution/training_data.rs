//! Training records read from disk and the design matrix assembled from them.
use crate::GroupContribution::group_vector::GroupVector;
use crate::Thermodynamics::thermodynamic_constants::default_T;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageFlag {
    #[default]
    Train,
    Test,
    Skip,
}

impl UsageFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageFlag::Train => "train",
            UsageFlag::Test => "test",
            UsageFlag::Skip => "skip",
        }
    }
}

/// Measured formation energy of one pseudoisomer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoisomerRecord {
    pub name: String,
    #[serde(default)]
    pub cid: Option<i64>,
    pub nH: i32,
    pub z: i32,
    #[serde(default)]
    pub nMg: i32,
    pub dG0: Option<f64>,
    #[serde(default)]
    pub smiles: Option<String>,
    #[serde(default)]
    pub use_for: UsageFlag,
    #[serde(default)]
    pub reference: Option<String>,
}

impl PseudoisomerRecord {
    pub fn new(name: &str, nH: i32, z: i32, nMg: i32, dG0: f64, smiles: &str) -> Self {
        PseudoisomerRecord {
            name: name.to_string(),
            cid: None,
            nH,
            z,
            nMg,
            dG0: Some(dG0),
            smiles: Some(smiles.to_string()),
            use_for: UsageFlag::Train,
            reference: None,
        }
    }

    pub fn with_cid(mut self, cid: i64) -> Self {
        self.cid = Some(cid);
        self
    }

    pub fn with_usage(mut self, use_for: UsageFlag) -> Self {
        self.use_for = use_for;
        self
    }
}

impl fmt::Display for PseudoisomerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (nH={}, z={}, nMg={})",
            self.name, self.nH, self.z, self.nMg
        )
    }
}

fn default_temperature() -> f64 {
    default_T
}

/// Acid dissociation constant between two protonation states of one compound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkaRecord {
    pub cid: Option<i64>,
    #[serde(default = "default_temperature")]
    pub T: f64,
    pub nH_below: i32,
    pub nH_above: i32,
    pub smiles_below: Option<String>,
    pub smiles_above: Option<String>,
    pub pKa: f64,
}

/// Hands out identities for compounds that have none: -1, -2, ...
#[derive(Debug, Clone)]
pub struct CompoundIdAllocator {
    next: i64,
}

impl Default for CompoundIdAllocator {
    fn default() -> Self {
        CompoundIdAllocator { next: -1 }
    }
}

impl CompoundIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> i64 {
        let id = self.next;
        self.next -= 1;
        id
    }
}

/// Rows of the regression: one group vector, one observation and one label each.
#[derive(Debug, Clone, Default)]
pub struct TrainingData {
    pub rows: Vec<GroupVector>,
    pub observations: Vec<f64>,
    pub names: Vec<String>,
}

impl TrainingData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: GroupVector, observation: f64, name: String) {
        self.rows.push(row);
        self.observations.push(observation);
        self.names.push(name);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn design_matrix(&self) -> DMatrix<f64> {
        let m = self.rows.first().map(|r| r.len()).unwrap_or(0);
        DMatrix::from_fn(self.rows.len(), m, |i, j| self.rows[i].as_slice()[j])
    }

    pub fn observation_vector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.observations)
    }

    /// design matrix and observations without row `skip`
    pub fn without_row(&self, skip: usize) -> (DMatrix<f64>, DVector<f64>) {
        let keep: Vec<usize> = (0..self.len()).filter(|&i| i != skip).collect();
        let m = self.rows.first().map(|r| r.len()).unwrap_or(0);
        let a = DMatrix::from_fn(keep.len(), m, |i, j| self.rows[keep[i]].as_slice()[j]);
        let y = DVector::from_iterator(keep.len(), keep.iter().map(|&i| self.observations[i]));
        (a, y)
    }
}
