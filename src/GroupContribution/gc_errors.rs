//! Error taxonomy of the group contribution layer.
use crate::Molecules::molecule_graph::MoleculeError;
use crate::Utils::linear_regression::LinearRegressionError;
use std::fmt;
use thiserror::Error;

/// A molecule could not be partitioned into groups. `table` holds the partial
/// decomposition rendered as a table when one is available.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDecompositionError {
    pub message: String,
    pub table: Option<String>,
}

impl GroupDecompositionError {
    pub fn new(message: &str) -> Self {
        GroupDecompositionError {
            message: message.to_string(),
            table: None,
        }
    }

    pub fn with_table(message: &str, table: String) -> Self {
        GroupDecompositionError {
            message: message.to_string(),
            table: Some(table),
        }
    }

    pub fn debug_table(&self) -> &str {
        self.table.as_deref().unwrap_or("")
    }
}

impl fmt::Display for GroupDecompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}\n{}", self.message, table),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for GroupDecompositionError {}

#[derive(Debug, Error)]
pub enum GroupContributionError {
    #[error("Decomposition error: {0}")]
    Decomposition(#[from] GroupDecompositionError),
    #[error("Missing training data: {message}")]
    MissingTrainingData {
        message: String,
        missing_groups: Vec<String>,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(#[from] LinearRegressionError),
    #[error("Missing formation energy of compound {cid}: {message}")]
    MissingCompoundFormationEnergy { cid: i64, message: String },
    #[error("Molecule error: {0}")]
    Molecule(#[from] MoleculeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GroupContributionError {
    pub fn configuration(message: impl Into<String>) -> Self {
        GroupContributionError::Configuration(message.into())
    }

    pub fn decomposition(message: impl Into<String>) -> Self {
        GroupContributionError::Decomposition(GroupDecompositionError {
            message: message.into(),
            table: None,
        })
    }

    /// errors that make a single compound unusable without stopping a batch run
    pub fn is_estimation_failure(&self) -> bool {
        matches!(
            self,
            GroupContributionError::Decomposition(_)
                | GroupContributionError::MissingTrainingData { .. }
        )
    }
}
