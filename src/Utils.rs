//! # Utilities
//! Numerical helpers and input/output shared by the other modules.
/// enumeration of distributions of identical items over slots
pub mod distribute;
#[allow(non_snake_case)]
/// reading of task files with training records, compounds and groups
pub mod load_from_file;
/// rank deficient least squares and related matrix routines
pub mod linear_regression;
mod linear_regression_tests;
/// terminal/file logger initialisation
pub mod logger;
