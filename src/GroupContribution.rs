//! # Group contribution estimation of Gibbs energies of formation
//!
//! ## Aim
//! A compound is cut into chemical groups (substructures with fixed protonation, charge
//! and Mg binding). Every group carries an energy contribution fitted by least squares to
//! measured formation energies and pKa values; the energy of a pseudoisomer is the sum of
//! its group contributions. Compounds whose groups were never constrained by the training
//! data are refused rather than guessed.
//!
//! ## Pipeline
//! 1. `groups_data` - ordered library of groups; order is assignment precedence.
//! 2. `group_decomposition` - assigns atoms of a molecule to groups (phosphate chains
//!    first, then the library in order) and enumerates the pseudoisomer vectors.
//! 3. `group_contribution` - trains the contributions, estimates pseudoisomer maps and
//!    reaction energies, cross-validates the training set.
//! 4. `gc_tables` - writes and restores a trained model.
//!
//! # Examples
//! ```
//! use GibbsGC::GroupContribution::group_decomposition::GroupDecomposer;
//! use GibbsGC::GroupContribution::groups_data::GroupsData;
//! use GibbsGC::Molecules::molecule_graph::Molecule;
//! use std::sync::Arc;
//! let groups = Arc::new(GroupsData::default_library().unwrap());
//! let decomposer = GroupDecomposer::new(groups).unwrap();
//! let acetate = Molecule::from_smiles("CC(=O)[O-]").unwrap();
//! let decomposition = decomposer.decompose(&acetate, false, true).unwrap();
//! assert_eq!(decomposition.net_charge(), -1);
//! assert_eq!(decomposition.pseudoisomer_vectors().len(), 2);
//! ```
/// coded corrections counted on the whole molecule (rings)
pub mod coded_corrections;
/// error taxonomy
pub mod gc_errors;
/// persistence of a trained model
pub mod gc_tables;
#[allow(non_snake_case)]
/// training, estimation, reaction energies, reports
pub mod group_contribution;
/// decomposition of a molecule into groups
pub mod group_decomposition;
/// group counts over the library slots
pub mod group_vector;
#[allow(non_snake_case)]
/// group library
pub mod groups_data;
#[allow(non_snake_case)]
/// training records and design matrix
pub mod training_data;

mod group_contribution_tests;
