//! # Molecules
//!
//! Molecular graphs and the substructure search used by the group decomposer.
//! # Examples
//! ```
//! use GibbsGC::Molecules::molecule_graph::Molecule;
//! use GibbsGC::Molecules::smarts::Pattern;
//! let ethanol = Molecule::from_smiles("CCO").unwrap();
//! assert_eq!(ethanol.hydrogen_count(), 6);
//! let hydroxyl = Pattern::new("[OX2H1][#6]").unwrap();
//! assert_eq!(hydroxyl.find_all(&ethanol), vec![vec![2, 1]]);
//! ```
/// atoms, bonds, rings
pub mod molecule_graph;
/// SMARTS subset compiler and matcher
pub mod smarts;
/// SMILES reader
pub mod smiles_parser;

mod molecules_tests;
