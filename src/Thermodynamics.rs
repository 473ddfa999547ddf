//! # Aqueous thermodynamics of biochemical compounds
//!
//! Physical constants, default conditions and the pseudoisomer (Alberty) transform of
//! formation energies to given pH, pMg, ionic strength and temperature.
//! # Examples
//! ```
//! use GibbsGC::Thermodynamics::pseudoisomer::{AqueousParams, PseudoisomerMap};
//! // acetate and acetic acid, untransformed dG0 in kJ/mol
//! let mut pmap = PseudoisomerMap::new();
//! pmap.add(3, -1, 0, -369.31);
//! pmap.add(4, 0, 0, -396.45);
//! let dG0_prime = pmap.transform(&AqueousParams::default(), false).unwrap();
//! assert!(dG0_prime < pmap.transform(&AqueousParams::default(), true).unwrap() + 1e-9);
//! ```
#[allow(non_snake_case)]
/// Alberty transform of pseudoisomer groups
pub mod pseudoisomer;
#[allow(non_snake_case)]
/// constants and default conditions
pub mod thermodynamic_constants;
