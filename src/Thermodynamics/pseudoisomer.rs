//! # Pseudoisomer Energy Map
//!
//! ## Aim
//! Holds the untransformed standard Gibbs energies of formation of the protonation /
//! charge / Mg-binding states of one compound and transforms them to given aqueous
//! conditions (pH, pMg, ionic strength, temperature) following Alberty:
//!
//! dG0'_i = dG0_i + nH RT ln10 pH + nMg (RT ln10 pMg - dG0_f(Mg2+)) - (z^2 - nH - 4 nMg) DH(I, T)
//!
//! and the species are combined as dG0' = -RT ln(sum exp(-dG0'_i / RT)).
//! With `most_abundant` only the lowest dG0'_i is returned.
//!
//! ## Main Data Structures
//! - `AqueousParams`: the four conditions, defaults pH 7, pMg 14, I 0.1 M, T 298.15 K
//! - `Pseudoisomer`: one species (nH, z, nMg, dG0)
//! - `PseudoisomerMap`: list of species; the same (nH, z, nMg) key may occur more than once
//!   and every entry enters the Boltzmann sum
use super::thermodynamic_constants::{
    R, dG0_f_Mg, debye_huckel, default_I, default_T, default_pH, default_pMg, rt_ln10,
};
use nalgebra::DMatrix;
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PseudoisomerError {
    Empty,
    BadMatrixShape(usize),
}

impl fmt::Display for PseudoisomerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PseudoisomerError::Empty => write!(f, "pseudoisomer map has no species"),
            PseudoisomerError::BadMatrixShape(cols) => {
                write!(f, "expected 4 columns (nH, z, nMg, dG0), got {}", cols)
            }
        }
    }
}

impl std::error::Error for PseudoisomerError {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AqueousParams {
    pub pH: f64,
    pub pMg: f64,
    pub ionic_strength: f64,
    pub temperature: f64,
}

impl Default for AqueousParams {
    fn default() -> Self {
        AqueousParams {
            pH: default_pH,
            pMg: default_pMg,
            ionic_strength: default_I,
            temperature: default_T,
        }
    }
}

impl AqueousParams {
    pub fn new(pH: f64, pMg: f64, ionic_strength: f64, temperature: f64) -> Self {
        AqueousParams {
            pH,
            pMg,
            ionic_strength,
            temperature,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pseudoisomer {
    pub nH: i32,
    pub z: i32,
    pub nMg: i32,
    pub dG0: f64,
}

impl Pseudoisomer {
    /// dG0' of this species alone
    pub fn transform(&self, params: &AqueousParams) -> f64 {
        let T = params.temperature;
        let nH = self.nH as f64;
        let nMg = self.nMg as f64;
        let z = self.z as f64;
        self.dG0 + nH * rt_ln10(T) * params.pH + nMg * (rt_ln10(T) * params.pMg - dG0_f_Mg)
            - (z * z - nH - 4.0 * nMg) * debye_huckel(params.ionic_strength, T)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PseudoisomerMap {
    species: Vec<Pseudoisomer>,
    pub reference: Option<String>,
}

impl PseudoisomerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn add(&mut self, nH: i32, z: i32, nMg: i32, dG0: f64) {
        self.species.push(Pseudoisomer { nH, z, nMg, dG0 });
    }

    pub fn add_all(&mut self, other: &PseudoisomerMap) {
        self.species.extend(other.species.iter().copied());
        if self.reference.is_none() {
            self.reference = other.reference.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn species(&self) -> &[Pseudoisomer] {
        &self.species
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pseudoisomer> {
        self.species.iter()
    }

    /// dG0 of every stored species with the given key
    pub fn get(&self, nH: i32, z: i32, nMg: i32) -> Vec<f64> {
        self.species
            .iter()
            .filter(|s| s.nH == nH && s.z == z && s.nMg == nMg)
            .map(|s| s.dG0)
            .collect()
    }

    /// one row per species: nH, z, nMg, dG0
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.species.len(), 4, |i, j| {
            let s = &self.species[i];
            match j {
                0 => s.nH as f64,
                1 => s.z as f64,
                2 => s.nMg as f64,
                _ => s.dG0,
            }
        })
    }

    pub fn from_matrix(matrix: &DMatrix<f64>) -> Result<Self, PseudoisomerError> {
        if matrix.ncols() != 4 {
            return Err(PseudoisomerError::BadMatrixShape(matrix.ncols()));
        }
        let mut pmap = PseudoisomerMap::new();
        for row in matrix.row_iter() {
            pmap.add(
                row[0].round() as i32,
                row[1].round() as i32,
                row[2].round() as i32,
                row[3],
            );
        }
        Ok(pmap)
    }

    pub fn transformed_species(&self, params: &AqueousParams) -> Vec<f64> {
        self.species.iter().map(|s| s.transform(params)).collect()
    }

    /// Transformed Gibbs energy of formation of the whole pseudoisomer group.
    pub fn transform(
        &self,
        params: &AqueousParams,
        most_abundant: bool,
    ) -> Result<f64, PseudoisomerError> {
        let values = self.transformed_species(params);
        if values.is_empty() {
            return Err(PseudoisomerError::Empty);
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        if most_abundant {
            return Ok(min);
        }
        let rt = R * params.temperature;
        // -RT ln sum exp(-x/RT), shifted by the minimum
        let sum: f64 = values.iter().map(|x| (-(x - min) / rt).exp()).sum();
        Ok(min - rt * sum.ln())
    }

    pub fn transform_at(
        &self,
        pH: f64,
        pMg: f64,
        I: f64,
        T: f64,
        most_abundant: bool,
    ) -> Result<f64, PseudoisomerError> {
        self.transform(&AqueousParams::new(pH, pMg, I, T), most_abundant)
    }

    pub fn to_table_string(&self) -> String {
        let mut table = Table::new();
        table.add_row(row!["nH", "z", "nMg", "dG0 [kJ/mol]"]);
        for s in &self.species {
            table.add_row(row![s.nH, s.z, s.nMg, format!("{:.2}", s.dG0)]);
        }
        table.to_string()
    }
}

impl fmt::Display for PseudoisomerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .species
            .iter()
            .map(|s| format!("nH={} z={} nMg={} dG0={:.1}", s.nH, s.z, s.nMg, s.dG0))
            .collect();
        write!(f, "{}", parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_species_proton_term_only() {
        let mut pmap = PseudoisomerMap::new();
        pmap.add(1, 0, 0, -100.0);
        let value = pmap.transform_at(7.0, 14.0, 0.0, 298.15, false).unwrap();
        assert_relative_eq!(value, -100.0 + rt_ln10(298.15) * 7.0, epsilon = 1e-9);
        let most = pmap.transform_at(7.0, 14.0, 0.0, 298.15, true).unwrap();
        assert_relative_eq!(most, value, epsilon = 1e-9);
    }

    #[test]
    fn test_ionic_strength_and_mg_terms() {
        let s = Pseudoisomer {
            nH: 2,
            z: -2,
            nMg: 1,
            dG0: -500.0,
        };
        let params = AqueousParams::new(6.5, 3.0, 0.25, 310.15);
        let expected = -500.0
            + 2.0 * rt_ln10(310.15) * 6.5
            + (rt_ln10(310.15) * 3.0 + 455.3)
            - (4.0 - 2.0 - 4.0) * debye_huckel(0.25, 310.15);
        assert_relative_eq!(s.transform(&params), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_boltzmann_sum_of_equal_species() {
        // two identical micro-species lower the energy by RT ln 2
        let mut pmap = PseudoisomerMap::new();
        pmap.add(0, 0, 0, -50.0);
        pmap.add(0, 0, 0, -50.0);
        let params = AqueousParams::new(7.0, 14.0, 0.0, 298.15);
        let value = pmap.transform(&params, false).unwrap();
        assert_relative_eq!(value, -50.0 - R * 298.15 * 2f64.ln(), epsilon = 1e-9);
        assert_relative_eq!(pmap.transform(&params, true).unwrap(), -50.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boltzmann_sum_is_below_minimum() {
        let mut pmap = PseudoisomerMap::new();
        pmap.add(0, -1, 0, -300.0);
        pmap.add(1, 0, 0, -330.0);
        let params = AqueousParams::default();
        let all = pmap.transform(&params, false).unwrap();
        let most = pmap.transform(&params, true).unwrap();
        assert!(all < most);
        let species = pmap.transformed_species(&params);
        assert_relative_eq!(most, species[0].min(species[1]), epsilon = 1e-12);
    }

    #[test]
    fn test_empty_map() {
        let pmap = PseudoisomerMap::new();
        assert!(pmap.is_empty());
        assert_eq!(
            pmap.transform(&AqueousParams::default(), false),
            Err(PseudoisomerError::Empty)
        );
    }

    #[test]
    fn test_matrix_round_trip_and_add_all() {
        let mut a = PseudoisomerMap::new().with_reference("Alberty 2003");
        a.add(12, -4, 0, -2768.1);
        a.add(13, -3, 0, -2811.48);
        let m = a.to_matrix();
        assert_eq!(m.shape(), (2, 4));
        let b = PseudoisomerMap::from_matrix(&m).unwrap();
        assert_eq!(b.species(), a.species());
        let mut c = PseudoisomerMap::new();
        c.add_all(&a);
        assert_eq!(c.len(), 2);
        assert_eq!(c.reference.as_deref(), Some("Alberty 2003"));
        assert_eq!(c.get(13, -3, 0), vec![-2811.48]);
        assert!(PseudoisomerMap::from_matrix(&DMatrix::zeros(1, 3)).is_err());
        assert!(c.to_table_string().contains("-2768.10"));
    }
}
