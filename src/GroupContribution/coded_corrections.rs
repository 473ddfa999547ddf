//! Groups whose count is computed from the molecule instead of a substructure match.
//!
//! Every correction implements `CorrectionCounter`; `CodedCorrection` dispatches to the
//! concrete counters through `enum_dispatch`, the same way the thermodynamic calculators
//! of the crate are dispatched.
use crate::Molecules::molecule_graph::Molecule;
use enum_dispatch::enum_dispatch;

#[enum_dispatch]
pub trait CorrectionCounter {
    /// number of times the correction applies to `mol`
    fn count(&self, mol: &Molecule) -> usize;
    /// library name of the correction group
    fn group_name(&self) -> &'static str;
}

/// Cyclomatic number of the molecular graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingCount;

impl CorrectionCounter for RingCount {
    fn count(&self, mol: &Molecule) -> usize {
        mol.ring_count()
    }

    fn group_name(&self) -> &'static str {
        "*Ring"
    }
}

/// Smallest rings made of aromatic atoms only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AromaticRingCount;

impl CorrectionCounter for AromaticRingCount {
    fn count(&self, mol: &Molecule) -> usize {
        aromatic_rings(mol).count()
    }

    fn group_name(&self) -> &'static str {
        "*AromaticRing"
    }
}

/// Aromatic smallest rings holding at least one atom other than carbon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeteroaromaticRingCount;

impl CorrectionCounter for HeteroaromaticRingCount {
    fn count(&self, mol: &Molecule) -> usize {
        aromatic_rings(mol)
            .filter(|ring| ring.iter().any(|&i| mol.atom(i).atomic_num != 6))
            .count()
    }

    fn group_name(&self) -> &'static str {
        "*HeteroaromaticRing"
    }
}

fn aromatic_rings(mol: &Molecule) -> impl Iterator<Item = Vec<usize>> + '_ {
    mol.smallest_rings()
        .into_iter()
        .filter(move |ring| ring.iter().all(|&i| mol.atom(i).aromatic))
}

#[enum_dispatch(CorrectionCounter)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedCorrection {
    RingCount(RingCount),
    AromaticRingCount(AromaticRingCount),
    HeteroaromaticRingCount(HeteroaromaticRingCount),
}

impl CodedCorrection {
    pub fn all() -> Vec<CodedCorrection> {
        vec![
            RingCount.into(),
            AromaticRingCount.into(),
            HeteroaromaticRingCount.into(),
        ]
    }

    pub fn from_group_name(name: &str) -> Option<CodedCorrection> {
        Self::all().into_iter().find(|c| c.group_name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_corrections() {
        let naphthalene = Molecule::from_smiles("c1ccc2ccccc2c1").unwrap();
        let pyridine = Molecule::from_smiles("c1ccncc1").unwrap();
        let cyclohexanol = Molecule::from_smiles("OC1CCCCC1").unwrap();
        let ethanol = Molecule::from_smiles("CCO").unwrap();

        let ring: CodedCorrection = RingCount.into();
        let aromatic: CodedCorrection = AromaticRingCount.into();
        let hetero: CodedCorrection = HeteroaromaticRingCount.into();

        assert_eq!(ring.count(&naphthalene), 2);
        assert_eq!(aromatic.count(&naphthalene), 2);
        assert_eq!(hetero.count(&naphthalene), 0);
        assert_eq!(hetero.count(&pyridine), 1);
        assert_eq!(ring.count(&cyclohexanol), 1);
        assert_eq!(aromatic.count(&cyclohexanol), 0);
        assert_eq!(ring.count(&ethanol), 0);
    }

    #[test]
    fn test_lookup_by_group_name() {
        assert_eq!(
            CodedCorrection::from_group_name("*AromaticRing"),
            Some(CodedCorrection::AromaticRingCount(AromaticRingCount))
        );
        assert!(CodedCorrection::from_group_name("-CH3").is_none());
        assert_eq!(CodedCorrection::all().len(), 3);
    }
}
