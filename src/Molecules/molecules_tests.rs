#[cfg(test)]
mod tests {
    use crate::Molecules::molecule_graph::{Atom, BondOrder, Molecule, MoleculeError};
    use crate::Molecules::smarts::Pattern;

    #[test]
    fn test_smiles_implicit_hydrogens() {
        let ethanol = Molecule::from_smiles("CCO").unwrap();
        assert_eq!(ethanol.atom_count(), 3);
        assert_eq!(ethanol.bond_count(), 2);
        assert_eq!(ethanol.total_h(0), 3);
        assert_eq!(ethanol.total_h(1), 2);
        assert_eq!(ethanol.total_h(2), 1);
        assert_eq!(ethanol.hydrogen_count(), 6);
        assert_eq!(ethanol.net_charge(), 0);
    }

    #[test]
    fn test_smiles_bracket_atoms() {
        let acetate = Molecule::from_smiles("CC(=O)[O-]").unwrap();
        assert_eq!(acetate.atom(3).formal_charge, -1);
        assert_eq!(acetate.atom(3).implicit_h, 0);
        assert_eq!(acetate.bond_between(1, 2), Some(BondOrder::Double));
        assert_eq!(acetate.hydrogen_count(), 3);
        assert_eq!(acetate.net_charge(), -1);

        let ammonium = Molecule::from_smiles("C[NH3+]").unwrap();
        assert_eq!(ammonium.total_h(1), 3);
        assert_eq!(ammonium.atom(1).formal_charge, 1);

        let magnesium = Molecule::from_smiles("[Mg+2]").unwrap();
        assert_eq!(magnesium.atom(0).atomic_num, 12);
        assert_eq!(magnesium.net_charge(), 2);
    }

    #[test]
    fn test_smiles_explicit_hydrogen() {
        let h2 = Molecule::from_smiles("[H][H]").unwrap();
        assert_eq!(h2.atom_count(), 2);
        assert_eq!(h2.hydrogen_atoms(), vec![0, 1]);
        assert_eq!(h2.hydrogen_count(), 2);
    }

    #[test]
    fn test_smiles_rings_and_aromaticity() {
        let benzene = Molecule::from_smiles("c1ccccc1").unwrap();
        assert_eq!(benzene.bond_count(), 6);
        assert_eq!(benzene.ring_count(), 1);
        assert!(benzene.atoms().all(|(i, a)| a.aromatic && benzene.total_h(i) == 1));
        assert_eq!(benzene.bond_between(0, 5), Some(BondOrder::Aromatic));

        let naphthalene = Molecule::from_smiles("c1ccc2ccccc2c1").unwrap();
        assert_eq!(naphthalene.ring_count(), 2);
        assert_eq!(naphthalene.hydrogen_count(), 8);
        let rings = naphthalene.smallest_rings();
        assert_eq!(rings.len(), 2);
        assert!(rings.iter().all(|r| r.len() == 6));

        let pyrrole = Molecule::from_smiles("c1cc[nH]c1").unwrap();
        assert_eq!(pyrrole.total_h(3), 1);
    }

    #[test]
    fn test_ring_info_excludes_bridges() {
        let toluene = Molecule::from_smiles("Cc1ccccc1").unwrap();
        let info = toluene.ring_info();
        assert!(!info.atoms[0]);
        assert!(info.atoms[1]);
        assert!(!info.bond_in_ring(0, 1));
        assert!(info.bond_in_ring(1, 2));
    }

    #[test]
    fn test_smiles_errors() {
        assert_eq!(
            Molecule::from_smiles("CC(C").unwrap_err(),
            MoleculeError::UnbalancedBranch
        );
        assert_eq!(
            Molecule::from_smiles("C1CC").unwrap_err(),
            MoleculeError::UnclosedRing(1)
        );
        assert!(matches!(
            Molecule::from_smiles("CQ"),
            Err(MoleculeError::Parse { .. })
        ));
        assert!(matches!(
            Molecule::from_smiles("[Xx]"),
            Err(MoleculeError::Parse { .. }) | Err(MoleculeError::UnknownElement(_))
        ));
    }

    #[test]
    fn test_manual_construction() {
        let mut mol = Molecule::new("water");
        let o = mol.add_atom(Atom::new(8).with_hydrogens(2));
        assert_eq!(mol.total_h(o), 2);
        let c = mol.add_atom(Atom::new(6));
        assert!(mol.add_bond(o, c, BondOrder::Single).is_ok());
        assert_eq!(
            mol.add_bond(o, c, BondOrder::Single),
            Err(MoleculeError::InvalidBond { from: 0, to: 1 })
        );
        assert!(mol.add_bond(o, 7, BondOrder::Single).is_err());
    }

    #[test]
    fn test_pattern_hydroxyl_and_methyl() {
        let ethanol = Molecule::from_smiles("CCO").unwrap();
        let hydroxyl = Pattern::new("[OX2H1][#6]").unwrap();
        assert_eq!(hydroxyl.atom_count(), 2);
        assert_eq!(hydroxyl.find_all(&ethanol), vec![vec![2, 1]]);
        let methyl = Pattern::new("[CX4H3]").unwrap();
        assert_eq!(methyl.find_all(&ethanol), vec![vec![0]]);
        let methylene = Pattern::new("[CX4H2]").unwrap();
        assert_eq!(methylene.find_all(&ethanol), vec![vec![1]]);
    }

    #[test]
    fn test_pattern_carboxylate_or_expression() {
        let acetate = Molecule::from_smiles("CC(=O)[O-]").unwrap();
        let carboxylate = Pattern::new("C(=O)[O-]").unwrap();
        assert_eq!(carboxylate.find_all(&acetate), vec![vec![1, 2, 3]]);
        let acid = Pattern::new("C(=O)[OH]").unwrap();
        assert!(acid.find_all(&acetate).is_empty());
        let either = Pattern::new("C(=O)[OH,O-]").unwrap();
        assert_eq!(either.find_all(&acetate).len(), 1);
    }

    #[test]
    fn test_pattern_embeddings_are_unique_by_atom_set() {
        let propane = Molecule::from_smiles("CCC").unwrap();
        let pair = Pattern::new("CC").unwrap();
        let found = pair.find_all(&propane);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], vec![0, 1]);
        assert_eq!(found[1], vec![1, 2]);
    }

    #[test]
    fn test_pattern_bond_queries() {
        let acetone = Molecule::from_smiles("CC(=O)C").unwrap();
        assert!(Pattern::new("C=O").unwrap().matches(&acetone));
        assert!(!Pattern::new("C-O").unwrap().matches(&acetone));
        assert!(Pattern::new("C~O").unwrap().matches(&acetone));
        let ketone = Pattern::new("[CX3H0](=O)([#6])[#6]").unwrap();
        assert_eq!(ketone.find_all(&acetone).len(), 1);
    }

    #[test]
    fn test_pattern_aromatic_and_ring_primitives() {
        let toluene = Molecule::from_smiles("Cc1ccccc1").unwrap();
        assert_eq!(Pattern::new("[cH1]").unwrap().find_all(&toluene).len(), 5);
        assert_eq!(Pattern::new("[cH0]").unwrap().find_all(&toluene).len(), 1);
        assert_eq!(Pattern::new("[C;R0]").unwrap().find_all(&toluene).len(), 1);
        assert_eq!(Pattern::new("[a]").unwrap().find_all(&toluene).len(), 6);
        assert_eq!(Pattern::new("[!a]").unwrap().find_all(&toluene).len(), 1);
        assert!(Pattern::new("c@c").unwrap().matches(&toluene));
        assert!(!Pattern::new("C@c").unwrap().matches(&toluene));
    }

    #[test]
    fn test_pattern_shared_ring_perception() {
        let mol = Molecule::from_smiles("CC1CCCCC1O").unwrap();
        let rings = mol.ring_info();
        for smarts in ["[C;R0]", "[C;R]", "[OX2H1][C;R]", "C@C"] {
            let pattern = Pattern::new(smarts).unwrap();
            assert_eq!(
                pattern.find_all_with_rings(&mol, &rings),
                pattern.find_all(&mol),
                "{}",
                smarts
            );
        }
        let chain = Pattern::new("[C;R0]").unwrap();
        assert_eq!(chain.find_all_with_rings(&mol, &rings), vec![vec![0]]);
    }

    #[test]
    fn test_pattern_ring_closure_in_query() {
        let cyclohexane = Molecule::from_smiles("C1CCCCC1").unwrap();
        let hexane = Molecule::from_smiles("CCCCCC").unwrap();
        let ring = Pattern::new("C1CCCCC1").unwrap();
        assert_eq!(ring.find_all(&cyclohexane).len(), 1);
        assert!(ring.find_all(&hexane).is_empty());
    }

    #[test]
    fn test_pattern_hydrogen_atom() {
        let h2 = Molecule::from_smiles("[H][H]").unwrap();
        let hydrogen = Pattern::new("[H]").unwrap();
        assert_eq!(hydrogen.find_all(&h2).len(), 2);
        let proton = Molecule::from_smiles("[H+]").unwrap();
        assert_eq!(Pattern::new("[H+]").unwrap().find_all(&proton).len(), 1);
        assert!(Pattern::new("[H+]").unwrap().find_all(&h2).is_empty());
    }

    #[test]
    fn test_pattern_disconnected_components() {
        let salt = Molecule::from_smiles("COP(=O)([O-])[O-].[Mg+2]").unwrap();
        let mg = Pattern::new("[Mg+2]").unwrap();
        assert_eq!(mg.find_all(&salt), vec![vec![6]]);
        let both = Pattern::new("C.[Mg+2]").unwrap();
        assert_eq!(both.find_all(&salt), vec![vec![0, 6]]);
    }

    #[test]
    fn test_pattern_parse_errors() {
        assert!(Pattern::new("C(C").is_err());
        assert!(Pattern::new("[C").is_err());
        assert!(Pattern::new("[C$]").is_err());
        assert!(Pattern::new("=C").is_err());
    }
}
