#[cfg(test)]
mod tests {
    use crate::GroupContribution::gc_errors::GroupContributionError;
    use crate::GroupContribution::group_contribution::*;
    use crate::GroupContribution::group_vector::GroupVector;
    use crate::GroupContribution::groups_data::{GroupDefinition, GroupsData};
    use crate::GroupContribution::training_data::{
        PkaRecord, PseudoisomerRecord, TrainingData, UsageFlag,
    };
    use crate::Molecules::molecule_graph::Molecule;
    use crate::Thermodynamics::pseudoisomer::{AqueousParams, PseudoisomerMap};
    use crate::Thermodynamics::thermodynamic_constants::{R, default_T, rt_ln10};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    /// G1 = aliphatic carbon, G2 = oxygen carrying one proton and charge -1
    fn two_group_library() -> GroupsData {
        GroupsData::from_definitions(vec![
            GroupDefinition::new("G1", 0, 0, 0, "C", "all"),
            GroupDefinition::new("G2", 1, -1, 0, "O", "all"),
        ])
        .unwrap()
    }

    fn two_group_records() -> Vec<PseudoisomerRecord> {
        vec![
            PseudoisomerRecord::new("methane", 0, 0, 0, 10.0, "C").with_cid(10),
            PseudoisomerRecord::new("water", 1, -1, 0, 20.0, "O").with_cid(11),
            PseudoisomerRecord::new("methanol", 1, -1, 0, 30.5, "CO").with_cid(12),
            PseudoisomerRecord::new("ethanol", 1, -1, 0, 45.0, "CCO")
                .with_cid(13)
                .with_usage(UsageFlag::Test),
        ]
    }

    fn compounds(entries: &[(i64, &str, Option<&str>)]) -> Box<InMemoryCompounds> {
        let mut source = InMemoryCompounds::new();
        for (cid, name, smiles) in entries {
            source.insert(*cid, name, *smiles);
        }
        Box::new(source)
    }

    fn trained_two_group_model(options: GCOptions) -> GroupContribution {
        let mut gc = GroupContribution::new(options);
        gc.load_groups(two_group_library()).unwrap();
        gc.train(&two_group_records(), &[]).unwrap();
        gc
    }

    fn vector(gc: &GroupContribution, counts: [f64; 2]) -> GroupVector {
        GroupVector::with_origin(Arc::clone(gc.groups_data().unwrap()), counts)
    }

    #[test]
    fn test_end_to_end_exactly_determined() {
        let gc = trained_two_group_model(GCOptions::default());
        assert_eq!(gc.state(), ModelState::Trained);
        // the test compound is not a training row
        assert_eq!(gc.training_data().len(), 3);
        assert_eq!(gc.nullspace().unwrap().nrows(), 0);
        let c = gc.contributions().unwrap();
        assert_relative_eq!(c[0], 10.5, epsilon = 1e-8);
        assert_relative_eq!(c[1], 20.5, epsilon = 1e-8);
        assert_relative_eq!(c[2], -0.5, epsilon = 1e-8);

        // training rows are reproduced
        for (row, obs) in gc
            .training_data()
            .rows
            .iter()
            .zip(&gc.training_data().observations)
        {
            assert_relative_eq!(gc.groupvec2val(row).unwrap(), *obs, epsilon = 1e-8);
        }

        let pmap = gc
            .estimate_pmap(&Molecule::from_smiles("CCO").unwrap(), false)
            .unwrap();
        assert_eq!(pmap.len(), 1);
        let s = pmap.species()[0];
        assert_eq!((s.nH, s.z, s.nMg), (1, -1, 0));
        assert_relative_eq!(s.dG0, 41.0, epsilon = 1e-8);
    }

    #[test]
    fn test_estimation_requires_training() {
        let mut gc = GroupContribution::default();
        assert_eq!(gc.state(), ModelState::Uninitialized);
        let mol = Molecule::from_smiles("CO").unwrap();
        assert!(matches!(
            gc.estimate_pmap(&mol, false),
            Err(GroupContributionError::Configuration(_))
        ));
        gc.load_groups(two_group_library()).unwrap();
        assert_eq!(gc.state(), ModelState::GroupsLoaded);
        let v = vector(&gc, [1.0, 0.0]);
        assert!(matches!(
            gc.groupvec2val(&v),
            Err(GroupContributionError::Configuration(_))
        ));
        assert!(gc.analyze_training_set().is_err());
        assert!(matches!(
            gc.train(&[], &[]),
            Err(GroupContributionError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_training_data_names_the_groups() {
        let mut gc = GroupContribution::default();
        gc.load_groups(two_group_library()).unwrap();
        gc.train(
            &[
                PseudoisomerRecord::new("methane", 0, 0, 0, 10.0, "C"),
                PseudoisomerRecord::new("ethane", 0, 0, 0, 20.0, "CC"),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(gc.nullspace().unwrap().nrows(), 1);

        // vectors inside the span are still estimated
        let v = vector(&gc, [3.0, 0.0]);
        assert_relative_eq!(gc.groupvec2val(&v).unwrap(), 30.0, epsilon = 1e-8);

        match gc.estimate_pmap(&Molecule::from_smiles("CO").unwrap(), false) {
            Err(GroupContributionError::MissingTrainingData {
                missing_groups, ..
            }) => assert_eq!(missing_groups, vec!["G2 [H1 -1 0]".to_string()]),
            other => panic!("unexpected result {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_undecomposable_molecule() {
        let gc = trained_two_group_model(GCOptions::default());
        let err = gc
            .estimate_pmap(&Molecule::from_smiles("CN").unwrap().with_title("methylamine"), false)
            .unwrap_err();
        match err {
            GroupContributionError::Decomposition(e) => {
                assert!(e.message.contains("methylamine"));
                assert!(e.debug_table().contains("Unassigned nodes"));
            }
            other => panic!("unexpected error {}", other),
        }
        let table = gc
            .analyze_decomposition(&Molecule::from_smiles("CN").unwrap(), false, false)
            .unwrap();
        assert!(table.contains("G1"));
    }

    #[test]
    fn test_training_compound_without_smiles_is_rejected() {
        let mut gc = GroupContribution::default();
        gc.load_groups(two_group_library()).unwrap();
        let mut record = PseudoisomerRecord::new("mystery", 0, 0, 0, 1.0, "");
        record.smiles = None;
        assert!(matches!(
            gc.train(&[record], &[]),
            Err(GroupContributionError::Configuration(_))
        ));
        let skipped = PseudoisomerRecord::new("skipped", 0, 0, 0, 1.0, "N").with_usage(UsageFlag::Skip);
        let methane = PseudoisomerRecord::new("methane", 0, 0, 0, 10.0, "C");
        gc.train(&[skipped, methane], &[]).unwrap();
        assert_eq!(gc.training_data().len(), 1);
        // records without identity get negative ids
        assert!(gc.observed_pmap(-2).is_some());
    }

    #[test]
    fn test_cid2pmap_prefers_measurements() {
        let mut gc = trained_two_group_model(GCOptions::default());
        gc.set_compounds(compounds(&[
            (12, "methanol", Some("CCO")),
            (13, "ethanol", Some("CCO")),
            (14, "propanol", Some("CCCO")),
            (15, "unknown", None),
            (16, "methylamine", Some("CN")),
        ]));
        // measured value wins over the estimate
        assert_relative_eq!(gc.cid2pmap(12).unwrap().species()[0].dG0, 30.5, epsilon = 1e-8);
        assert_relative_eq!(gc.cid2pmap(13).unwrap().species()[0].dG0, 45.0, epsilon = 1e-12);
        assert_relative_eq!(gc.cid2pmap(14).unwrap().species()[0].dG0, 51.5, epsilon = 1e-8);
        let proton = gc.cid2pmap(PROTON_CID).unwrap();
        assert_eq!(proton.get(0, 0, 0), vec![0.0]);
        assert!(matches!(
            gc.cid2pmap(15),
            Err(GroupContributionError::MissingCompoundFormationEnergy { cid: 15, .. })
        ));
        assert!(matches!(
            gc.cid2pmap(16),
            Err(GroupContributionError::MissingCompoundFormationEnergy { cid: 16, .. })
        ));
    }

    #[test]
    fn test_cid2pmap_without_override() {
        let options = GCOptions {
            override_gc_with_measurements: false,
            ..GCOptions::default()
        };
        let mut gc = trained_two_group_model(options);
        gc.set_compounds(compounds(&[
            (11, "water", Some("CN")),
            (12, "methanol", Some("CCO")),
            (13, "ethanol", Some("CCO")),
        ]));
        // estimate of the structure the source gives
        assert_relative_eq!(gc.cid2pmap(12).unwrap().species()[0].dG0, 41.0, epsilon = 1e-8);
        // held out compounds keep their measurement
        assert_relative_eq!(gc.cid2pmap(13).unwrap().species()[0].dG0, 45.0, epsilon = 1e-12);
        // estimation fails, the measurement is the fallback
        assert_relative_eq!(gc.cid2pmap(11).unwrap().species()[0].dG0, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_save_cid2pmap_records_reasons() {
        let mut gc = trained_two_group_model(GCOptions::default());
        gc.set_compounds(compounds(&[
            (12, "methanol", Some("CO")),
            (14, "propanol", Some("CCCO")),
            (15, "unknown", None),
            (16, "methylamine", Some("CN")),
            (17, "broken", Some("C(C")),
        ]));
        gc.save_cid2pmap().unwrap();
        assert_eq!(gc.state(), ModelState::EstimationReady);
        let reasons = gc.cid2error();
        assert_eq!(reasons[&14], "OK");
        assert_eq!(reasons[&15], "no structure");
        assert_eq!(reasons[&16], "cannot decompose into groups");
        assert_eq!(reasons[&17], "cannot determine molecular structure");

        // the cache answers from now on, measured compounds included
        assert_relative_eq!(gc.cid2pmap(14).unwrap().species()[0].dG0, 51.5, epsilon = 1e-8);
        assert_relative_eq!(gc.cid2pmap(13).unwrap().species()[0].dG0, 45.0, epsilon = 1e-12);
        assert!(matches!(
            gc.cid2pmap(16),
            Err(GroupContributionError::MissingCompoundFormationEnergy { .. })
        ));

        let tables = gc.to_tables().unwrap();
        assert!(tables.gc_cid2prm.iter().any(|r| r.cid == 14 && r.estimated));
        assert!(tables.gc_cid2prm.iter().any(|r| r.cid == 13 && !r.estimated));
        let mut restored = GroupContribution::default();
        restored.load_tables(&tables).unwrap();
        assert_eq!(restored.state(), ModelState::EstimationReady);
        assert!(restored.test_set().contains(&13));
        assert_relative_eq!(
            restored.cid2pmap(14).unwrap().species()[0].dG0,
            51.5,
            epsilon = 1e-8
        );

        gc.clear_cache();
        assert_eq!(gc.state(), ModelState::Trained);
    }

    #[test]
    fn test_reaction_energies() {
        let mut gc = trained_two_group_model(GCOptions::default());
        gc.set_compounds(compounds(&[
            (10, "methane", Some("C")),
            (12, "methanol", Some("CO")),
            (14, "propanol", Some("CCCO")),
        ]));
        let params = AqueousParams::new(7.0, 14.0, 0.1, default_T);
        let reaction = [(10, -1.0), (12, 1.0)];

        let single = |nH: i32, z: i32, dG0: f64| {
            let mut pmap = PseudoisomerMap::new();
            pmap.add(nH, z, 0, dG0);
            pmap.transform(&params, false).unwrap()
        };
        let expected = single(1, -1, 30.5) - single(0, 0, 10.0);
        let dG0_r = gc.estimate_dG0_reaction(&reaction, &params, false).unwrap();
        assert_relative_eq!(dG0_r, expected, epsilon = 1e-8);

        // default concentration 1 M leaves dG' = dG0'
        let dG_r = gc
            .estimate_dG_reaction(&reaction, &params, 1.0, None, false)
            .unwrap();
        assert_relative_eq!(dG_r, dG0_r, epsilon = 1e-10);

        gc.set_concentration(10, "cytoplasm", 1e-2);
        gc.set_concentration(12, "cytoplasm", 1e-3);
        assert_eq!(gc.media_list(), &["cytoplasm".to_string()]);
        assert_eq!(gc.get_concentration(WATER_CID, 1e-3, Some("cytoplasm")), 1.0);
        assert_eq!(gc.get_concentration(14, 1e-4, Some("cytoplasm")), 1e-4);
        assert_eq!(
            gc.get_concentration_list(12, 1.0),
            vec![("cytoplasm".to_string(), 1e-3)]
        );
        let dG_media = gc
            .estimate_dG_reaction(&reaction, &params, 1.0, Some("cytoplasm"), false)
            .unwrap();
        let correction = R * default_T * ((1e-3f64).ln() - (1e-2f64).ln());
        assert_relative_eq!(dG_media, dG0_r + correction, epsilon = 1e-8);

        let grid = gc
            .estimate_dG0_reaction_grid(&reaction, &[6.0, 7.0], 14.0, &[0.0, 0.1], default_T, false)
            .unwrap();
        assert_eq!(grid.shape(), (2, 2));
        assert_relative_eq!(grid[(1, 1)], dG0_r, epsilon = 1e-8);

        let rvec = gc.rid2groupvec(&[(10, -1.0), (12, 1.0), (PROTON_CID, 1.0)]).unwrap();
        assert_eq!(rvec.as_slice(), &[0.0, 1.0, 0.0]);
        let cvec = gc.cid2groupvec(14).unwrap();
        assert_eq!(cvec.as_slice(), &[3.0, 1.0, 1.0]);
        let matrix = gc.cid_group_matrix().unwrap();
        assert!(matrix.lines().any(|l| l == "14,3,1,1"));
    }

    #[test]
    fn test_leave_one_out() {
        let mut gc = GroupContribution::default();
        gc.load_groups(two_group_library()).unwrap();
        let gd = Arc::clone(gc.groups_data().unwrap());
        let mut data = TrainingData::new();
        data.push(GroupVector::with_origin(gd.clone(), [1.0, 0.0]), 10.0, "r1".into());
        data.push(GroupVector::with_origin(gd.clone(), [0.0, 1.0]), 20.0, "r2".into());
        data.push(GroupVector::with_origin(gd.clone(), [1.0, 1.0]), 30.5, "r3".into());
        data.push(GroupVector::with_origin(gd, [2.0, 1.0]), 41.5, "r4".into());
        gc.train_on(data).unwrap();

        let report = gc.analyze_training_set().unwrap();
        let mut names: Vec<&str> = report.deviations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(&names[2..], &["r3", "r1"]);
        names[..2].sort();
        assert_eq!(&names[..2], &["r2", "r4"]);
        assert_relative_eq!(report.deviations[0].error.unwrap(), 0.5, epsilon = 1e-8);
        assert_relative_eq!(report.deviations[1].error.unwrap(), 0.5, epsilon = 1e-8);
        assert_relative_eq!(report.deviations[2].error.unwrap(), -0.25, epsilon = 1e-8);
        // without r1 the origin and G1 cannot be told apart
        assert!(report.deviations[3].error.is_none());
        assert_eq!(report.deviations[3].remark, "linearly independent example");
        assert_eq!(report.scored().count(), 3);
        assert_relative_eq!(report.mean_error, 0.25, epsilon = 1e-8);
        assert_relative_eq!(report.std_error, 0.125f64.sqrt(), epsilon = 1e-8);
        assert_relative_eq!(report.rmse, 0.1875f64.sqrt(), epsilon = 1e-8);
        assert!(report.to_table_string().contains("RMSE"));

        let regression = gc.write_regression_report(default_T, 7.0).unwrap();
        assert!(regression.contains("origin"));
        assert!(regression.contains("r4"));
    }

    /// C, a protonated hydroxyl and a deprotonated oxygen sharing the name "O"
    fn hydroxyl_model() -> GroupContribution {
        let mut gc = GroupContribution::default();
        gc.load_groups(
            GroupsData::from_definitions(vec![
                GroupDefinition::new("C", 0, 0, 0, "C", "all"),
                GroupDefinition::new("O", 1, 0, 0, "[OH1]", "all"),
                GroupDefinition::new("O", 0, -1, 0, "[O-]", "all"),
            ])
            .unwrap(),
        )
        .unwrap();
        let pka = vec![
            PkaRecord {
                cid: Some(30),
                T: default_T,
                nH_below: 1,
                nH_above: 0,
                smiles_below: Some("CO".into()),
                smiles_above: Some("C[O-]".into()),
                pKa: 15.0,
            },
            PkaRecord {
                cid: Some(31),
                T: default_T,
                nH_below: 1,
                nH_above: 0,
                smiles_below: Some("CCO".into()),
                smiles_above: Some("CC[O-]".into()),
                pKa: 16.0,
            },
            PkaRecord {
                cid: None,
                T: default_T,
                nH_below: 1,
                nH_above: 0,
                smiles_below: Some("CO".into()),
                smiles_above: Some("C[O-]".into()),
                pKa: 99.0,
            },
        ];
        let records = vec![
            PseudoisomerRecord::new("methane", 0, 0, 0, 10.0, "C"),
            PseudoisomerRecord::new("methanol", 1, 0, 0, 30.0, "CO"),
            PseudoisomerRecord::new("ethanol", 1, 0, 0, 40.0, "CCO"),
        ];
        gc.train(&records, &pka).unwrap();
        gc
    }

    #[test]
    fn test_pka_rows_are_merged() {
        let gc = hydroxyl_model();
        let data = gc.training_data();
        // one merged pKa row first, then the formation energies
        assert_eq!(data.len(), 4);
        assert!(data.names[0].starts_with("pKa ("));
        assert!(data.names[0].contains("C00030 [0->1]"));
        assert!(data.names[0].contains("C00031 [0->1]"));
        assert_relative_eq!(data.observations[0], rt_ln10(default_T) * 15.5, epsilon = 1e-9);
        assert_eq!(data.rows[0].origin(), 0.0);
        assert_eq!(data.rows[0].net_charge(), -1);
        assert_eq!(data.rows[0].hydrogens(), -1);

        assert_relative_eq!(gc.get_pka_group("O", 1, 0, 0).unwrap(), 15.5, epsilon = 1e-8);
        assert_relative_eq!(gc.get_group_contribution("C", 0, 0, 0).unwrap(), 10.0, epsilon = 1e-8);
        assert!(matches!(
            gc.get_group_contribution("N", 0, 0, 0),
            Err(GroupContributionError::Configuration(_))
        ));
        assert!(gc.get_pk_mg_group("O", 0, 0, 1).is_err());
        // pKa rows are not part of the cross validation
        let report = gc.analyze_training_set().unwrap();
        assert!(report.deviations.iter().all(|d| !d.name.starts_with("pKa")));
    }

    #[test]
    fn test_pseudoisomers_and_pka_of_a_compound() {
        let mut gc = hydroxyl_model();
        gc.set_compounds(compounds(&[(41, "methanol", Some("CO"))]));
        let mol = Molecule::from_smiles("CO").unwrap();
        assert_eq!(gc.get_pseudoisomers(&mol).unwrap(), vec![(0, -1, 0), (1, 0, 0)]);
        assert_eq!(gc.cid2pseudoisomers(41).unwrap(), vec![(0, -1, 0), (1, 0, 0)]);

        let pmap = gc.cid2pmap(41).unwrap();
        assert_eq!(pmap.len(), 2);
        let v = rt_ln10(default_T) * 15.5;
        assert_relative_eq!(pmap.get(1, 0, 0)[0], 30.0, epsilon = 1e-8);
        assert_relative_eq!(pmap.get(0, -1, 0)[0], 30.0 + v, epsilon = 1e-8);
        assert_relative_eq!(gc.estimate_pka_keggcid(41, -1, default_T).unwrap(), 15.5, epsilon = 1e-8);
        assert!(matches!(
            gc.estimate_pka_keggcid(41, 3, default_T),
            Err(GroupContributionError::MissingTrainingData { .. })
        ));

        let params = AqueousParams::default();
        let dG0 = gc.estimate_dG0(&mol, &params).unwrap();
        assert_relative_eq!(dG0, pmap.transform(&params, false).unwrap(), epsilon = 1e-9);
        let most = gc.estimate_dG0_keggcid(41, &params, true).unwrap();
        assert!(dG0 <= most);
    }

    #[test]
    fn test_failed_retrain_keeps_measurements() {
        let mut gc = trained_two_group_model(GCOptions::default());
        let contributions = gc.contributions().unwrap().clone();
        let retrain = vec![
            PseudoisomerRecord::new("methane", 0, 0, 0, 99.0, "C").with_cid(10),
            PseudoisomerRecord::new("methylamine", 0, 0, 0, 5.0, "CN").with_cid(14),
        ];
        assert!(matches!(
            gc.train(&retrain, &[]),
            Err(GroupContributionError::Decomposition(_))
        ));
        assert_eq!(gc.state(), ModelState::Trained);
        assert_eq!(gc.contributions().unwrap(), &contributions);
        assert_relative_eq!(gc.cid2pmap(10).unwrap().species()[0].dG0, 10.0);
        assert_relative_eq!(gc.cid2pmap(13).unwrap().species()[0].dG0, 45.0);
        assert!(gc.test_set().contains(&13));
        assert!(gc.observed_pmap(14).is_none());
    }
}
