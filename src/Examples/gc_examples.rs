use crate::GroupContribution::group_contribution::{GCOptions, GroupContribution, InMemoryCompounds};
use crate::GroupContribution::gc_errors::GroupContributionError;
use crate::GroupContribution::training_data::{PkaRecord, PseudoisomerRecord, UsageFlag};
use crate::Molecules::molecule_graph::Molecule;
use crate::Thermodynamics::pseudoisomer::AqueousParams;
use crate::Thermodynamics::thermodynamic_constants::default_T;

/// Alcohols, ketones and carboxylic acids, dG0_f in kJ/mol (Alberty tables).
pub fn acid_alcohol_training_set() -> (Vec<PseudoisomerRecord>, Vec<PkaRecord>) {
    let records = vec![
        PseudoisomerRecord::new("methanol", 4, 0, 0, -175.31, "CO").with_cid(132),
        PseudoisomerRecord::new("ethanol", 6, 0, 0, -181.64, "CCO").with_cid(469),
        PseudoisomerRecord::new("acetone", 6, 0, 0, -161.17, "CC(=O)C").with_cid(207),
        PseudoisomerRecord::new("glycerol", 8, 0, 0, -497.48, "OCC(O)CO").with_cid(116),
        PseudoisomerRecord::new("acetate", 3, -1, 0, -369.31, "CC(=O)[O-]").with_cid(33),
        PseudoisomerRecord::new("propanoate", 5, -1, 0, -361.08, "CCC(=O)[O-]").with_cid(163),
        PseudoisomerRecord::new("butanoate", 7, -1, 0, -352.63, "CCCC(=O)[O-]").with_cid(246),
        PseudoisomerRecord::new("lactate", 5, -1, 0, -516.72, "CC(O)C(=O)[O-]").with_cid(186),
        PseudoisomerRecord::new("pyruvate", 3, -1, 0, -472.27, "CC(=O)C(=O)[O-]")
            .with_cid(22)
            .with_usage(UsageFlag::Test),
    ];
    let pka = vec![PkaRecord {
        cid: Some(33),
        T: default_T,
        nH_below: 4,
        nH_above: 3,
        smiles_below: Some("CC(=O)O".to_string()),
        smiles_above: Some("CC(=O)[O-]".to_string()),
        pKa: 4.76,
    }];
    (records, pka)
}

pub fn acid_alcohol_compounds() -> InMemoryCompounds {
    let mut compounds = InMemoryCompounds::new();
    compounds.insert(1, "H2O", Some("O"));
    compounds.insert(22, "pyruvate", Some("CC(=O)C(=O)[O-]"));
    compounds.insert(33, "acetate", Some("CC(=O)[O-]"));
    compounds.insert(80, "H+", None);
    compounds.insert(186, "lactate", Some("CC(O)C(=O)[O-]"));
    compounds.insert(247, "2-propanol", Some("CC(C)O"));
    compounds.insert(6034, "1-butanol", Some("CCCCO"));
    compounds.insert(9999, "methanethiol", Some("CS"));
    compounds
}

/// Trains the default library on `acid_alcohol_training_set`.
pub fn trained_example_model() -> Result<GroupContribution, GroupContributionError> {
    let mut gc = GroupContribution::new(GCOptions::default());
    gc.load_default_groups()?;
    gc.set_compounds(Box::new(acid_alcohol_compounds()));
    let (records, pka) = acid_alcohol_training_set();
    gc.train(&records, &pka)?;
    Ok(gc)
}

pub fn gc_examples(task: usize) {
    let result = match task {
        // decomposition of single molecules
        0 => decomposition_example(),
        // training and the regression report
        1 => training_example(),
        // formation energies of compounds outside the training set
        2 => estimation_example(),
        // lactate dehydrogenase: pyruvate + NADH -> lactate, here only the organic half
        3 => reaction_example(),
        // leave-one-out cross validation
        4 => cross_validation_example(),
        _ => {
            println!("no such example: {}", task);
            Ok(())
        }
    };
    if let Err(e) = result {
        println!("Example {} failed: {}", task, e);
    }
}

fn decomposition_example() -> Result<(), GroupContributionError> {
    let mut gc = GroupContribution::new(GCOptions::default());
    gc.load_default_groups()?;
    for smiles in ["CC(=O)[O-]", "CC(O)C(=O)[O-]", "c1ccccc1O", "NCC(=O)O"] {
        let mol = Molecule::from_smiles(smiles)?.with_title(smiles);
        println!("{}", smiles);
        println!("{}", gc.analyze_decomposition(&mol, false, false)?);
        println!("pseudoisomers (nH, z, nMg): {:?}", gc.get_pseudoisomers(&mol)?);
    }
    Ok(())
}

fn training_example() -> Result<(), GroupContributionError> {
    let gc = trained_example_model()?;
    println!("{}", gc.write_regression_report(default_T, 7.0)?);
    for line in gc.nullspace_strings()? {
        println!("nullspace: {}", line);
    }
    Ok(())
}

fn estimation_example() -> Result<(), GroupContributionError> {
    let mut gc = trained_example_model()?;
    let params = AqueousParams::default();
    for cid in [22, 186, 247, 6034, 9999] {
        let name = gc.compounds().compound_name(cid).unwrap_or_default();
        match gc.estimate_dG0_keggcid(cid, &params, false) {
            Ok(dG0) => println!("{}: dG0' = {:.2} kJ/mol", name, dG0),
            Err(e) => println!("{}: {}", name, e),
        }
    }
    match gc.estimate_pka_keggcid(33, -1, default_T) {
        Ok(pka) => println!("acetate pKa = {:.2}", pka),
        Err(e) => println!("acetate pKa: {}", e),
    }
    gc.save_cid2pmap()?;
    for (cid, reason) in gc.cid2error() {
        println!("C{:05}: {}", cid, reason);
    }
    Ok(())
}

fn reaction_example() -> Result<(), GroupContributionError> {
    let mut gc = trained_example_model()?;
    // pyruvate + 2 H+ -> lactate, the electrons come from the cofactor
    let reaction = [(22, -1.0), (80, -2.0), (186, 1.0)];
    let params = AqueousParams::default();
    println!(
        "dG0' = {:.2} kJ/mol",
        gc.estimate_dG0_reaction(&reaction, &params, false)?
    );
    gc.set_concentration(22, "muscle", 1e-4);
    gc.set_concentration(186, "muscle", 1e-3);
    println!(
        "dG' (muscle) = {:.2} kJ/mol",
        gc.estimate_dG_reaction(&reaction, &params, 1e-3, Some("muscle"), false)?
    );
    let grid = gc.estimate_dG0_reaction_grid(
        &reaction,
        &[6.0, 7.0, 8.0],
        params.pMg,
        &[0.0, 0.1, 0.25],
        default_T,
        false,
    )?;
    println!("dG0' over pH (rows) and ionic strength (columns):{}", grid);
    Ok(())
}

fn cross_validation_example() -> Result<(), GroupContributionError> {
    let gc = trained_example_model()?;
    let report = gc.analyze_training_set()?;
    println!("{}", report);
    Ok(())
}
