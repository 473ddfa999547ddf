use super::cli_examples::examples_menu;
use crate::GroupContribution::gc_errors::GroupContributionError;
use crate::GroupContribution::group_contribution::{GroupContribution, InMemoryCompounds};
use crate::GroupContribution::groups_data::GroupsData;
use crate::Molecules::molecule_graph::Molecule;
use crate::Thermodynamics::pseudoisomer::AqueousParams;
use crate::Utils::load_from_file::LoadData;
use crate::settings::{GCSettings, with_settings, with_settings_mut};
use log::{info, warn};
use std::io::{self, Write};
use std::path::Path;

/// Interactive session; the trained model lives until the menu is left.
pub fn run_interactive_menu() {
    let mut model: Option<GroupContribution> = None;
    loop {
        show_main_menu();
        let choice = get_user_input();

        let result = match choice.trim() {
            "1" => decompose_smiles(),
            "2" => train_model(&mut model),
            "3" => with_model(&model, estimate_compound),
            "4" => with_model(&model, estimate_reaction),
            "5" => with_model(&model, |gc| {
                println!("{}", gc.analyze_training_set()?);
                Ok(())
            }),
            "6" => with_model(&model, |gc| {
                let params = with_settings(|m| m.get_config().aqueous);
                println!("{}", gc.write_regression_report(params.temperature, params.pH)?);
                Ok(())
            }),
            "7" => estimate_all(&mut model),
            "8" => with_model(&model, save_tables),
            "9" => load_tables(&mut model),
            "10" => {
                settings_menu();
                Ok(())
            }
            "11" => {
                examples_menu();
                Ok(())
            }
            "0" => {
                println!("Goodbye!");
                break;
            }
            _ => {
                println!("Invalid choice. Please try again.");
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("\x1b[31mError: {}\x1b[0m", e);
        }
    }
}
/* colors
Blue (\x1b[34m) - Welcome header text

Yellow (\x1b[33m) - Menu options

Cyan (\x1b[36m) - prompts

Red (\x1b[31m) - errors
*/
fn show_main_menu() {
    println!(
        "\x1b[34m\n Welcome to GibbsGC: group contribution estimation of Gibbs energies\n
    of formation of biochemical compounds and reactions \n \x1b[0m"
    );
    println!("\x1b[33m1. Decompose a SMILES string into groups\x1b[0m");
    println!("\x1b[33m2. Train model from task files\x1b[0m");
    println!("\x1b[33m3. Estimate a compound\x1b[0m");
    println!("\x1b[33m4. Estimate a reaction\x1b[0m");
    println!("\x1b[33m5. Leave-one-out report\x1b[0m");
    println!("\x1b[33m6. Regression report\x1b[0m");
    println!("\x1b[33m7. Estimate all compounds\x1b[0m");
    println!("\x1b[33m8. Save tables\x1b[0m");
    println!("\x1b[33m9. Load tables\x1b[0m");
    println!("\x1b[33m10. Settings\x1b[0m");
    println!("\x1b[33m11. Examples\x1b[0m");
    println!("\x1b[33m0. Exit\x1b[0m");
    prompt("Enter your choice: ");
}

pub(crate) fn prompt(text: &str) {
    print!("\x1b[36m{}\x1b[0m", text);
    let _ = io::stdout().flush();
}

pub(crate) fn get_user_input() -> String {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        warn!("Failed to read input: {}", e);
    }
    input
}

fn with_model<F>(model: &Option<GroupContribution>, f: F) -> Result<(), GroupContributionError>
where
    F: FnOnce(&GroupContribution) -> Result<(), GroupContributionError>,
{
    match model {
        Some(gc) => f(gc),
        None => Err(GroupContributionError::configuration(
            "no model yet, train one or load tables first",
        )),
    }
}

/// Groups and compounds per the settings; training is left to the caller.
fn prepare_model(settings: &GCSettings) -> Result<GroupContribution, GroupContributionError> {
    let mut gc = GroupContribution::new(settings.model);
    match &settings.groups_file {
        Some(path) => gc.load_groups(GroupsData::from_json_file(Path::new(path))?)?,
        None => gc.load_default_groups()?,
    }
    if Path::new(&settings.compounds_file).exists() {
        let loader = LoadData::new(settings.compounds_file.clone());
        let entries = loader
            .load_compounds()
            .map_err(GroupContributionError::configuration)?;
        info!("{} compounds loaded", entries.len());
        gc.set_compounds(Box::new(InMemoryCompounds::from_entries(entries)));
        for record in loader
            .load_concentrations()
            .map_err(GroupContributionError::configuration)?
        {
            gc.set_concentration(record.cid, &record.media, record.concentration);
        }
    } else {
        warn!(
            "compounds file {} not found, only SMILES input is available",
            settings.compounds_file
        );
    }
    Ok(gc)
}

fn train_model(model: &mut Option<GroupContribution>) -> Result<(), GroupContributionError> {
    let settings = with_settings(|m| m.get_config().clone());
    let mut gc = prepare_model(&settings)?;
    let loader = LoadData::new(settings.training_file.clone());
    let records = loader
        .load_pseudoisomers()
        .map_err(GroupContributionError::configuration)?;
    let pka = loader
        .load_pka()
        .map_err(GroupContributionError::configuration)?;
    gc.train(&records, &pka)?;
    println!(
        "Trained on {} observations, {} groups",
        gc.training_data().len(),
        gc.groups_data()?.count()
    );
    *model = Some(gc);
    Ok(())
}

fn decompose_smiles() -> Result<(), GroupContributionError> {
    prompt("Enter SMILES: ");
    let smiles = get_user_input();
    let smiles = smiles.trim();
    let mol = Molecule::from_smiles(smiles)?.with_title(smiles);
    let settings = with_settings(|m| m.get_config().clone());
    let gc = prepare_model(&settings)?;
    println!("{}", gc.analyze_decomposition(&mol, false, false)?);
    println!("pseudoisomers (nH, z, nMg): {:?}", gc.get_pseudoisomers(&mol)?);
    Ok(())
}

/// A number is read as a compound id, anything else as SMILES.
fn estimate_compound(gc: &GroupContribution) -> Result<(), GroupContributionError> {
    prompt("Enter compound id or SMILES: ");
    let input = get_user_input();
    let input = input.trim();
    let params = with_settings(|m| m.get_config().aqueous);
    let pmap = match input.parse::<i64>() {
        Ok(cid) => gc.cid2pmap(cid)?,
        Err(_) => {
            let mol = Molecule::from_smiles(input)?.with_title(input);
            gc.estimate_pmap(&mol, false)?
        }
    };
    println!("{}", pmap.to_table_string());
    match pmap.transform(&params, false) {
        Ok(dG0) => println!(
            "dG0' = {:.2} kJ/mol at pH {}, pMg {}, I {} M, T {} K",
            dG0, params.pH, params.pMg, params.ionic_strength, params.temperature
        ),
        Err(e) => println!("{}", e),
    }
    Ok(())
}

fn estimate_reaction(gc: &GroupContribution) -> Result<(), GroupContributionError> {
    prompt("Enter reaction as cid:coefficient pairs (e.g. 22:-1 80:-2 186:1): ");
    let reaction = parse_reaction(&get_user_input())?;
    let params = with_settings(|m| m.get_config().aqueous);
    println!(
        "dG0' = {:.2} kJ/mol",
        gc.estimate_dG0_reaction(&reaction, &params, false)?
    );
    for media in gc.media_list() {
        println!(
            "dG' ({}) = {:.2} kJ/mol",
            media,
            gc.estimate_dG_reaction(&reaction, &params, 1e-3, Some(media.as_str()), false)?
        );
    }
    Ok(())
}

pub(crate) fn parse_reaction(text: &str) -> Result<Vec<(i64, f64)>, GroupContributionError> {
    text.split_whitespace()
        .map(|pair| {
            let (cid, coeff) = pair.split_once(':').ok_or_else(|| {
                GroupContributionError::configuration(format!("expected cid:coefficient, got '{}'", pair))
            })?;
            let cid = cid.parse::<i64>().map_err(|e| {
                GroupContributionError::configuration(format!("bad compound id '{}': {}", cid, e))
            })?;
            let coeff = coeff.parse::<f64>().map_err(|e| {
                GroupContributionError::configuration(format!("bad coefficient '{}': {}", coeff, e))
            })?;
            Ok((cid, coeff))
        })
        .collect()
}

fn estimate_all(model: &mut Option<GroupContribution>) -> Result<(), GroupContributionError> {
    let gc = model.as_mut().ok_or_else(|| {
        GroupContributionError::configuration("no model yet, train one or load tables first")
    })?;
    gc.save_cid2pmap()?;
    for (cid, reason) in gc.cid2error() {
        let name = gc.compounds().compound_name(*cid).unwrap_or_default();
        println!("C{:05} {}: {}", cid, name, reason);
    }
    Ok(())
}

fn save_tables(gc: &GroupContribution) -> Result<(), GroupContributionError> {
    let path = with_settings(|m| m.get_config().tables_file.clone());
    gc.save_tables(Path::new(&path))?;
    println!("Tables written to {}", path);
    Ok(())
}

fn load_tables(model: &mut Option<GroupContribution>) -> Result<(), GroupContributionError> {
    let settings = with_settings(|m| m.get_config().clone());
    let mut gc = prepare_model(&settings)?;
    gc.load_tables_from_file(Path::new(&settings.tables_file))?;
    println!("Model restored from {}", settings.tables_file);
    *model = Some(gc);
    Ok(())
}

fn settings_menu() {
    loop {
        println!("\n=== Settings ===");
        println!("{}", with_settings(|m| m.to_table_string()));
        println!("\x1b[33m1. Aqueous conditions\x1b[0m");
        println!("\x1b[33m2. Training file\x1b[0m");
        println!("\x1b[33m3. Compounds file\x1b[0m");
        println!("\x1b[33m4. Groups file (empty for built-in)\x1b[0m");
        println!("\x1b[33m5. Tables file\x1b[0m");
        println!("\x1b[33m6. Toggle override of estimates with measurements\x1b[0m");
        println!("\x1b[33m7. Reset to defaults\x1b[0m");
        println!("\x1b[33m0. Back to main menu\x1b[0m");
        prompt("Enter your choice: ");

        let choice = get_user_input();
        let result = match choice.trim() {
            "1" => read_aqueous().and_then(|params| with_settings_mut(|m| m.set_aqueous(params))),
            "2" => read_path().and_then(|p| with_settings_mut(|m| m.set_training_file(&p))),
            "3" => read_path().and_then(|p| with_settings_mut(|m| m.set_compounds_file(&p))),
            "4" => read_path().and_then(|p| {
                let path = if p.is_empty() { None } else { Some(p.as_str()) };
                with_settings_mut(|m| m.set_groups_file(path))
            }),
            "5" => read_path().and_then(|p| with_settings_mut(|m| m.set_tables_file(&p))),
            "6" => with_settings_mut(|m| {
                let value = !m.get_config().model.override_gc_with_measurements;
                m.set_override_with_measurements(value)
            }),
            "7" => with_settings_mut(|m| m.reset_to_defaults()),
            "0" => break,
            _ => {
                println!("Invalid choice. Please try again.");
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("\x1b[31mError: {}\x1b[0m", e);
        }
    }
}

fn read_path() -> Result<String, Box<dyn std::error::Error>> {
    prompt("Enter file path: ");
    Ok(get_user_input().trim().to_string())
}

fn read_aqueous() -> Result<AqueousParams, Box<dyn std::error::Error>> {
    prompt("Enter pH pMg I[M] T[K]: ");
    let values = get_user_input()
        .split_whitespace()
        .map(|v| v.parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()?;
    match values.as_slice() {
        [pH, pMg, I, T] => Ok(AqueousParams::new(*pH, *pMg, *I, *T)),
        _ => Err(format!("expected 4 numbers, got {}", values.len()).into()),
    }
}
