//! Reading of task files. A task file is plain text holding one or more sections; a
//! section starts with an upper case header line (`PSEUDOISOMERS`, `PKA`, `COMPOUNDS`,
//! `CONCENTRATIONS`, `GROUPS`) and runs until the next header or the end of the file.
//! The body of every section is a JSON array.
use crate::GroupContribution::group_contribution::CompoundEntry;
use crate::GroupContribution::groups_data::GroupDefinition;
use crate::GroupContribution::training_data::{PkaRecord, PseudoisomerRecord};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Concentration of a compound in a named medium, in M.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationRecord {
    pub cid: i64,
    pub media: String,
    pub concentration: f64,
}

pub struct LoadData {
    pub file_name: String,
}

impl LoadData {
    pub fn new(file_name: String) -> Self {
        LoadData { file_name }
    }
    pub fn load_pseudoisomers(&self) -> Result<Vec<PseudoisomerRecord>, String> {
        load_and_validate_pseudoisomers(&self.file_name)
    }
    /// the PKA section is optional
    pub fn load_pka(&self) -> Result<Vec<PkaRecord>, String> {
        load_optional_section(&self.file_name, &["PKA", "DISSOCIATION CONSTANTS"], "pKa")
    }
    pub fn load_compounds(&self) -> Result<Vec<CompoundEntry>, String> {
        load_section(&self.file_name, &["COMPOUNDS"], "compound")
    }
    pub fn load_concentrations(&self) -> Result<Vec<ConcentrationRecord>, String> {
        load_optional_section(&self.file_name, &["CONCENTRATIONS"], "concentration")
    }
    pub fn load_groups(&self) -> Result<Vec<GroupDefinition>, String> {
        load_section(&self.file_name, &["GROUPS"], "group")
    }
}

fn read_lines(file_name: &str) -> Result<Vec<String>, String> {
    let path = Path::new(file_name);
    if !path.exists() {
        return Err(format!("File '{}' does not exist", file_name));
    }
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => return Err(format!("Failed to open file '{}': {}", file_name, e)),
    };
    let reader = BufReader::new(file);
    Ok(reader.lines().map_while(Result::ok).collect())
}

fn is_header(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.chars().any(|c| c.is_alphabetic())
        && trimmed
            .chars()
            .all(|c| c.is_uppercase() || c == '_' || c == ' ')
}

/// Line range of the section body under one of `headers`, `None` if there is no such header.
fn find_section(lines: &[String], headers: &[&str]) -> Option<(usize, usize)> {
    let start_index = lines
        .iter()
        .position(|line| {
            let trimmed = line.trim().to_uppercase();
            headers.iter().any(|h| trimmed == *h)
        })
        .map(|i| i + 1)?;
    let end_index = (start_index..lines.len())
        .find(|&i| is_header(&lines[i]))
        .unwrap_or(lines.len());
    Some((start_index, end_index))
}

fn parse_section<T: DeserializeOwned>(
    file_name: &str,
    lines: &[String],
    start_index: usize,
    end_index: usize,
    what: &str,
) -> Result<Vec<T>, String> {
    let section = lines[start_index..end_index].join("\n");
    match serde_json::from_str::<Vec<T>>(&section) {
        Ok(data) => {
            info!(
                "Successfully parsed {} {} records from file '{}'",
                data.len(),
                what,
                file_name
            );
            Ok(data)
        }
        Err(e) => {
            let error_line = e.line();
            let error_column = e.column();
            let actual_line = start_index + error_line.max(1) - 1;
            let error_msg = format!(
                "Error parsing {} data at line {}, column {} (line {} in file): {}",
                what,
                error_line,
                error_column,
                actual_line + 1,
                e
            );
            error!("{}", error_msg);
            if actual_line < lines.len() {
                let problem_line = &lines[actual_line];
                error!("Problematic line: {}", problem_line);
                if error_column >= 1 && error_column <= problem_line.len() {
                    let pointer = " ".repeat(error_column - 1) + "^";
                    error!("{}", pointer);
                }
            }
            Err(error_msg)
        }
    }
}

pub fn load_section<T: DeserializeOwned>(
    file_name: &str,
    headers: &[&str],
    what: &str,
) -> Result<Vec<T>, String> {
    let lines = read_lines(file_name)?;
    let (start_index, end_index) = find_section(&lines, headers).ok_or_else(|| {
        format!(
            "No '{}' header found in file '{}'",
            headers.join("' or '"),
            file_name
        )
    })?;
    parse_section(file_name, &lines, start_index, end_index, what)
}

/// Like `load_section`, but a missing header gives an empty list.
pub fn load_optional_section<T: DeserializeOwned>(
    file_name: &str,
    headers: &[&str],
    what: &str,
) -> Result<Vec<T>, String> {
    let lines = read_lines(file_name)?;
    match find_section(&lines, headers) {
        Some((start_index, end_index)) => {
            parse_section(file_name, &lines, start_index, end_index, what)
        }
        None => {
            info!("No {} section in file '{}'", what, file_name);
            Ok(Vec::new())
        }
    }
}

/// Loads the measured formation energies and checks them for obvious gaps.
pub fn load_and_validate_pseudoisomers(file_name: &str) -> Result<Vec<PseudoisomerRecord>, String> {
    let records: Vec<PseudoisomerRecord> =
        load_section(file_name, &["PSEUDOISOMERS", "FORMATION ENERGIES"], "pseudoisomer")?;
    if records.is_empty() {
        warn!("Loaded pseudoisomer data is empty");
    }
    for record in &records {
        if record.dG0.is_none() {
            warn!("Record '{}' has no formation energy and will be skipped", record);
        }
        if record.smiles.as_deref().is_none_or(|s| s.is_empty()) {
            warn!("Record '{}' has no SMILES string", record);
        }
    }
    info!("Loaded and validated pseudoisomer data from file '{}'", file_name);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GroupContribution::training_data::UsageFlag;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn task_file() -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "Training set for the carboxylic acids").unwrap();
        writeln!(temp_file, "PSEUDOISOMERS").unwrap();
        writeln!(temp_file, "[").unwrap();
        writeln!(
            temp_file,
            "  {{\"name\": \"acetate\", \"cid\": 33, \"nH\": 3, \"z\": -1, \"dG0\": -369.31, \"smiles\": \"CC(=O)[O-]\"}},"
        )
        .unwrap();
        writeln!(
            temp_file,
            "  {{\"name\": \"formate\", \"nH\": 1, \"z\": -1, \"dG0\": -351.0, \"smiles\": \"C(=O)[O-]\", \"use_for\": \"test\"}}"
        )
        .unwrap();
        writeln!(temp_file, "]").unwrap();
        writeln!(temp_file, "PKA").unwrap();
        writeln!(
            temp_file,
            "[{{\"cid\": 33, \"nH_below\": 4, \"nH_above\": 3, \"smiles_below\": \"CC(=O)O\", \"smiles_above\": \"CC(=O)[O-]\", \"pKa\": 4.76}}]"
        )
        .unwrap();
        writeln!(temp_file, "COMPOUNDS").unwrap();
        writeln!(
            temp_file,
            "[{{\"cid\": 33, \"name\": \"acetate\", \"smiles\": \"CC(=O)[O-]\"}}, {{\"cid\": 80, \"name\": \"H+\"}}]"
        )
        .unwrap();
        temp_file
    }

    #[test]
    fn test_load_sections() {
        let temp_file = task_file();
        let ld = LoadData::new(temp_file.path().to_str().unwrap().to_owned());

        let records = ld.load_pseudoisomers().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cid, Some(33));
        assert_eq!(records[1].use_for, UsageFlag::Test);

        let pka = ld.load_pka().unwrap();
        assert_eq!(pka.len(), 1);
        assert_eq!(pka[0].nH_below, 4);

        let compounds = ld.load_compounds().unwrap();
        assert_eq!(compounds.len(), 2);
        assert!(compounds[1].smiles.is_none());

        // optional sections
        assert!(ld.load_concentrations().unwrap().is_empty());
        // mandatory ones
        assert!(
            ld.load_groups()
                .unwrap_err()
                .contains("No 'GROUPS' header found")
        );
    }

    #[test]
    fn test_load_concentrations_and_groups() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "CONCENTRATIONS").unwrap();
        writeln!(
            temp_file,
            "[{{\"cid\": 31, \"media\": \"glucose\", \"concentration\": 0.001}}]"
        )
        .unwrap();
        writeln!(temp_file, "GROUPS").unwrap();
        writeln!(
            temp_file,
            "[{{\"name\": \"-CH3\", \"protons\": 3, \"charge\": 0, \"smarts\": \"[CH3]\", \"focal_atoms\": \"all\"}}]"
        )
        .unwrap();
        let ld = LoadData::new(temp_file.path().to_str().unwrap().to_owned());
        let conc = ld.load_concentrations().unwrap();
        assert_eq!(
            conc,
            vec![ConcentrationRecord {
                cid: 31,
                media: "glucose".into(),
                concentration: 0.001
            }]
        );
        let groups = ld.load_groups().unwrap();
        assert_eq!(groups[0].protons, 3);
        assert_eq!(groups[0].nMg, 0);
    }

    #[test]
    fn test_file_not_found() {
        let result = load_and_validate_pseudoisomers("non_existent_file.txt");
        assert!(result.unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_invalid_json_reports_position() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "PSEUDOISOMERS").unwrap();
        writeln!(temp_file, "[").unwrap();
        writeln!(temp_file, "  {{\"name\": \"acetate\", \"nH\": 3, \"z\": }}").unwrap();
        writeln!(temp_file, "]").unwrap();
        let file_path = temp_file.path().to_str().unwrap();
        let err = load_and_validate_pseudoisomers(file_path).unwrap_err();
        assert!(err.contains("Error parsing pseudoisomer data at line 2"));
    }

    #[test]
    fn test_header_detection() {
        assert!(is_header("PKA"));
        assert!(is_header("FORMATION ENERGIES"));
        assert!(!is_header("]"));
        assert!(!is_header("  {\"name\": 1}"));
        assert!(!is_header(""));
    }
}
