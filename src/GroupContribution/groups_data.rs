//! # Groups Data
//!
//! ## Aim
//! The ordered library of chemical groups used by the decomposer and the parallel arrays
//! (hydrogens, charges, Mg counts) used to compute properties of group vectors.
//!
//! ## Main Data Structures
//! - `GroupKey`: identity of a group (name, nH, z, nMg)
//! - `GroupKind`: ordinary SMARTS group, phosphate chain wildcard, phosphate unit or coded correction
//! - `GroupDefinition`: one serializable library row
//! - `GroupsData`: the library. `groups` keeps library order (first match wins during the
//!   decomposition), `all_groups` is the same list with the phosphate wildcard replaced by the
//!   phosphate unit groups and defines the slots of every `GroupVector`.
//!
//! ## Special rows
//! Library rows whose name starts with `*` carry no pattern: `*P` is the phosphate chain
//! wildcard that ignores charges, `*Pc` the charge sensitive one, `*Ring`, `*AromaticRing` and
//! `*HeteroaromaticRing` are coded corrections.
use crate::GroupContribution::coded_corrections::CodedCorrection;
use crate::GroupContribution::gc_errors::GroupContributionError;
use crate::Molecules::smarts::Pattern;
use log::info;
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

pub const PHOSPHATE_WILDCARD: &str = "*P";
pub const CHARGED_PHOSPHATE_WILDCARD: &str = "*Pc";

/// (name, nH, z, nMg); the first entry of every name is its default protonation state
pub const PHOSPHATE_GROUPS: &[(&str, i32, i32, i32)] = &[
    ("-OPO3-", 0, -1, 0),
    ("-OPO3-", 1, 0, 0),
    ("-OPO2-", 0, -1, 0),
    ("-OPO2-", 1, 0, 0),
    ("-OPO3", 0, -2, 0),
    ("-OPO3", 1, -1, 0),
    ("-OPO3", 2, 0, 0),
    ("-OPO3", 0, 0, 1),
    ("-OPO3", 1, 1, 1),
    ("-OPO3-OPO2-", 0, -2, 0),
    ("-OPO3-OPO2-", 1, -1, 0),
    ("-OPO3-OPO2-", 2, 0, 0),
    ("-OPO3-OPO2-", 0, 0, 1),
    ("-OPO2-OPO2-", 0, -2, 0),
    ("-OPO2-OPO2-", 1, -1, 0),
    ("-OPO2-OPO2-", 2, 0, 0),
    ("-OPO2-OPO2-", 0, 0, 1),
];

type GroupTuple = (&'static str, i32, i32, i32);

/// Mg2+ goes to a terminal phosphate first
pub const FINAL_PHOSPHATES_TO_MGS: &[(GroupTuple, GroupTuple)] = &[
    (("-OPO3", 1, -1, 0), ("-OPO3", 1, 1, 1)),
    (("-OPO3", 0, -2, 0), ("-OPO3", 0, 0, 1)),
];

pub const MIDDLE_PHOSPHATES_TO_MGS: &[(GroupTuple, GroupTuple)] = &[
    (("-OPO3-OPO2-", 0, -2, 0), ("-OPO3-OPO2-", 0, 0, 1)),
    (("-OPO2-OPO2-", 0, -2, 0), ("-OPO2-OPO2-", 0, 0, 1)),
];

/// (name, nH, z, nMg, smarts, focal atoms)
const DEFAULT_LIBRARY: &[(&str, i32, i32, i32, &str, &str)] = &[
    ("-COO", 0, -1, 0, "C(=O)[O-]", "all"),
    ("-COO", 1, 0, 0, "C(=O)[OH]", "all"),
    ("*Pc", 0, 0, 0, "", ""),
    ("-CONH2", 2, 0, 0, "C(=O)[NH2]", "all"),
    ("-CONH-", 1, 0, 0, "C(=O)[NH1][#6]", "0|1|2"),
    ("-COO-", 0, 0, 0, "C(=O)O[#6]", "0|1|2"),
    ("-CO-", 0, 0, 0, "[CX3H0](=O)([#6])[#6]", "0|1"),
    ("-CHO", 1, 0, 0, "[CX3H1]=O", "all"),
    ("-NH2", 2, 0, 0, "[NX3H2+0]", "all"),
    ("-NH2", 3, 1, 0, "[NX4H3+]", "all"),
    ("-NH-", 1, 0, 0, "[NX3H1+0]", "all"),
    ("-NH-", 2, 1, 0, "[NX4H2+]", "all"),
    ("-N<", 0, 0, 0, "[NX3H0+0]", "all"),
    ("-N<", 1, 1, 0, "[NX4H1+]", "all"),
    ("=N-", 0, 0, 0, "[NX2H0+0]", "all"),
    ("-OH", 1, 0, 0, "[OX2H1][#6]", "0"),
    ("-O-", 0, 0, 0, "[OX2H0]([#6])[#6]", "0"),
    ("-SH", 1, 0, 0, "[SX2H1]", "all"),
    ("-S-", 0, 0, 0, "[SX2H0]", "all"),
    ("-CH3", 3, 0, 0, "[CX4H3]", "all"),
    ("-CH2-", 2, 0, 0, "[CX4H2]", "all"),
    ("-CH<", 1, 0, 0, "[CX4H1]", "all"),
    (">C<", 0, 0, 0, "[CX4H0]", "all"),
    ("=CH2", 2, 0, 0, "[CX3H2]", "all"),
    ("=CH-", 1, 0, 0, "[CX3H1]", "all"),
    ("=C<", 0, 0, 0, "[CX3H0]", "all"),
    ("ring =CH-", 1, 0, 0, "[cH1]", "all"),
    ("ring =C<", 0, 0, 0, "[cH0]", "all"),
    ("ring -N=", 0, 0, 0, "[nH0+0]", "all"),
    ("ring -N=", 1, 1, 0, "[nH1+]", "all"),
    ("ring -NH-", 1, 0, 0, "[nH1+0]", "all"),
    ("ring -O-", 0, 0, 0, "[o]", "all"),
    ("ring -S-", 0, 0, 0, "[s]", "all"),
    ("*Ring", 0, 0, 0, "", ""),
    ("*AromaticRing", 0, 0, 0, "", ""),
    ("*HeteroaromaticRing", 0, 0, 0, "", ""),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub name: String,
    pub nH: i32,
    pub z: i32,
    pub nMg: i32,
}

impl GroupKey {
    pub fn new(name: &str, nH: i32, z: i32, nMg: i32) -> Self {
        GroupKey {
            name: name.to_string(),
            nH,
            z,
            nMg,
        }
    }

    pub fn from_tuple(t: &GroupTuple) -> Self {
        GroupKey::new(t.0, t.1, t.2, t.3)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [H{} {} {}]", self.name, self.nH, self.z, self.nMg)
    }
}

/// Unit groups a phosphate chain is cut into, in slot order.
pub fn phosphate_groups() -> Vec<GroupKey> {
    PHOSPHATE_GROUPS.iter().map(GroupKey::from_tuple).collect()
}

/// Charge agnostic protonation state used for a phosphate unit name.
pub fn phosphate_default(name: &str) -> Option<GroupKey> {
    PHOSPHATE_GROUPS
        .iter()
        .find(|t| t.0 == name)
        .map(GroupKey::from_tuple)
}

/// Mg preference list: terminal phosphates, then the middle ones.
pub fn phosphate_mg_preferences() -> Vec<(GroupKey, GroupKey)> {
    FINAL_PHOSPHATES_TO_MGS
        .iter()
        .chain(MIDDLE_PHOSPHATES_TO_MGS.iter())
        .map(|(p, pmg)| (GroupKey::from_tuple(p), GroupKey::from_tuple(pmg)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocalAtoms {
    All,
    Indices(Vec<usize>),
}

impl FocalAtoms {
    /// `all` (or empty) or `|` separated pattern atom indices
    pub fn parse(text: &str) -> Result<Self, GroupContributionError> {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("all") {
            return Ok(FocalAtoms::All);
        }
        let mut indices = Vec::new();
        for part in text.split('|') {
            let i = part.trim().parse::<usize>().map_err(|_| {
                GroupContributionError::configuration(format!("bad focal atom index '{}'", part))
            })?;
            indices.push(i);
        }
        Ok(FocalAtoms::Indices(indices))
    }

    pub fn to_text(&self) -> String {
        match self {
            FocalAtoms::All => "all".to_string(),
            FocalAtoms::Indices(indices) => indices
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join("|"),
        }
    }

    /// Target atoms of one embedding that the group consumes.
    pub fn select(&self, embedding: &[usize]) -> Result<BTreeSet<usize>, GroupContributionError> {
        match self {
            FocalAtoms::All => Ok(embedding.iter().copied().collect()),
            FocalAtoms::Indices(indices) => indices
                .iter()
                .map(|&i| {
                    embedding.get(i).copied().ok_or_else(|| {
                        GroupContributionError::configuration(format!(
                            "focal atom {} is out of range for a match of {} atoms",
                            i,
                            embedding.len()
                        ))
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhosphateMode {
    IgnoreCharges,
    ChargeSensitive,
}

#[derive(Debug, Clone)]
pub enum GroupKind {
    Smarts {
        pattern: Pattern,
        focal_atoms: FocalAtoms,
    },
    PhosphateChain(PhosphateMode),
    PhosphateUnit,
    CodedCorrection(CodedCorrection),
}

#[derive(Debug, Clone)]
pub struct Group {
    pub key: GroupKey,
    pub kind: GroupKind,
}

impl Group {
    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn hydrogens(&self) -> i32 {
        self.key.nH
    }

    pub fn charge(&self) -> i32 {
        self.key.z
    }

    pub fn nMg(&self) -> i32 {
        self.key.nMg
    }

    pub fn is_phosphate(&self) -> bool {
        matches!(self.kind, GroupKind::PhosphateChain(_))
    }

    pub fn is_coded_correction(&self) -> bool {
        matches!(self.kind, GroupKind::CodedCorrection(_))
    }

    pub fn smarts(&self) -> Option<&str> {
        match &self.kind {
            GroupKind::Smarts { pattern, .. } => Some(pattern.smarts.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// One library row as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub name: String,
    pub protons: i32,
    pub charge: i32,
    #[serde(default)]
    pub nMg: i32,
    #[serde(default)]
    pub smarts: String,
    #[serde(default)]
    pub focal_atoms: String,
    #[serde(default)]
    pub remark: String,
}

impl GroupDefinition {
    pub fn new(name: &str, protons: i32, charge: i32, nMg: i32, smarts: &str, focal: &str) -> Self {
        GroupDefinition {
            name: name.to_string(),
            protons,
            charge,
            nMg,
            smarts: smarts.to_string(),
            focal_atoms: focal.to_string(),
            remark: String::new(),
        }
    }

    fn to_group(&self) -> Result<Group, GroupContributionError> {
        let key = GroupKey::new(&self.name, self.protons, self.charge, self.nMg);
        let kind = if self.name == PHOSPHATE_WILDCARD {
            GroupKind::PhosphateChain(PhosphateMode::IgnoreCharges)
        } else if self.name == CHARGED_PHOSPHATE_WILDCARD {
            GroupKind::PhosphateChain(PhosphateMode::ChargeSensitive)
        } else if self.name.starts_with('*') {
            let correction = CodedCorrection::from_group_name(&self.name).ok_or_else(|| {
                GroupContributionError::configuration(format!(
                    "unrecognized special group: {}",
                    self.name
                ))
            })?;
            GroupKind::CodedCorrection(correction)
        } else {
            let pattern = Pattern::new(&self.smarts).map_err(|e| {
                GroupContributionError::configuration(format!("group {}: {}", key, e))
            })?;
            let focal_atoms = FocalAtoms::parse(&self.focal_atoms)?;
            if let FocalAtoms::Indices(indices) = &focal_atoms {
                if let Some(bad) = indices.iter().find(|&&i| i >= pattern.atom_count()) {
                    return Err(GroupContributionError::configuration(format!(
                        "focal atom {} of group {} is out of range ({} pattern atoms)",
                        bad,
                        key,
                        pattern.atom_count()
                    )));
                }
            }
            GroupKind::Smarts {
                pattern,
                focal_atoms,
            }
        };
        Ok(Group { key, kind })
    }
}

#[derive(Debug, Clone)]
pub struct GroupsData {
    pub definitions: Vec<GroupDefinition>,
    /// library order
    pub groups: Vec<Group>,
    /// vector slot order, phosphate wildcard expanded
    pub all_groups: Vec<Group>,
    pub names: Vec<String>,
    pub hydrogens: Vec<i32>,
    pub charges: Vec<i32>,
    pub nMg: Vec<i32>,
    index: HashMap<GroupKey, usize>,
}

impl GroupsData {
    pub fn from_definitions(definitions: Vec<GroupDefinition>) -> Result<Self, GroupContributionError> {
        let groups = definitions
            .iter()
            .map(|d| d.to_group())
            .collect::<Result<Vec<_>, _>>()?;

        let mut all_groups: Vec<Group> = Vec::new();
        let mut wildcards = 0;
        for group in &groups {
            if group.is_phosphate() {
                wildcards += 1;
                for key in phosphate_groups() {
                    all_groups.push(Group {
                        key,
                        kind: GroupKind::PhosphateUnit,
                    });
                }
            } else {
                all_groups.push(group.clone());
            }
        }
        if wildcards > 1 {
            return Err(GroupContributionError::configuration(
                "the library holds more than one phosphate wildcard",
            ));
        }

        let mut index = HashMap::new();
        for (i, group) in all_groups.iter().enumerate() {
            if index.insert(group.key.clone(), i).is_some() {
                return Err(GroupContributionError::configuration(format!(
                    "duplicate group {}",
                    group.key
                )));
            }
        }

        info!(
            "groups data: {} library rows, {} vector slots",
            groups.len(),
            all_groups.len() + 1
        );
        Ok(GroupsData {
            names: all_groups.iter().map(|g| g.key.name.clone()).collect(),
            hydrogens: all_groups.iter().map(|g| g.key.nH).collect(),
            charges: all_groups.iter().map(|g| g.key.z).collect(),
            nMg: all_groups.iter().map(|g| g.key.nMg).collect(),
            definitions,
            groups,
            all_groups,
            index,
        })
    }

    pub fn default_definitions() -> Vec<GroupDefinition> {
        DEFAULT_LIBRARY
            .iter()
            .map(|(name, nH, z, nMg, smarts, focal)| {
                GroupDefinition::new(name, *nH, *z, *nMg, smarts, focal)
            })
            .collect()
    }

    pub fn default_library() -> Result<Self, GroupContributionError> {
        Self::from_definitions(Self::default_definitions())
    }

    pub fn from_json_str(content: &str) -> Result<Self, GroupContributionError> {
        let definitions: Vec<GroupDefinition> = serde_json::from_str(content)?;
        Self::from_definitions(definitions)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, GroupContributionError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), GroupContributionError> {
        let content = serde_json::to_string_pretty(&self.definitions)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// number of group slots (without the origin)
    pub fn count(&self) -> usize {
        self.all_groups.len()
    }

    /// length of a group vector: every group plus the origin
    pub fn vector_len(&self) -> usize {
        self.all_groups.len() + 1
    }

    pub fn index(&self, key: &GroupKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn index_of(&self, name: &str, nH: i32, z: i32, nMg: i32) -> Option<usize> {
        self.index(&GroupKey::new(name, nH, z, nMg))
    }

    pub fn group(&self, i: usize) -> Option<&Group> {
        self.all_groups.get(i)
    }

    /// slot names, `origin` last
    pub fn all_group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.all_groups.iter().map(|g| g.key.to_string()).collect();
        names.push("origin".to_string());
        names
    }

    pub fn to_table_string(&self) -> String {
        let mut table = Table::new();
        table.add_row(row!["#", "name", "nH", "z", "nMg", "smarts / kind"]);
        for (i, group) in self.all_groups.iter().enumerate() {
            let kind = match &group.kind {
                GroupKind::Smarts {
                    pattern,
                    focal_atoms,
                } => format!("{} [{}]", pattern.smarts, focal_atoms.to_text()),
                GroupKind::PhosphateChain(mode) => format!("{:?}", mode),
                GroupKind::PhosphateUnit => "phosphate unit".to_string(),
                GroupKind::CodedCorrection(_) => "coded correction".to_string(),
            };
            table.add_row(row![
                i,
                group.key.name,
                group.key.nH,
                group.key.z,
                group.key.nMg,
                kind
            ]);
        }
        table.to_string()
    }
}
