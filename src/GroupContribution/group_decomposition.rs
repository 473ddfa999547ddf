//! # Group Decomposition
//!
//! ## Aim
//! Partitions the atoms of a molecule into the groups of a `GroupsData`. Groups are tried in
//! library order and a match is accepted only if all of its focal atoms are still free, so the
//! first group that claims an atom keeps it.
//!
//! ## Phosphate chains
//! The phosphate wildcard row is resolved by matching chains of 1..max_length phosphates:
//! internal chains `C-O-(P(=O)(O)O)n-C` and terminal chains `[OH,O-]-(P(=O)(O)O)n-C`.
//! Chains are cut from the free end into units:
//! - internal, odd length: `-OPO3-` (5 atoms), even length: `-OPO3-OPO2-` (9 atoms)
//! - terminal: `-OPO3` (5 atoms), then for even length `-OPO2-` (4 atoms)
//! - the rest in `-OPO2-OPO2-` units (8 atoms)
//!
//! The protonation of each unit follows from the formal charges of its atoms when charges are
//! taken into account. Free `[Mg+2]` ions are then attached to the units, terminal ones first.
//!
//! ## Main Data Structures
//! - `GroupDecomposer`: holds the library and the compiled chain patterns
//! - `GroupDecomposition`: focal atom sets per vector slot plus the unassigned atoms
use crate::GroupContribution::gc_errors::{GroupContributionError, GroupDecompositionError};
use crate::GroupContribution::group_vector::GroupVector;
use crate::GroupContribution::groups_data::{
    Group, GroupKey, GroupKind, GroupsData, PhosphateMode, phosphate_default, phosphate_groups,
    phosphate_mg_preferences,
};
use crate::GroupContribution::coded_corrections::CorrectionCounter;
use crate::Molecules::molecule_graph::{Atom, Molecule, RingInfo};
use crate::Molecules::smarts::Pattern;
use crate::Utils::distribute::multi_distribute;
use log::{error, info, warn};
use prettytable::{Table, row};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 3;

pub type FocalSet = BTreeSet<usize>;

fn internal_chain_smarts(length: usize) -> String {
    format!("CO{}C", "P(=O)([OH,O-])O".repeat(length))
}

fn terminal_chain_smarts(length: usize) -> String {
    format!("[OH,O-]{}C", "P(=O)([OH,O-])O".repeat(length))
}

/// Phosphate unit groups with their focal sets, in `phosphate_groups()` order.
struct ChainMap {
    units: Vec<GroupKey>,
    sets: Vec<Vec<FocalSet>>,
}

impl ChainMap {
    fn new(units: &[GroupKey]) -> Self {
        ChainMap {
            units: units.to_vec(),
            sets: vec![Vec::new(); units.len()],
        }
    }

    fn position(&self, key: &GroupKey) -> Option<usize> {
        self.units.iter().position(|u| u == key)
    }

    fn push(&mut self, key: &GroupKey, set: FocalSet) -> Result<(), GroupContributionError> {
        let i = self.position(key).ok_or_else(|| {
            GroupContributionError::configuration(format!("{} is not a phosphate unit", key))
        })?;
        self.sets[i].push(set);
        Ok(())
    }

    fn merge(&mut self, other: ChainMap) {
        for (mine, theirs) in self.sets.iter_mut().zip(other.sets) {
            mine.extend(theirs);
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupDecomposer {
    groups_data: Arc<GroupsData>,
    max_chain_length: usize,
    internal_chains: Vec<Pattern>,
    terminal_chains: Vec<Pattern>,
    mg_pattern: Pattern,
}

impl GroupDecomposer {
    pub fn new(groups_data: Arc<GroupsData>) -> Result<Self, GroupContributionError> {
        Self::with_max_chain_length(groups_data, DEFAULT_MAX_CHAIN_LENGTH)
    }

    pub fn with_max_chain_length(
        groups_data: Arc<GroupsData>,
        max_chain_length: usize,
    ) -> Result<Self, GroupContributionError> {
        let mut internal_chains = Vec::with_capacity(max_chain_length);
        let mut terminal_chains = Vec::with_capacity(max_chain_length);
        for length in 1..=max_chain_length {
            internal_chains.push(Pattern::new(&internal_chain_smarts(length))?);
            terminal_chains.push(Pattern::new(&terminal_chain_smarts(length))?);
        }
        Ok(GroupDecomposer {
            groups_data,
            max_chain_length,
            internal_chains,
            terminal_chains,
            mg_pattern: Pattern::new("[Mg+2]")?,
        })
    }

    pub fn groups_data(&self) -> &Arc<GroupsData> {
        &self.groups_data
    }

    pub fn max_chain_length(&self) -> usize {
        self.max_chain_length
    }

    fn pop_phosphate(
        chain: &mut Vec<usize>,
        size: usize,
        charges: &[i32],
    ) -> Result<(FocalSet, i32), GroupContributionError> {
        if chain.len() < size {
            return Err(GroupContributionError::configuration(
                "trying to pop more atoms than are left in the phosphate chain",
            ));
        }
        let atoms: Vec<usize> = chain.drain(0..size).collect();
        let charge = atoms.iter().map(|&i| charges[i]).sum();
        Ok((atoms.into_iter().collect(), charge))
    }

    fn add_unit(
        chain_map: &mut ChainMap,
        name: &str,
        charge: i32,
        atoms: FocalSet,
        ignore_protonations: bool,
    ) -> Result<(), GroupContributionError> {
        let default = phosphate_default(name).ok_or_else(|| {
            GroupContributionError::configuration(format!("{} is not a phosphate unit", name))
        })?;
        if ignore_protonations {
            return chain_map.push(&default, atoms);
        }
        let hydrogens = default.nH + charge - default.z;
        let key = GroupKey::new(name, hydrogens, charge, default.nMg);
        if chain_map.position(&key).is_some() {
            chain_map.push(&key, atoms)
        } else {
            warn!(
                "This protonation ({}) level is not allowed for phosphate group {}.",
                hydrogens, name
            );
            warn!(
                "Using the default protonation level ({}) for this name (\"{}\").",
                default.nH, default.name
            );
            chain_map.push(&default, atoms)
        }
    }

    /// Moves one unit per free Mg2+ ion into its Mg variant, following the preference list.
    fn attach_mg(
        &self,
        mol: &Molecule,
        rings: &RingInfo,
        chain_map: &mut ChainMap,
        assigned_mgs: &mut BTreeSet<usize>,
    ) {
        let preferences = phosphate_mg_preferences();
        for mg in self.mg_pattern.find_all_with_rings(mol, rings) {
            let mg_index = mg[0];
            if assigned_mgs.contains(&mg_index) {
                continue;
            }
            for (p_group, pmg_group) in &preferences {
                let (Some(from), Some(to)) = (chain_map.position(p_group), chain_map.position(pmg_group))
                else {
                    continue;
                };
                if chain_map.sets[from].is_empty() {
                    continue;
                }
                let mut set = chain_map.sets[from].remove(0);
                set.insert(mg_index);
                assigned_mgs.insert(mg_index);
                chain_map.sets[to].push(set);
                break;
            }
        }
    }

    /// All phosphate units found in `mol`, one entry per unit group in slot order.
    pub fn find_phosphate_chains(
        &self,
        mol: &Molecule,
        ignore_protonations: bool,
    ) -> Result<Vec<(GroupKey, Vec<FocalSet>)>, GroupContributionError> {
        self.phosphate_chains(mol, &mol.ring_info(), ignore_protonations)
    }

    fn phosphate_chains(
        &self,
        mol: &Molecule,
        rings: &RingInfo,
        ignore_protonations: bool,
    ) -> Result<Vec<(GroupKey, Vec<FocalSet>)>, GroupContributionError> {
        let units = phosphate_groups();
        let charges: Vec<i32> = mol.atoms().map(|(_, a)| a.formal_charge).collect();
        let mut group_map = ChainMap::new(&units);
        let mut assigned_mgs = BTreeSet::new();

        for length in 1..=self.max_chain_length {
            let mut chain_map = ChainMap::new(&units);
            for pchain in self.internal_chains[length - 1].find_all_with_rings(mol, rings) {
                // lose the carbons
                let mut working: Vec<usize> = pchain[1..pchain.len() - 1].to_vec();
                if length % 2 == 1 {
                    let (atoms, charge) = Self::pop_phosphate(&mut working, 5, &charges)?;
                    Self::add_unit(&mut chain_map, "-OPO3-", charge, atoms, ignore_protonations)?;
                } else {
                    let (atoms, charge) = Self::pop_phosphate(&mut working, 9, &charges)?;
                    Self::add_unit(&mut chain_map, "-OPO3-OPO2-", charge, atoms, ignore_protonations)?;
                }
                while !working.is_empty() {
                    let (atoms, charge) = Self::pop_phosphate(&mut working, 8, &charges)?;
                    Self::add_unit(&mut chain_map, "-OPO2-OPO2-", charge, atoms, ignore_protonations)?;
                }
            }
            self.attach_mg(mol, rings, &mut chain_map, &mut assigned_mgs);
            group_map.merge(chain_map);

            let mut chain_map = ChainMap::new(&units);
            for pchain in self.terminal_chains[length - 1].find_all_with_rings(mol, rings) {
                // lose the carbon
                let mut working: Vec<usize> = pchain[..pchain.len() - 1].to_vec();
                let (atoms, charge) = Self::pop_phosphate(&mut working, 5, &charges)?;
                Self::add_unit(&mut chain_map, "-OPO3", charge, atoms, ignore_protonations)?;
                if length % 2 == 0 {
                    let (atoms, charge) = Self::pop_phosphate(&mut working, 4, &charges)?;
                    Self::add_unit(&mut chain_map, "-OPO2-", charge, atoms, ignore_protonations)?;
                }
                while !working.is_empty() {
                    let (atoms, charge) = Self::pop_phosphate(&mut working, 8, &charges)?;
                    Self::add_unit(&mut chain_map, "-OPO2-OPO2-", charge, atoms, ignore_protonations)?;
                }
            }
            self.attach_mg(mol, rings, &mut chain_map, &mut assigned_mgs);
            group_map.merge(chain_map);
        }
        Ok(group_map.units.into_iter().zip(group_map.sets).collect())
    }

    /// Decomposes `mol` into groups.
    ///
    /// `ignore_protonations` is meant for structures whose protonation is not trustworthy;
    /// it overrides the charge sensitive phosphate wildcard. With `strict`, atoms left
    /// unassigned (hydrogens aside) make the decomposition fail.
    pub fn decompose(
        &self,
        mol: &Molecule,
        ignore_protonations: bool,
        strict: bool,
    ) -> Result<GroupDecomposition, GroupContributionError> {
        let rings = mol.ring_info();
        let mut unassigned: BTreeSet<usize> = (0..mol.atom_count()).collect();
        let mut groups: Vec<Vec<FocalSet>> = Vec::with_capacity(self.groups_data.count());

        fn claim(set: FocalSet, unassigned: &mut BTreeSet<usize>, current: &mut Vec<FocalSet>) {
            if set.is_subset(unassigned) {
                for atom in &set {
                    unassigned.remove(atom);
                }
                current.push(set);
            }
        }

        for group in &self.groups_data.groups {
            match &group.kind {
                GroupKind::PhosphateChain(mode) => {
                    let ignore = ignore_protonations || *mode == PhosphateMode::IgnoreCharges;
                    for (_, sets) in self.phosphate_chains(mol, &rings, ignore)? {
                        let mut current = Vec::new();
                        for set in sets {
                            claim(set, &mut unassigned, &mut current);
                        }
                        groups.push(current);
                    }
                }
                GroupKind::CodedCorrection(correction) => {
                    groups.push(vec![FocalSet::new(); correction.count(mol)]);
                }
                GroupKind::Smarts {
                    pattern,
                    focal_atoms,
                } => {
                    let mut current = Vec::new();
                    for embedding in pattern.find_all_with_rings(mol, &rings) {
                        let set = focal_atoms.select(&embedding).map_err(|e| {
                            error!(
                                "Focal set for group {} is out of range: {}",
                                group,
                                focal_atoms.to_text()
                            );
                            e
                        })?;
                        claim(set, &mut unassigned, &mut current);
                    }
                    groups.push(current);
                }
                // library rows never hold units, the wildcard arm fills their slots
                GroupKind::PhosphateUnit => {}
            }
        }

        // hydrogens are accounted for by the protonation of the groups
        for h in mol.hydrogen_atoms() {
            unassigned.remove(&h);
        }

        let decomposition = GroupDecomposition {
            groups_data: Arc::clone(&self.groups_data),
            molecule: mol.clone(),
            groups,
            unassigned_nodes: unassigned,
        };

        if strict && !decomposition.unassigned_nodes.is_empty() {
            return Err(GroupDecompositionError::with_table(
                &format!("Unable to decompose {} into groups.", mol.title),
                decomposition.to_table_string(),
            )
            .into());
        }
        Ok(decomposition)
    }
}

#[derive(Debug, Clone)]
pub struct GroupDecomposition {
    groups_data: Arc<GroupsData>,
    molecule: Molecule,
    /// focal sets per slot of `GroupsData::all_groups`
    pub groups: Vec<Vec<FocalSet>>,
    pub unassigned_nodes: BTreeSet<usize>,
}

impl GroupDecomposition {
    pub fn molecule(&self) -> &Molecule {
        &self.molecule
    }

    pub fn groups_data(&self) -> &Arc<GroupsData> {
        &self.groups_data
    }

    fn entries(&self) -> impl Iterator<Item = (&Group, &Vec<FocalSet>)> {
        self.groups_data.all_groups.iter().zip(self.groups.iter())
    }

    pub fn as_vector(&self) -> GroupVector {
        GroupVector::with_origin(
            Arc::clone(&self.groups_data),
            self.groups.iter().map(|sets| sets.len() as f64),
        )
    }

    pub fn non_empty_groups(&self) -> Vec<(&Group, &Vec<FocalSet>)> {
        self.entries().filter(|(_, sets)| !sets.is_empty()).collect()
    }

    pub fn unassigned_atoms(&self) -> Vec<(usize, &Atom)> {
        self.unassigned_nodes
            .iter()
            .map(|&i| (i, self.molecule.atom(i)))
            .collect()
    }

    pub fn sparse_representation(&self) -> BTreeMap<GroupKey, Vec<FocalSet>> {
        self.non_empty_groups()
            .into_iter()
            .map(|(g, sets)| (g.key.clone(), sets.clone()))
            .collect()
    }

    pub fn count_groups(&self) -> usize {
        self.groups.iter().map(|sets| sets.len()).sum()
    }

    pub fn net_charge(&self) -> i32 {
        self.as_vector().net_charge()
    }

    pub fn hydrogens(&self) -> i32 {
        self.as_vector().hydrogens()
    }

    pub fn magnesiums(&self) -> i32 {
        self.as_vector().magnesiums()
    }

    /// One group vector per pseudoisomer: the count of every group name is spread in all
    /// possible ways over the protonation states sharing that name.
    pub fn pseudoisomer_vectors(&self) -> Vec<GroupVector> {
        if self.count_groups() == 0 {
            info!("No groups in this decomposition, not calculating pseudoisomers.");
            return Vec::new();
        }

        let mut name_order: Vec<&str> = Vec::new();
        let mut name_to_slots: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut name_to_count: HashMap<&str, usize> = HashMap::new();
        for (i, (group, sets)) in self.entries().enumerate() {
            let name = group.name();
            if !name_to_slots.contains_key(name) {
                name_order.push(name);
            }
            name_to_slots.entry(name).or_default().push(i);
            *name_to_count.entry(name).or_default() += sets.len();
        }

        let mut slot_order: Vec<usize> = Vec::new();
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for name in &name_order {
            let slots = &name_to_slots[name];
            slot_order.extend_from_slice(slots);
            pairs.push((name_to_count[name], slots.len()));
        }

        let n = self.groups.len();
        multi_distribute(&pairs)
            .into_iter()
            .map(|assignment| {
                let mut counts = vec![0.0; n];
                for (k, &slot) in slot_order.iter().enumerate() {
                    counts[slot] = assignment[k] as f64;
                }
                GroupVector::with_origin(Arc::clone(&self.groups_data), counts)
            })
            .collect()
    }

    pub fn to_table_string(&self) -> String {
        let mut table = Table::new();
        table.add_row(row!["group name", "nH", "z", "nMg", "nodes"]);
        for (group, sets) in self.entries() {
            for set in sets {
                let nodes = set.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",");
                table.add_row(row![
                    group.name(),
                    group.hydrogens(),
                    group.charge(),
                    group.nMg(),
                    nodes
                ]);
            }
        }
        let mut out = table.to_string();
        if !self.unassigned_nodes.is_empty() {
            let mut unassigned = Table::new();
            unassigned.add_row(row!["index", "atomicnum", "valence", "charge"]);
            for (i, atom) in self.unassigned_atoms() {
                unassigned.add_row(row![
                    i,
                    atom.atomic_num,
                    self.molecule.heavy_valence(i),
                    atom.formal_charge
                ]);
            }
            out.push_str("\nUnassigned nodes: \n");
            out.push_str(&unassigned.to_string());
        }
        out
    }
}

impl fmt::Display for GroupDecomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .non_empty_groups()
            .into_iter()
            .map(|(g, sets)| {
                format!(
                    "{} [H{} {} {}] x {}",
                    g.name(),
                    g.hydrogens(),
                    g.charge(),
                    g.nMg(),
                    sets.len()
                )
            })
            .collect();
        write!(f, "{}", parts.join(" | "))
    }
}
