//! # Group Contribution Model
//!
//! ## Aim
//! Estimates standard Gibbs energies of formation of compounds from the energies of their
//! groups. The contributions are fitted by rank deficient least squares over measured
//! formation energies and pKa values; the kernel (nullspace) of the design matrix is kept
//! so that estimates relying on unconstrained group combinations can be refused.
//!
//! ## Main Data Structures
//! - `GroupContribution`: the model. Owns the groups data, the decomposer, the training
//!   set, the fitted contributions with their nullspace, the measured pseudoisomer maps and
//!   an optional cache of estimated maps for every compound of a `CompoundSource`.
//! - `ModelState`: Uninitialized -> GroupsLoaded -> Trained -> EstimationReady. Estimation
//!   before training is a configuration error.
//! - `CompoundSource`: where compound structures come from (ids, names, molecules).
//! - `GCOptions`: numeric tolerances and policies.
//! - `CrossValidationReport`: leave-one-out deviations of the training set.
//!
//! ## Usage
//! ```rust, ignore
//! let mut gc = GroupContribution::new(GCOptions::default());
//! gc.load_groups(GroupsData::default_library()?)?;
//! gc.train(&records, &pka_records)?;
//! let pmap = gc.estimate_pmap(&Molecule::from_smiles("CC(=O)[O-]")?, false)?;
//! let dG0 = pmap.transform(&AqueousParams::default(), false)?;
//! ```
use crate::GroupContribution::gc_errors::GroupContributionError;
use crate::GroupContribution::group_decomposition::{
    DEFAULT_MAX_CHAIN_LENGTH, GroupDecomposer, GroupDecomposition,
};
use crate::GroupContribution::group_vector::GroupVector;
use crate::GroupContribution::groups_data::GroupsData;
use crate::GroupContribution::training_data::{
    CompoundIdAllocator, PkaRecord, PseudoisomerRecord, TrainingData, UsageFlag,
};
use crate::Molecules::molecule_graph::{Molecule, MoleculeError};
use crate::Thermodynamics::pseudoisomer::{AqueousParams, PseudoisomerMap};
use crate::Thermodynamics::thermodynamic_constants::{
    R, dG0_f_Mg, default_T, rt_ln10,
};
use crate::Utils::linear_regression::{DEFAULT_EPS, least_squares};
use log::{debug, error, info, warn};
use nalgebra::{DMatrix, DVector};
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// compound id of H+; its formation energy is zero by convention
pub const PROTON_CID: i64 = 80;
/// compound id of water; its activity is fixed at 1
pub const WATER_CID: i64 = 1;
pub const DEFAULT_NULLSPACE_TOLERANCE: f64 = 1e-3;

/// sparse reaction: (compound id, stoichiometric coefficient)
pub type SparseReaction = [(i64, f64)];

pub fn compound_label(cid: i64) -> String {
    format!("C{:05}", cid)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GCOptions {
    /// singular value threshold of the regression
    pub eps: f64,
    /// largest admissible norm of the nullspace projection of an estimated vector
    pub nullspace_tolerance: f64,
    pub max_chain_length: usize,
    /// measured maps win over estimates for every compound, not only for the test set
    pub override_gc_with_measurements: bool,
}

impl Default for GCOptions {
    fn default() -> Self {
        GCOptions {
            eps: DEFAULT_EPS,
            nullspace_tolerance: DEFAULT_NULLSPACE_TOLERANCE,
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
            override_gc_with_measurements: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Uninitialized,
    GroupsLoaded,
    Trained,
    EstimationReady,
}

/// Supplier of compound structures for the batch operations.
pub trait CompoundSource {
    fn compound_ids(&self) -> Vec<i64>;
    fn compound_name(&self, cid: i64) -> Option<String>;
    /// `None` when the compound has no structure at all
    fn molecule(&self, cid: i64) -> Option<Result<Molecule, MoleculeError>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundEntry {
    pub cid: i64,
    pub name: String,
    #[serde(default)]
    pub smiles: Option<String>,
}

/// Compounds given by SMILES, held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCompounds {
    entries: BTreeMap<i64, CompoundEntry>,
}

impl InMemoryCompounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<CompoundEntry>) -> Self {
        InMemoryCompounds {
            entries: entries.into_iter().map(|e| (e.cid, e)).collect(),
        }
    }

    pub fn insert(&mut self, cid: i64, name: &str, smiles: Option<&str>) {
        self.entries.insert(
            cid,
            CompoundEntry {
                cid,
                name: name.to_string(),
                smiles: smiles.map(|s| s.to_string()),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CompoundSource for InMemoryCompounds {
    fn compound_ids(&self) -> Vec<i64> {
        self.entries.keys().copied().collect()
    }

    fn compound_name(&self, cid: i64) -> Option<String> {
        self.entries.get(&cid).map(|e| e.name.clone())
    }

    fn molecule(&self, cid: i64) -> Option<Result<Molecule, MoleculeError>> {
        let entry = self.entries.get(&cid)?;
        let smiles = entry.smiles.as_deref().filter(|s| !s.is_empty())?;
        Some(Molecule::from_smiles(smiles).map(|m| m.with_title(&entry.name)))
    }
}

/// One left-out training row.
#[derive(Debug, Clone, PartialEq)]
pub struct Deviation {
    pub name: String,
    pub observed: f64,
    /// `None` when the row could not be reproduced from the other rows
    pub estimated: Option<f64>,
    pub error: Option<f64>,
    pub remark: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidationReport {
    /// sorted by decreasing absolute error, unscored rows last
    pub deviations: Vec<Deviation>,
    pub mean_error: f64,
    pub std_error: f64,
    pub rmse: f64,
}

impl CrossValidationReport {
    pub fn scored(&self) -> impl Iterator<Item = &Deviation> {
        self.deviations.iter().filter(|d| d.error.is_some())
    }

    pub fn to_table_string(&self) -> String {
        let mut table = Table::new();
        table.add_row(row!["Name", "dG0 obs", "dG0 est", "error", "remark"]);
        for d in &self.deviations {
            let fmt_opt = |v: Option<f64>| v.map(|x| format!("{:.1}", x)).unwrap_or("-".into());
            table.add_row(row![
                d.name,
                format!("{:.1}", d.observed),
                fmt_opt(d.estimated),
                fmt_opt(d.error),
                d.remark
            ]);
        }
        format!(
            "{}std(error) = {:.2} kJ/mol, RMSE = {:.2} kJ/mol",
            table, self.std_error, self.rmse
        )
    }
}

impl fmt::Display for CrossValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_table_string())
    }
}

pub struct GroupContribution {
    pub options: GCOptions,
    pub(crate) state: ModelState,
    pub(crate) groups_data: Option<Arc<GroupsData>>,
    pub(crate) decomposer: Option<GroupDecomposer>,
    pub(crate) compounds: Box<dyn CompoundSource>,
    pub(crate) training: TrainingData,
    pub(crate) contributions: Option<DVector<f64>>,
    /// one kernel basis vector per row
    pub(crate) nullspace: Option<DMatrix<f64>>,
    pub(crate) cid2pmap_obs: BTreeMap<i64, PseudoisomerMap>,
    pub(crate) cid_test_set: BTreeSet<i64>,
    pub(crate) cid2pmap_cache: Option<BTreeMap<i64, PseudoisomerMap>>,
    pub(crate) cid2error: BTreeMap<i64, String>,
    pub(crate) cid2conc: HashMap<(i64, String), f64>,
    pub(crate) media_list: Vec<String>,
    ids: CompoundIdAllocator,
}

impl Default for GroupContribution {
    fn default() -> Self {
        Self::new(GCOptions::default())
    }
}

impl GroupContribution {
    pub fn new(options: GCOptions) -> Self {
        GroupContribution {
            options,
            state: ModelState::Uninitialized,
            groups_data: None,
            decomposer: None,
            compounds: Box::new(InMemoryCompounds::new()),
            training: TrainingData::new(),
            contributions: None,
            nullspace: None,
            cid2pmap_obs: BTreeMap::new(),
            cid_test_set: BTreeSet::new(),
            cid2pmap_cache: None,
            cid2error: BTreeMap::new(),
            cid2conc: HashMap::new(),
            media_list: Vec::new(),
            ids: CompoundIdAllocator::new(),
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn set_compounds(&mut self, compounds: Box<dyn CompoundSource>) {
        self.compounds = compounds;
        self.cid2pmap_cache = None;
        if self.state == ModelState::EstimationReady {
            self.state = ModelState::Trained;
        }
    }

    pub fn compounds(&self) -> &dyn CompoundSource {
        self.compounds.as_ref()
    }

    /// Installs a groups library. Any previous training is discarded.
    pub fn load_groups(&mut self, groups_data: GroupsData) -> Result<(), GroupContributionError> {
        let groups_data = Arc::new(groups_data);
        let decomposer =
            GroupDecomposer::with_max_chain_length(Arc::clone(&groups_data), self.options.max_chain_length)?;
        info!(
            "Loaded {} groups ({} slots including the origin)",
            groups_data.count(),
            groups_data.vector_len()
        );
        self.groups_data = Some(groups_data);
        self.decomposer = Some(decomposer);
        self.training = TrainingData::new();
        self.contributions = None;
        self.nullspace = None;
        self.cid2pmap_cache = None;
        self.state = ModelState::GroupsLoaded;
        Ok(())
    }

    pub fn load_default_groups(&mut self) -> Result<(), GroupContributionError> {
        self.load_groups(GroupsData::default_library()?)
    }

    pub fn groups_data(&self) -> Result<&Arc<GroupsData>, GroupContributionError> {
        self.groups_data
            .as_ref()
            .ok_or_else(|| GroupContributionError::configuration("no groups have been loaded"))
    }

    pub fn decomposer(&self) -> Result<&GroupDecomposer, GroupContributionError> {
        self.decomposer
            .as_ref()
            .ok_or_else(|| GroupContributionError::configuration("no groups have been loaded"))
    }

    pub fn training_data(&self) -> &TrainingData {
        &self.training
    }

    pub fn contributions(&self) -> Option<&DVector<f64>> {
        self.contributions.as_ref()
    }

    pub fn nullspace(&self) -> Option<&DMatrix<f64>> {
        self.nullspace.as_ref()
    }

    pub fn observed_pmap(&self, cid: i64) -> Option<&PseudoisomerMap> {
        self.cid2pmap_obs.get(&cid)
    }

    pub fn test_set(&self) -> &BTreeSet<i64> {
        &self.cid_test_set
    }

    pub fn cid2error(&self) -> &BTreeMap<i64, String> {
        &self.cid2error
    }

    fn trained(&self) -> Result<(&DVector<f64>, &DMatrix<f64>), GroupContributionError> {
        match (self.state, &self.contributions, &self.nullspace) {
            (ModelState::Trained | ModelState::EstimationReady, Some(c), Some(n)) => Ok((c, n)),
            (state, _, _) => Err(GroupContributionError::configuration(format!(
                "the model has not been trained (state {:?})",
                state
            ))),
        }
    }

    // ---------------------------------------------------------------------------------
    // training
    // ---------------------------------------------------------------------------------

    fn parse_training_smiles(smiles: &str, title: &str) -> Result<Molecule, GroupContributionError> {
        Molecule::from_smiles(smiles)
            .map(|m| m.with_title(title))
            .map_err(|e| {
                error!("Invalid smiles: {}", smiles);
                e.into()
            })
    }

    /// Rows contributed by dissociation constants: vec(above) - vec(below) with
    /// observation R T ln10 pKa. Rows with identical vectors are merged and averaged.
    pub fn read_training_data_pka(
        &self,
        records: &[PkaRecord],
    ) -> Result<TrainingData, GroupContributionError> {
        let decomposer = self.decomposer()?;
        let decompose = |smiles: &str, id: &str| -> Result<Option<GroupDecomposition>, GroupContributionError> {
            let mol = match Molecule::from_smiles(smiles) {
                Ok(mol) => mol.with_title(id),
                Err(e) => {
                    warn!("Cannot parse {} ({}): {}", id, smiles, e);
                    return Ok(None);
                }
            };
            match decomposer.decompose(&mol, false, true) {
                Ok(d) => Ok(Some(d)),
                Err(e) if e.is_estimation_failure() => {
                    warn!(
                        "Cannot decompose one of the compounds in the training set: {}, {}",
                        id, smiles
                    );
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        };

        let mut data = TrainingData::new();
        let mut values: Vec<Vec<f64>> = Vec::new();
        for record in records {
            let (Some(cid), Some(below), Some(above)) = (
                record.cid,
                record.smiles_below.as_deref().filter(|s| !s.is_empty()),
                record.smiles_above.as_deref().filter(|s| !s.is_empty()),
            ) else {
                debug!("pKa record without structures skipped: {:?}", record);
                continue;
            };
            info!(
                "Reading pKa data for {}, nH = {} -> nH = {}",
                compound_label(cid),
                record.nH_below,
                record.nH_above
            );
            let dG0 = rt_ln10(record.T) * record.pKa;
            let Some(below) = decompose(below, &format!("{}_b_H{}", compound_label(cid), record.nH_below))?
            else {
                continue;
            };
            let Some(above) = decompose(above, &format!("{}_a_H{}", compound_label(cid), record.nH_above))?
            else {
                continue;
            };
            let groupvec = above.as_vector().subtract(&below.as_vector())?;
            let tag = format!("{} [{}->{}]", compound_label(cid), record.nH_above, record.nH_below);
            match data.rows.iter().position(|row| *row == groupvec) {
                Some(i) => {
                    values[i].push(dG0);
                    data.names[i] = format!("{}, {}", data.names[i], tag);
                }
                None => {
                    let name = format!("pKa ({}): {}", groupvec, tag);
                    data.push(groupvec, 0.0, name);
                    values.push(vec![dG0]);
                }
            }
        }
        for (obs, vals) in data.observations.iter_mut().zip(&values) {
            *obs = vals.iter().sum::<f64>() / vals.len() as f64;
        }
        Ok(data)
    }

    /// Rows contributed by measured formation energies. Also collects the measured
    /// pseudoisomer maps and the test set.
    pub fn read_training_data_dG0(
        &mut self,
        records: &[PseudoisomerRecord],
    ) -> Result<TrainingData, GroupContributionError> {
        let decomposer = self.decomposer()?.clone();
        // committed to `self` only once every record has been read
        let mut cid2pmap_obs: BTreeMap<i64, PseudoisomerMap> = BTreeMap::new();
        let mut cid_test_set = BTreeSet::new();
        let mut ids = self.ids.clone();
        let mut data = TrainingData::new();

        for record in records {
            let name = record.to_string();
            info!("Verifying data for {}", name);
            let Some(dG0) = record.dG0 else {
                debug!("No data for dG0_f of {}", name);
                continue;
            };
            if record.use_for == UsageFlag::Skip {
                debug!("{} is marked as not to be used", name);
                continue;
            }
            let cid = match record.cid {
                Some(cid) => cid,
                None => ids.allocate(),
            };
            let pmap = cid2pmap_obs.entry(cid).or_default();
            pmap.add(record.nH, record.z, record.nMg, dG0);
            if let (None, Some(reference)) = (&pmap.reference, &record.reference) {
                pmap.reference = Some(reference.clone());
            }

            if record.use_for == UsageFlag::Test {
                cid_test_set.insert(cid);
                continue;
            }

            let smiles = record
                .smiles
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    GroupContributionError::configuration(format!(
                        "Cannot use compound '{}' for training if it lacks a SMILES string",
                        record.name
                    ))
                })?;
            let mol = Self::parse_training_smiles(smiles, &name)?;
            let decomposition = decomposer.decompose(&mol, false, true).map_err(|e| {
                error!("Cannot decompose one of the compounds in the training set: {}", name);
                e
            })?;
            let nH = decomposition.hydrogens();
            if nH != record.nH {
                error!(
                    "Hydrogen count doesn't match: explicit = {}, formula = {}",
                    record.nH, nH
                );
            }
            let z = decomposition.net_charge();
            if z != record.z {
                error!("Charge doesn't match: explicit = {}, formula = {}", record.z, z);
            }
            data.push(decomposition.as_vector(), dG0, name);
        }
        self.cid2pmap_obs = cid2pmap_obs;
        self.cid_test_set = cid_test_set;
        self.ids = ids;
        Ok(data)
    }

    /// Reads both kinds of records (pKa rows first) and fits the contributions.
    pub fn train(
        &mut self,
        records: &[PseudoisomerRecord],
        pka_records: &[PkaRecord],
    ) -> Result<(), GroupContributionError> {
        let mut data = self.read_training_data_pka(pka_records)?;
        let formation = self.read_training_data_dG0(records)?;
        data.rows.extend(formation.rows);
        data.observations.extend(formation.observations);
        data.names.extend(formation.names);
        self.train_on(data)
    }

    /// Fits the contributions to already assembled rows.
    pub fn train_on(&mut self, data: TrainingData) -> Result<(), GroupContributionError> {
        let groups_data = self.groups_data()?;
        if data.is_empty() {
            return Err(GroupContributionError::configuration(
                "No observations have been given for training",
            ));
        }
        if let Some(row) = data.rows.iter().find(|r| r.len() != groups_data.vector_len()) {
            return Err(GroupContributionError::configuration(format!(
                "training row has {} slots, the groups data needs {}",
                row.len(),
                groups_data.vector_len()
            )));
        }
        info!("Training on {} examples", data.len());
        let result = least_squares(
            &data.design_matrix(),
            &data.observation_vector(),
            true,
            self.options.eps,
        )?;
        if result.nullspace.nrows() > 0 {
            warn!(
                "The training data leaves {} degrees of freedom unconstrained",
                result.nullspace.nrows()
            );
        }
        self.contributions = Some(result.coefficients);
        self.nullspace = Some(result.nullspace);
        self.training = data;
        self.cid2pmap_cache = None;
        self.state = ModelState::Trained;
        Ok(())
    }

    // ---------------------------------------------------------------------------------
    // estimation
    // ---------------------------------------------------------------------------------

    /// Names of the slots of `groupvec` that touch the unconstrained part of the model.
    fn missing_groups(&self, groupvec: &GroupVector, nullspace: &DMatrix<f64>) -> Vec<String> {
        let names = groupvec.groups_data().all_group_names();
        groupvec
            .as_slice()
            .iter()
            .enumerate()
            .filter(|(j, v)| {
                **v != 0.0
                    && *j < nullspace.ncols()
                    && nullspace.column(*j).amax() > self.options.nullspace_tolerance
            })
            .map(|(j, _)| names[j].clone())
            .collect()
    }

    /// Estimated energy of one group vector; refused if the vector leaves the span of
    /// the training data.
    pub fn groupvec2val(&self, groupvec: &GroupVector) -> Result<f64, GroupContributionError> {
        let (contributions, nullspace) = self.trained()?;
        if nullspace.nrows() > 0 {
            let projection = nullspace * groupvec.to_dvector();
            if projection.norm() > self.options.nullspace_tolerance {
                let missing_groups = self.missing_groups(groupvec, nullspace);
                return Err(GroupContributionError::MissingTrainingData {
                    message: format!(
                        "can only estimate dG0 for vectors in the span of the training data: {}",
                        groupvec
                    ),
                    missing_groups,
                });
            }
        }
        groupvec.dot(contributions)
    }

    /// Energies of every pseudoisomer the molecule decomposes into.
    pub fn estimate_pmap(
        &self,
        mol: &Molecule,
        ignore_protonations: bool,
    ) -> Result<PseudoisomerMap, GroupContributionError> {
        self.trained()?;
        let decomposition = self
            .decomposer()?
            .decompose(mol, ignore_protonations, true)
            .map_err(|e| match e {
                GroupContributionError::Decomposition(mut inner) => {
                    inner.message = format!("{}\n{}", inner.message, mol.title);
                    GroupContributionError::Decomposition(inner)
                }
                other => other,
            })?;

        let vectors = decomposition.pseudoisomer_vectors();
        if vectors.is_empty() {
            return Err(GroupContributionError::decomposition(format!(
                "Found no pseudoisomers for {}",
                mol.title
            )));
        }

        let mut pmap = PseudoisomerMap::new();
        let mut missing = Vec::new();
        let mut missing_groups = BTreeSet::new();
        for groupvec in &vectors {
            let (nH, z, nMg) = (groupvec.hydrogens(), groupvec.net_charge(), groupvec.magnesiums());
            match self.groupvec2val(groupvec) {
                Ok(dG0) => pmap.add(nH, z, nMg, dG0),
                Err(GroupContributionError::MissingTrainingData {
                    missing_groups: groups,
                    ..
                }) => {
                    missing.push(format!(
                        "Species nH = {}, z = {}, nMg = {}: {}",
                        nH, z, nMg, groupvec
                    ));
                    missing_groups.extend(groups);
                }
                Err(e) => return Err(e),
            }
        }
        if pmap.is_empty() {
            return Err(GroupContributionError::MissingTrainingData {
                message: format!(
                    "All species of {} have missing groups:\n{}",
                    mol.title,
                    missing.join("\n")
                ),
                missing_groups: missing_groups.into_iter().collect(),
            });
        }
        for m in &missing {
            debug!("{}: {}", mol.title, m);
        }
        Ok(pmap)
    }

    /// Distinct (nH, z, nMg) states of a molecule, read off its decomposition.
    pub fn get_pseudoisomers(
        &self,
        mol: &Molecule,
    ) -> Result<Vec<(i32, i32, i32)>, GroupContributionError> {
        let decomposition = self.decomposer()?.decompose(mol, true, false)?;
        let states: BTreeSet<(i32, i32, i32)> = decomposition
            .pseudoisomer_vectors()
            .iter()
            .map(|v| (v.hydrogens(), v.net_charge(), v.magnesiums()))
            .collect();
        Ok(states.into_iter().collect())
    }

    pub fn cid2pseudoisomers(&self, cid: i64) -> Result<Vec<(i32, i32, i32)>, GroupContributionError> {
        let mol = self.cid2molecule(cid)?;
        self.get_pseudoisomers(&mol)
    }

    fn cid2molecule(&self, cid: i64) -> Result<Molecule, GroupContributionError> {
        match self.compounds.molecule(cid) {
            Some(Ok(mol)) => Ok(mol.with_title(&compound_label(cid))),
            Some(Err(e)) => Err(GroupContributionError::MissingCompoundFormationEnergy {
                cid,
                message: format!("Cannot determine molecular structure: {}", e),
            }),
            None => Err(GroupContributionError::MissingCompoundFormationEnergy {
                cid,
                message: "no structure".to_string(),
            }),
        }
    }

    /// Pseudoisomer map of a compound: the cache when present; otherwise measured data
    /// when the policy prefers it (or the compound is held out for testing), and a
    /// group-contribution estimate falling back to measured data.
    pub fn cid2pmap(&self, cid: i64) -> Result<PseudoisomerMap, GroupContributionError> {
        if let Some(cache) = &self.cid2pmap_cache {
            return cache.get(&cid).cloned().ok_or_else(|| {
                GroupContributionError::MissingCompoundFormationEnergy {
                    cid,
                    message: format!(
                        "Formation energy for {} is not in the cache",
                        compound_label(cid)
                    ),
                }
            });
        }
        if cid == PROTON_CID {
            let mut pmap = PseudoisomerMap::new();
            pmap.add(0, 0, 0, 0.0);
            return Ok(pmap);
        }
        let observed = self.cid2pmap_obs.get(&cid);
        if let Some(obs) = observed {
            if self.options.override_gc_with_measurements || self.cid_test_set.contains(&cid) {
                return Ok(obs.clone());
            }
        }
        let estimate = self
            .cid2molecule(cid)
            .and_then(|mol| self.estimate_pmap(&mol, false));
        match (estimate, observed) {
            (Ok(pmap), _) => Ok(pmap),
            (Err(e), Some(obs))
                if e.is_estimation_failure()
                    || matches!(e, GroupContributionError::MissingCompoundFormationEnergy { .. }) =>
            {
                debug!("Using measured data for {}: {}", compound_label(cid), e);
                Ok(obs.clone())
            }
            (Err(e), None) if e.is_estimation_failure() => {
                Err(GroupContributionError::MissingCompoundFormationEnergy {
                    cid,
                    message: e.to_string(),
                })
            }
            (Err(e), _) => Err(e),
        }
    }

    fn transform_pmap(
        &self,
        cid: i64,
        pmap: &PseudoisomerMap,
        params: &AqueousParams,
        most_abundant: bool,
    ) -> Result<f64, GroupContributionError> {
        pmap.transform(params, most_abundant).map_err(|e| {
            GroupContributionError::MissingCompoundFormationEnergy {
                cid,
                message: e.to_string(),
            }
        })
    }

    /// Transformed formation energy of a molecule (all species).
    pub fn estimate_dG0(
        &self,
        mol: &Molecule,
        params: &AqueousParams,
    ) -> Result<f64, GroupContributionError> {
        let pmap = self.estimate_pmap(mol, false)?;
        pmap.transform(params, false).map_err(|e| {
            GroupContributionError::configuration(format!("{}: {}", mol.title, e))
        })
    }

    pub fn estimate_dG0_keggcid(
        &self,
        cid: i64,
        params: &AqueousParams,
        most_abundant: bool,
    ) -> Result<f64, GroupContributionError> {
        let pmap = self.cid2pmap(cid)?;
        self.transform_pmap(cid, &pmap, params, most_abundant)
    }

    /// pKa between the species of charge `charge` and `charge + 1`.
    pub fn estimate_pka_keggcid(
        &self,
        cid: i64,
        charge: i32,
        T: f64,
    ) -> Result<f64, GroupContributionError> {
        let pmap = self.cid2pmap(cid)?;
        let by_charge = |z: i32| {
            pmap.iter()
                .filter(|s| s.z == z && s.nMg == 0)
                .map(|s| s.dG0)
                .next()
        };
        match (by_charge(charge), by_charge(charge + 1)) {
            (Some(basic), Some(acidic)) => Ok((basic - acidic) / rt_ln10(T)),
            _ => Err(GroupContributionError::MissingTrainingData {
                message: format!(
                    "cannot determine the pKa of {} between charges {} and {}",
                    compound_label(cid),
                    charge,
                    charge + 1
                ),
                missing_groups: Vec::new(),
            }),
        }
    }

    /// dG0' of a reaction: sum of stoichiometry times the transformed formation energies.
    pub fn estimate_dG0_reaction(
        &self,
        reaction: &SparseReaction,
        params: &AqueousParams,
        most_abundant: bool,
    ) -> Result<f64, GroupContributionError> {
        reaction.iter().try_fold(0.0, |acc, (cid, coeff)| {
            let pmap = self.cid2pmap(*cid)?;
            Ok(acc + coeff * self.transform_pmap(*cid, &pmap, params, most_abundant)?)
        })
    }

    /// dG0' of a reaction on a grid; rows follow `pH_values`, columns `I_values`.
    pub fn estimate_dG0_reaction_grid(
        &self,
        reaction: &SparseReaction,
        pH_values: &[f64],
        pMg: f64,
        I_values: &[f64],
        T: f64,
        most_abundant: bool,
    ) -> Result<DMatrix<f64>, GroupContributionError> {
        let pmaps = reaction
            .iter()
            .map(|(cid, coeff)| Ok((*cid, *coeff, self.cid2pmap(*cid)?)))
            .collect::<Result<Vec<_>, GroupContributionError>>()?;
        let mut grid = DMatrix::zeros(pH_values.len(), I_values.len());
        for (i, pH) in pH_values.iter().enumerate() {
            for (j, I) in I_values.iter().enumerate() {
                let params = AqueousParams::new(*pH, pMg, *I, T);
                for (cid, coeff, pmap) in &pmaps {
                    grid[(i, j)] += coeff * self.transform_pmap(*cid, pmap, &params, most_abundant)?;
                }
            }
        }
        Ok(grid)
    }

    pub fn set_concentration(&mut self, cid: i64, media: &str, concentration: f64) {
        if !self.media_list.iter().any(|m| m == media) {
            self.media_list.push(media.to_string());
        }
        self.cid2conc.insert((cid, media.to_string()), concentration);
    }

    pub fn media_list(&self) -> &[String] {
        &self.media_list
    }

    /// Concentration in M; water is always 1, unknown entries fall back to `c0`.
    pub fn get_concentration(&self, cid: i64, c0: f64, media: Option<&str>) -> f64 {
        if cid == WATER_CID {
            return 1.0;
        }
        match media {
            None => c0,
            Some(media) => self
                .cid2conc
                .get(&(cid, media.to_string()))
                .copied()
                .unwrap_or(c0),
        }
    }

    pub fn get_concentration_list(&self, cid: i64, c0: f64) -> Vec<(String, f64)> {
        self.media_list
            .iter()
            .map(|media| (media.clone(), self.get_concentration(cid, c0, Some(media))))
            .collect()
    }

    /// dG' of a reaction at the concentrations of `media` (or `c0` everywhere).
    pub fn estimate_dG_reaction(
        &self,
        reaction: &SparseReaction,
        params: &AqueousParams,
        c0: f64,
        media: Option<&str>,
        most_abundant: bool,
    ) -> Result<f64, GroupContributionError> {
        let dG0 = self.estimate_dG0_reaction(reaction, params, most_abundant)?;
        let correction: f64 = reaction
            .iter()
            .map(|(cid, coeff)| coeff * self.get_concentration(*cid, c0, media).ln())
            .sum();
        Ok(dG0 + R * params.temperature * correction)
    }

    pub fn cid2groupvec(&self, cid: i64) -> Result<GroupVector, GroupContributionError> {
        let mol = self.cid2molecule(cid)?;
        Ok(self.decomposer()?.decompose(&mol, false, true)?.as_vector())
    }

    /// Stoichiometric sum of the compound vectors of a reaction.
    pub fn rid2groupvec(&self, reaction: &SparseReaction) -> Result<GroupVector, GroupContributionError> {
        let mut total = GroupVector::zeros(Arc::clone(self.groups_data()?));
        for (cid, coeff) in reaction {
            if *cid == PROTON_CID {
                continue;
            }
            total = total.add(&self.cid2groupvec(*cid)?.scalar_multiply(*coeff))?;
        }
        Ok(total)
    }

    /// Group table of a molecule, never failing on unassigned atoms unless `strict`.
    pub fn analyze_decomposition(
        &self,
        mol: &Molecule,
        ignore_protonations: bool,
        strict: bool,
    ) -> Result<String, GroupContributionError> {
        Ok(self
            .decomposer()?
            .decompose(mol, ignore_protonations, strict)?
            .to_table_string())
    }

    /// Group vectors of every compound of the source as CSV: `cid,slot values`.
    /// Compounds that cannot be decomposed are left out.
    pub fn cid_group_matrix(&self) -> Result<String, GroupContributionError> {
        let names = self.groups_data()?.all_group_names();
        let mut lines = vec![format!("cid,{}", names.join(","))];
        for cid in self.compounds.compound_ids() {
            match self.cid2groupvec(cid) {
                Ok(v) => lines.push(format!("{},{}", cid, v.to_csv_string())),
                Err(e) => debug!("{} left out of the group matrix: {}", compound_label(cid), e),
            }
        }
        Ok(lines.join("\n"))
    }

    // ---------------------------------------------------------------------------------
    // groups
    // ---------------------------------------------------------------------------------

    pub fn get_group_contribution(
        &self,
        name: &str,
        nH: i32,
        z: i32,
        nMg: i32,
    ) -> Result<f64, GroupContributionError> {
        let (contributions, _) = self.trained()?;
        let i = self
            .groups_data()?
            .index_of(name, nH, z, nMg)
            .ok_or_else(|| {
                GroupContributionError::configuration(format!(
                    "no group {} [H{} {} {}]",
                    name, nH, z, nMg
                ))
            })?;
        Ok(contributions[i])
    }

    /// pKa of a group between (nH, z) and (nH - 1, z - 1).
    pub fn get_pka_group(&self, name: &str, nH: i32, z: i32, nMg: i32) -> Result<f64, GroupContributionError> {
        let basic = self.get_group_contribution(name, nH - 1, z - 1, nMg)?;
        let acidic = self.get_group_contribution(name, nH, z, nMg)?;
        Ok((basic - acidic) / rt_ln10(default_T))
    }

    /// pK of Mg binding between (nMg, z) and (nMg - 1, z - 2).
    pub fn get_pk_mg_group(&self, name: &str, nH: i32, z: i32, nMg: i32) -> Result<f64, GroupContributionError> {
        let unbound = self.get_group_contribution(name, nH, z - 2, nMg - 1)?;
        let bound = self.get_group_contribution(name, nH, z, nMg)?;
        Ok((unbound + dG0_f_Mg - bound) / rt_ln10(default_T))
    }

    // ---------------------------------------------------------------------------------
    // batch estimation
    // ---------------------------------------------------------------------------------

    /// Estimates every compound of the source and fills the cache. A compound that fails
    /// gets its reason recorded and is skipped. Measured maps overlay the estimates
    /// when the policy prefers them or when nothing could be estimated.
    pub fn save_cid2pmap(&mut self) -> Result<(), GroupContributionError> {
        self.trained()?;
        info!("Calculating the table of formation energies for all compounds");
        let mut cache = BTreeMap::new();
        let mut cid2error = BTreeMap::new();
        for cid in self.compounds.compound_ids() {
            if cid % 1000 == 0 {
                info!("Saving compound {}", compound_label(cid));
            }
            let reason = match self.compounds.molecule(cid) {
                None => "no structure".to_string(),
                Some(Err(e)) => {
                    debug!("{}: {}", compound_label(cid), e);
                    "cannot determine molecular structure".to_string()
                }
                Some(Ok(mol)) => {
                    let mol = mol.with_title(&compound_label(cid));
                    match self.estimate_pmap(&mol, true) {
                        Ok(pmap) => {
                            cache.insert(cid, pmap);
                            "OK".to_string()
                        }
                        Err(GroupContributionError::Decomposition(_)) => {
                            "cannot decompose into groups".to_string()
                        }
                        Err(GroupContributionError::MissingTrainingData { .. }) => {
                            "contains groups lacking training data".to_string()
                        }
                        Err(e) => return Err(e),
                    }
                }
            };
            cid2error.insert(cid, reason);
        }
        let estimated = cache.len();
        self.set_cache(cache);
        self.cid2error = cid2error;
        info!(
            "{} of {} compounds were estimated",
            estimated,
            self.cid2error.len()
        );
        Ok(())
    }

    /// Installs estimated maps, overlaying the measured ones, and enables estimation from
    /// the cache.
    pub(crate) fn set_cache(&mut self, estimated: BTreeMap<i64, PseudoisomerMap>) {
        let mut cache = estimated;
        for (cid, obs) in &self.cid2pmap_obs {
            if self.options.override_gc_with_measurements || !cache.contains_key(cid) {
                cache.insert(*cid, obs.clone());
            }
        }
        let mut proton = PseudoisomerMap::new();
        proton.add(0, 0, 0, 0.0);
        cache.entry(PROTON_CID).or_insert(proton);
        self.cid2pmap_cache = Some(cache);
        self.state = ModelState::EstimationReady;
    }

    /// Drops the cache, estimates are computed on demand again.
    pub fn clear_cache(&mut self) {
        self.cid2pmap_cache = None;
        if self.state == ModelState::EstimationReady {
            self.state = ModelState::Trained;
        }
    }

    // ---------------------------------------------------------------------------------
    // reports
    // ---------------------------------------------------------------------------------

    /// Leave-one-out cross validation over the formation energy rows.
    pub fn analyze_training_set(&self) -> Result<CrossValidationReport, GroupContributionError> {
        let (_, full_nullspace) = self.trained()?;
        if self.training.len() < 2 {
            return Err(GroupContributionError::configuration(
                "leave-one-out needs at least two training rows",
            ));
        }
        let mut deviations = Vec::new();
        for (i, name) in self.training.names.iter().enumerate() {
            if name.starts_with("pKa") {
                continue;
            }
            let observed = self.training.observations[i];
            let (a, y) = self.training.without_row(i);
            let result = least_squares(&a, &y, true, self.options.eps)?;
            if result.nullspace.nrows() > full_nullspace.nrows() {
                deviations.push(Deviation {
                    name: name.clone(),
                    observed,
                    estimated: None,
                    error: None,
                    remark: "linearly independent example".to_string(),
                });
                continue;
            }
            let estimated = self.training.rows[i].dot(&result.coefficients)?;
            let error = observed - estimated;
            info!(
                "{}: obs = {:.1}, est = {:.1}, error = {:.1}",
                name, observed, estimated, error
            );
            deviations.push(Deviation {
                name: name.clone(),
                observed,
                estimated: Some(estimated),
                error: Some(error),
                remark: String::new(),
            });
        }
        deviations.sort_by(|a, b| match (a.error, b.error) {
            (Some(x), Some(y)) => y.abs().total_cmp(&x.abs()),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        let errors: Vec<f64> = deviations.iter().filter_map(|d| d.error).collect();
        let n = errors.len().max(1) as f64;
        let mean_error = errors.iter().sum::<f64>() / n;
        let std_error = (errors.iter().map(|e| (e - mean_error).powi(2)).sum::<f64>() / n).sqrt();
        let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
        Ok(CrossValidationReport {
            deviations,
            mean_error,
            std_error,
            rmse,
        })
    }

    /// Table of the group contributions and their values at pH `pH`, with the training
    /// rows that use each group.
    pub fn write_regression_report(&self, T: f64, pH: f64) -> Result<String, GroupContributionError> {
        let (contributions, _) = self.trained()?;
        let groups_data = self.groups_data()?;
        let names = groups_data.all_group_names();
        let mut table = Table::new();
        table.add_row(row![
            "#", "Group Name", "nH", "charge", "nMg", "dG0_gr", "dG0'_gr", "Training Compounds"
        ]);
        for (j, dG0_gr) in contributions.iter().enumerate() {
            let (nH, z, nMg) = groups_data
                .group(j)
                .map(|g| (g.hydrogens(), g.charge(), g.nMg()))
                .unwrap_or((0, 0, 0));
            let dG0_gr_tag = dG0_gr + rt_ln10(T) * pH * nH as f64;
            let users: Vec<&str> = self
                .training
                .rows
                .iter()
                .zip(&self.training.names)
                .filter(|(row, _)| row.get(j).is_some_and(|v| v != 0.0))
                .map(|(_, name)| name.as_str())
                .collect();
            table.add_row(row![
                j,
                names[j],
                nH,
                z,
                nMg,
                format!("{:.1}", dG0_gr),
                format!("{:.1}", dG0_gr_tag),
                users.join("\n")
            ]);
        }
        Ok(table.to_string())
    }

    /// Nullspace rows as "k x group" lists.
    pub fn nullspace_strings(&self) -> Result<Vec<String>, GroupContributionError> {
        let (_, nullspace) = self.trained()?;
        let names = self.groups_data()?.all_group_names();
        Ok(nullspace
            .row_iter()
            .map(|row| {
                row.iter()
                    .zip(&names)
                    .filter(|(v, _)| v.abs() > 1e-10)
                    .map(|(v, name)| format!("{} x {}", v, name))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect())
    }
}
