//! Persisted state of a trained model: the group library, the contributions with their
//! nullspace, the training set, the measured maps and the cache of estimated maps.
//! All tables live in one JSON document that is written to a temporary file in the
//! target directory and then renamed over the target, so a reader never sees a
//! partially written set of tables.
use crate::GroupContribution::gc_errors::GroupContributionError;
use crate::GroupContribution::group_contribution::{GroupContribution, ModelState, compound_label};
use crate::GroupContribution::group_vector::GroupVector;
use crate::GroupContribution::groups_data::{GroupDefinition, GroupsData};
use crate::GroupContribution::training_data::{TrainingData, UsageFlag};
use crate::Thermodynamics::pseudoisomer::PseudoisomerMap;
use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionRow {
    pub gid: usize,
    pub name: String,
    pub nH: i32,
    pub z: i32,
    pub nMg: i32,
    pub dG0_gr: f64,
    /// column `gid` of the nullspace as comma separated text
    pub nullspace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub cid: i64,
    pub name: String,
    pub nH: i32,
    pub z: i32,
    pub nMg: i32,
    pub dG0_f: f64,
    pub use_for: UsageFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationEnergyRow {
    pub cid: i64,
    pub nH: i32,
    pub z: i32,
    pub nMg: i32,
    pub dG0: f64,
    pub estimated: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GCTables {
    pub groups: Vec<GroupDefinition>,
    pub contribution: Vec<ContributionRow>,
    /// human readable nullspace rows
    pub nullspace: Vec<String>,
    /// one CSV group vector per training row
    pub train_group_matrix: Vec<String>,
    pub train_observations: Vec<f64>,
    pub train_molecules: Vec<String>,
    pub observation: Vec<ObservationRow>,
    #[serde(default)]
    pub gc_cid2prm: Vec<FormationEnergyRow>,
    #[serde(default)]
    pub gc_cid2error: BTreeMap<i64, String>,
}

fn parse_column(text: &str) -> Result<Vec<f64>, GroupContributionError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|s| {
            s.trim().parse::<f64>().map_err(|_| {
                GroupContributionError::configuration(format!("bad nullspace entry '{}'", s))
            })
        })
        .collect()
}

impl GCTables {
    /// Atomically replaces `path` with the serialized tables.
    pub fn save(&self, path: &Path) -> Result<(), GroupContributionError> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        file.flush()?;
        file.persist(path).map_err(|e| e.error)?;
        info!("group contribution tables written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, GroupContributionError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// nullspace rebuilt from the per-group columns (rows = kernel vectors)
    pub fn nullspace_matrix(&self) -> Result<DMatrix<f64>, GroupContributionError> {
        let columns = self
            .contribution
            .iter()
            .map(|row| parse_column(&row.nullspace))
            .collect::<Result<Vec<_>, _>>()?;
        let k = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != k) {
            return Err(GroupContributionError::configuration(
                "nullspace columns have different lengths",
            ));
        }
        Ok(DMatrix::from_fn(k, columns.len(), |i, j| columns[j][i]))
    }
}

impl GroupContribution {
    /// Snapshot of the trained model as persistence tables.
    pub fn to_tables(&self) -> Result<GCTables, GroupContributionError> {
        let groups_data = self.groups_data()?;
        let (contributions, nullspace) = match (&self.contributions, &self.nullspace) {
            (Some(c), Some(n)) => (c, n),
            _ => {
                return Err(GroupContributionError::configuration(
                    "cannot save the contributions of an untrained model",
                ));
            }
        };
        let names = groups_data.all_group_names();
        let contribution = contributions
            .iter()
            .enumerate()
            .map(|(j, dG0_gr)| {
                let (nH, z, nMg) = groups_data
                    .group(j)
                    .map(|g| (g.hydrogens(), g.charge(), g.nMg()))
                    .unwrap_or((0, 0, 0));
                ContributionRow {
                    gid: j,
                    name: names[j].clone(),
                    nH,
                    z,
                    nMg,
                    dG0_gr: *dG0_gr,
                    nullspace: nullspace
                        .column(j)
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                }
            })
            .collect();

        let mut observation = Vec::new();
        for (cid, pmap) in &self.cid2pmap_obs {
            let use_for = if self.cid_test_set.contains(cid) {
                UsageFlag::Test
            } else {
                UsageFlag::Train
            };
            let name = self
                .compounds
                .compound_name(*cid)
                .unwrap_or_else(|| compound_label(*cid));
            for s in pmap.iter() {
                observation.push(ObservationRow {
                    cid: *cid,
                    name: name.clone(),
                    nH: s.nH,
                    z: s.z,
                    nMg: s.nMg,
                    dG0_f: s.dG0,
                    use_for,
                });
            }
        }

        let mut gc_cid2prm = Vec::new();
        if let Some(cache) = &self.cid2pmap_cache {
            for (cid, pmap) in cache {
                let estimated = self.cid2error.get(cid).is_some_and(|r| r == "OK")
                    && !(self.cid2pmap_obs.contains_key(cid) && self.options.override_gc_with_measurements);
                if !estimated {
                    continue;
                }
                for s in pmap.iter() {
                    gc_cid2prm.push(FormationEnergyRow {
                        cid: *cid,
                        nH: s.nH,
                        z: s.z,
                        nMg: s.nMg,
                        dG0: s.dG0,
                        estimated: true,
                    });
                }
            }
            for row in &observation {
                gc_cid2prm.push(FormationEnergyRow {
                    cid: row.cid,
                    nH: row.nH,
                    z: row.z,
                    nMg: row.nMg,
                    dG0: row.dG0_f,
                    estimated: false,
                });
            }
        }

        Ok(GCTables {
            groups: groups_data.definitions.clone(),
            contribution,
            nullspace: self.nullspace_strings()?,
            train_group_matrix: self.training.rows.iter().map(|r| r.to_csv_string()).collect(),
            train_observations: self.training.observations.clone(),
            train_molecules: self.training.names.clone(),
            observation,
            gc_cid2prm,
            gc_cid2error: self.cid2error.clone(),
        })
    }

    pub fn save_tables(&self, path: &Path) -> Result<(), GroupContributionError> {
        self.to_tables()?.save(path)
    }

    /// Restores a model from tables. The groups are rebuilt from their definitions; the
    /// cache is installed only if the tables hold one.
    pub fn load_tables(&mut self, tables: &GCTables) -> Result<(), GroupContributionError> {
        self.load_groups(GroupsData::from_definitions(tables.groups.clone())?)?;
        let groups_data = Arc::clone(self.groups_data()?);
        if tables.contribution.len() != groups_data.vector_len() {
            return Err(GroupContributionError::configuration(format!(
                "{} contributions stored for {} group slots",
                tables.contribution.len(),
                groups_data.vector_len()
            )));
        }

        let mut training = TrainingData::new();
        for ((row, obs), name) in tables
            .train_group_matrix
            .iter()
            .zip(&tables.train_observations)
            .zip(&tables.train_molecules)
        {
            training.push(
                GroupVector::from_csv_string(Arc::clone(&groups_data), row)?,
                *obs,
                name.clone(),
            );
        }

        self.cid2pmap_obs.clear();
        self.cid_test_set.clear();
        for row in &tables.observation {
            self.cid2pmap_obs
                .entry(row.cid)
                .or_insert_with(PseudoisomerMap::new)
                .add(row.nH, row.z, row.nMg, row.dG0_f);
            if row.use_for == UsageFlag::Test {
                self.cid_test_set.insert(row.cid);
            }
        }

        self.contributions = Some(DVector::from_iterator(
            tables.contribution.len(),
            tables.contribution.iter().map(|r| r.dG0_gr),
        ));
        self.nullspace = Some(tables.nullspace_matrix()?);
        self.training = training;
        self.state = ModelState::Trained;

        if !tables.gc_cid2prm.is_empty() {
            let mut estimated: BTreeMap<i64, PseudoisomerMap> = BTreeMap::new();
            for row in tables.gc_cid2prm.iter().filter(|r| r.estimated) {
                estimated
                    .entry(row.cid)
                    .or_default()
                    .add(row.nH, row.z, row.nMg, row.dG0);
            }
            self.set_cache(estimated);
        }
        self.cid2error = tables.gc_cid2error.clone();
        info!(
            "restored {} contributions and {} training rows",
            tables.contribution.len(),
            self.training.len()
        );
        Ok(())
    }

    pub fn load_tables_from_file(&mut self, path: &Path) -> Result<(), GroupContributionError> {
        let tables = GCTables::load(path)?;
        self.load_tables(&tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GroupContribution::group_contribution::GCOptions;
    use approx::assert_relative_eq;

    fn trained_model() -> GroupContribution {
        let mut gc = GroupContribution::new(GCOptions::default());
        gc.load_groups(
            GroupsData::from_definitions(vec![
                GroupDefinition::new("G1", 0, 0, 0, "C", "all"),
                GroupDefinition::new("G2", 1, -1, 0, "O", "all"),
            ])
            .unwrap(),
        )
        .unwrap();
        let gd = Arc::clone(gc.groups_data().unwrap());
        let mut data = TrainingData::new();
        data.push(GroupVector::with_origin(gd.clone(), [1.0, 0.0]), 10.0, "a".into());
        data.push(GroupVector::with_origin(gd.clone(), [2.0, 0.0]), 20.0, "b".into());
        gc.train_on(data).unwrap();
        gc
    }

    #[test]
    fn test_nullspace_column_text_round_trip() {
        let gc = trained_model();
        let tables = gc.to_tables().unwrap();
        assert_eq!(tables.contribution.len(), 3);
        assert_eq!(tables.contribution[2].name, "origin");
        let restored = tables.nullspace_matrix().unwrap();
        assert_eq!(&restored, gc.nullspace().unwrap());
    }

    #[test]
    fn test_save_and_load_file() {
        let gc = trained_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc_tables.json");
        gc.save_tables(&path).unwrap();

        let mut restored = GroupContribution::default();
        restored.load_tables_from_file(&path).unwrap();
        assert_eq!(restored.state(), ModelState::Trained);
        assert_eq!(restored.training_data().len(), 2);
        let a = gc.contributions().unwrap();
        let b = restored.contributions().unwrap();
        for i in 0..a.len() {
            assert_relative_eq!(a[i], b[i], epsilon = 1e-12);
        }
        let gd = Arc::clone(restored.groups_data().unwrap());
        let v = GroupVector::with_origin(gd, [3.0, 0.0]);
        assert_relative_eq!(restored.groupvec2val(&v).unwrap(), 30.0, epsilon = 1e-8);
    }

    #[test]
    fn test_untrained_model_has_no_tables() {
        let mut gc = GroupContribution::default();
        assert!(gc.to_tables().is_err());
        gc.load_default_groups().unwrap();
        assert!(gc.to_tables().is_err());
    }

    #[test]
    fn test_malformed_nullspace_text() {
        let mut tables = trained_model().to_tables().unwrap();
        tables.contribution[0].nullspace = "1,x".into();
        assert!(tables.nullspace_matrix().is_err());
    }
}
