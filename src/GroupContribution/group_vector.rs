//! Group counts of a compound (or of a difference of compounds) over the slots of a
//! `GroupsData`, plus the trailing origin slot.
use crate::GroupContribution::gc_errors::GroupContributionError;
use crate::GroupContribution::groups_data::GroupsData;
use nalgebra::DVector;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GroupVector {
    groups_data: Arc<GroupsData>,
    values: Vec<f64>,
}

impl GroupVector {
    /// all slots zero, origin included
    pub fn zeros(groups_data: Arc<GroupsData>) -> Self {
        let n = groups_data.vector_len();
        GroupVector {
            groups_data,
            values: vec![0.0; n],
        }
    }

    pub fn from_values(
        groups_data: Arc<GroupsData>,
        values: Vec<f64>,
    ) -> Result<Self, GroupContributionError> {
        if values.len() != groups_data.vector_len() {
            return Err(GroupContributionError::configuration(format!(
                "group vector has {} slots, the groups data needs {}",
                values.len(),
                groups_data.vector_len()
            )));
        }
        Ok(GroupVector {
            groups_data,
            values,
        })
    }

    /// Group slots taken from `counts` (missing ones stay zero), origin set to 1.
    pub fn with_origin(groups_data: Arc<GroupsData>, counts: impl IntoIterator<Item = f64>) -> Self {
        let mut v = Self::zeros(groups_data);
        let n = v.values.len() - 1;
        for (slot, count) in v.values[..n].iter_mut().zip(counts) {
            *slot = count;
        }
        v.values[n] = 1.0;
        v
    }

    pub fn groups_data(&self) -> &Arc<GroupsData> {
        &self.groups_data
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        self.values.get(i).copied()
    }

    pub fn set(&mut self, i: usize, value: f64) -> Result<(), GroupContributionError> {
        let n = self.values.len();
        let slot = self.values.get_mut(i).ok_or_else(|| {
            GroupContributionError::configuration(format!("slot {} is out of range ({})", i, n))
        })?;
        *slot = value;
        Ok(())
    }

    pub fn origin(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    fn check_len(&self, other: &GroupVector) -> Result<(), GroupContributionError> {
        if self.values.len() != other.values.len() {
            return Err(GroupContributionError::configuration(format!(
                "cannot combine group vectors of lengths {} and {}",
                self.values.len(),
                other.values.len()
            )));
        }
        Ok(())
    }

    fn zip_with(
        &self,
        other: &GroupVector,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<GroupVector, GroupContributionError> {
        self.check_len(other)?;
        Ok(GroupVector {
            groups_data: Arc::clone(&self.groups_data),
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| op(*a, *b))
                .collect(),
        })
    }

    pub fn add(&self, other: &GroupVector) -> Result<GroupVector, GroupContributionError> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn subtract(&self, other: &GroupVector) -> Result<GroupVector, GroupContributionError> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn scalar_multiply(&self, factor: f64) -> GroupVector {
        GroupVector {
            groups_data: Arc::clone(&self.groups_data),
            values: self.values.iter().map(|v| v * factor).collect(),
        }
    }

    fn weighted_sum(&self, weights: &[i32]) -> i32 {
        self.values
            .iter()
            .zip(weights)
            .map(|(v, w)| v * (*w as f64))
            .sum::<f64>()
            .round() as i32
    }

    pub fn net_charge(&self) -> i32 {
        self.weighted_sum(&self.groups_data.charges)
    }

    pub fn hydrogens(&self) -> i32 {
        self.weighted_sum(&self.groups_data.hydrogens)
    }

    pub fn magnesiums(&self) -> i32 {
        self.weighted_sum(&self.groups_data.nMg)
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    pub fn to_dvector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.values)
    }

    pub fn dot(&self, other: &DVector<f64>) -> Result<f64, GroupContributionError> {
        if other.len() != self.values.len() {
            return Err(GroupContributionError::configuration(format!(
                "cannot take the dot product of {} slots with a vector of length {}",
                self.values.len(),
                other.len()
            )));
        }
        Ok(self.values.iter().zip(other.iter()).map(|(a, b)| a * b).sum())
    }

    /// (slot name, value) for the non-zero slots
    pub fn non_zero(&self) -> Vec<(String, f64)> {
        let names = self.groups_data.all_group_names();
        self.values
            .iter()
            .zip(names)
            .filter(|(v, _)| **v != 0.0)
            .map(|(v, name)| (name, *v))
            .collect()
    }

    /// comma separated slot values in shortest round-trip form
    pub fn to_csv_string(&self) -> String {
        self.values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn from_csv_string(
        groups_data: Arc<GroupsData>,
        text: &str,
    ) -> Result<Self, GroupContributionError> {
        let values = text
            .split(',')
            .map(|s| {
                s.trim().parse::<f64>().map_err(|_| {
                    GroupContributionError::configuration(format!("bad group vector entry '{}'", s))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_values(groups_data, values)
    }
}

impl PartialEq for GroupVector {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl fmt::Display for GroupVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .non_zero()
            .into_iter()
            .map(|(name, v)| {
                if v.fract() == 0.0 {
                    format!("{} x {}", name, v as i64)
                } else {
                    format!("{} x {}", name, v)
                }
            })
            .collect();
        write!(f, "{}", parts.join(" | "))
    }
}
