//! # Rank Deficient Linear Regression
//!
//! ## Aim
//! Least squares solution of `A·x = y` for design matrices that are not of full column rank,
//! together with an explicit basis of the kernel of `A`. A query vector `v` can only be
//! evaluated reliably against the fitted `x` when it is orthogonal to every kernel row.
//!
//! ## Main routines
//! - `least_squares()`: pseudo-inverse solution and kernel (rows are basis vectors);
//!   when `y` has the length of the columns rather than the rows the dual system is solved
//! - `to_reduced_row_echelon_form()`: in-place Gauss-Jordan elimination, returns lead and free columns
//! - `least_squares_with_fixed_points()`: moves the solution along the kernel so that chosen
//!   coefficients take prescribed values while `A·x` stays unchanged
//! - `solve_linear_system()`, `find_kernel()`: exact solution of a consistent system via RREF
//! - `row_projection()`, `column_projection()`: orthogonal projectors onto row/column space and complement
//! - `row_unique()`, `row_unique_regression()` and their column twins: merge repeated observations
//!
//! All thresholds are absolute and compared with singular values (default `DEFAULT_EPS`).
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_EPS: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub enum LinearRegressionError {
    DimensionMismatch {
        rows: usize,
        columns: usize,
        observations: usize,
    },
    SingularConstraints {
        requested: usize,
        rank: usize,
    },
    EmptyInput,
    Decomposition(String),
}

impl fmt::Display for LinearRegressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinearRegressionError::DimensionMismatch {
                rows,
                columns,
                observations,
            } => write!(
                f,
                "The length of y ({}) does not match the number of rows ({}) or columns ({}) in A",
                observations, rows, columns
            ),
            LinearRegressionError::SingularConstraints { requested, rank } => write!(
                f,
                "Cannot set {} variables to desired values, the truncated kernel matrix has rank {} and is not invertible",
                requested, rank
            ),
            LinearRegressionError::EmptyInput => write!(f, "Empty design matrix"),
            LinearRegressionError::Decomposition(msg) => write!(f, "SVD failed: {}", msg),
        }
    }
}

impl std::error::Error for LinearRegressionError {}

/// fitted coefficients and the kernel of the design matrix (one basis vector per row)
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionResult {
    pub coefficients: DVector<f64>,
    pub nullspace: DMatrix<f64>,
    pub rank: usize,
}

/// singular value decomposition with a square `v_t` and singular values in decreasing order
struct FullSvd {
    singular_values: Vec<f64>,
    v_t: DMatrix<f64>,
}

impl FullSvd {
    fn rank(&self, eps: f64) -> usize {
        self.singular_values.iter().filter(|s| **s > eps).count()
    }
}

/// nalgebra returns a thin `v_t` (min(n, m) rows); padding `a` with zero rows up to a square
/// matrix gives the complete right singular basis without changing the singular values
fn full_svd(a: &DMatrix<f64>) -> Result<FullSvd, LinearRegressionError> {
    let (n, m) = a.shape();
    let padded = if n < m {
        let mut p = DMatrix::zeros(m, m);
        p.rows_mut(0, n).copy_from(a);
        p
    } else {
        a.clone()
    };
    let svd = padded.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| LinearRegressionError::Decomposition("right singular vectors were not computed".to_string()))?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| {
        svd.singular_values[j]
            .partial_cmp(&svd.singular_values[i])
            .unwrap_or(Ordering::Equal)
    });
    let singular_values: Vec<f64> = order.iter().map(|&i| svd.singular_values[i]).collect();
    let v_t = DMatrix::from_fn(m, m, |r, c| v_t[(order[r], c)]);
    Ok(FullSvd {
        singular_values,
        v_t,
    })
}

pub fn matrix_rank(a: &DMatrix<f64>, eps: f64) -> usize {
    if a.is_empty() {
        return 0;
    }
    a.singular_values().iter().filter(|s| **s > eps).count()
}

pub fn pseudo_inverse(a: &DMatrix<f64>, eps: f64) -> Result<DMatrix<f64>, LinearRegressionError> {
    let (n, m) = a.shape();
    if n == 0 || m == 0 {
        return Ok(DMatrix::zeros(m, n));
    }
    a.clone()
        .pseudo_inverse(eps)
        .map_err(|e| LinearRegressionError::Decomposition(e.to_string()))
}

/// Basis of the kernel of `a`, one vector per row, optionally brought to reduced row echelon form.
pub fn kernel(
    a: &DMatrix<f64>,
    reduced_row_echelon: bool,
    eps: f64,
) -> Result<DMatrix<f64>, LinearRegressionError> {
    let m = a.ncols();
    if a.nrows() == 0 {
        return Ok(DMatrix::identity(m, m));
    }
    let svd = full_svd(a)?;
    let r = svd.rank(eps);
    let mut ker = svd.v_t.rows(r, m - r).clone_owned();
    if reduced_row_echelon {
        to_reduced_row_echelon_form(&mut ker, eps, true);
    }
    Ok(ker)
}

/// Safe least squares. Rows of `a` are observations; if the length of `y` equals the number
/// of columns instead, the transposed system is solved.
pub fn least_squares(
    a: &DMatrix<f64>,
    y: &DVector<f64>,
    reduced_row_echelon: bool,
    eps: f64,
) -> Result<RegressionResult, LinearRegressionError> {
    let (n, m) = a.shape();
    if n == 0 || m == 0 {
        return Err(LinearRegressionError::EmptyInput);
    }
    if y.len() == n {
        solve_least_squares(a, y, reduced_row_echelon, eps)
    } else if y.len() == m {
        solve_least_squares(&a.transpose(), y, reduced_row_echelon, eps)
    } else {
        Err(LinearRegressionError::DimensionMismatch {
            rows: n,
            columns: m,
            observations: y.len(),
        })
    }
}

fn solve_least_squares(
    a: &DMatrix<f64>,
    y: &DVector<f64>,
    reduced_row_echelon: bool,
    eps: f64,
) -> Result<RegressionResult, LinearRegressionError> {
    let m = a.ncols();
    let (nonzero_columns, zero_columns): (Vec<usize>, Vec<usize>) =
        (0..m).partition(|&j| a.column(j).norm() > eps);
    let m_red = nonzero_columns.len();

    let mut weights = DVector::zeros(m);
    let (r, reduced_kernel) = if m_red == 0 {
        (0, DMatrix::zeros(0, 0))
    } else {
        let a_red = a.select_columns(&nonzero_columns);
        let svd = full_svd(&a_red)?;
        let r = svd.rank(eps);
        // x = V_r S_r^-1 U_r^T y with U_r = A V_r S_r^-1
        for i in 0..r {
            let v_i = svd.v_t.row(i).transpose();
            let s_i = svd.singular_values[i];
            let coeff = (&a_red * &v_i).dot(y) / (s_i * s_i);
            for (j, col) in nonzero_columns.iter().enumerate() {
                weights[*col] += coeff * v_i[j];
            }
        }
        (r, svd.v_t.rows(r, m_red - r).clone_owned())
    };
    if r < m {
        debug!(
            "The rank of A ({}) is lower than the number of columns ({}), i.e. there is a deficiency of dimension {}",
            r,
            m,
            m - r
        );
    }

    let mut nullspace = DMatrix::zeros(m - r, m);
    for k in 0..(m_red - r) {
        for (j, col) in nonzero_columns.iter().enumerate() {
            nullspace[(k, *col)] = reduced_kernel[(k, j)];
        }
    }
    for (i, col) in zero_columns.iter().enumerate() {
        nullspace[(m_red - r + i, *col)] = 1.0;
    }
    if reduced_row_echelon {
        to_reduced_row_echelon_form(&mut nullspace, eps, true);
    }
    Ok(RegressionResult {
        coefficients: weights,
        nullspace,
        rank: r,
    })
}

/// Gauss-Jordan elimination in place. Returns `(leads, non_leads)`: the pivot columns in
/// row order and the columns without a pivot. With `reduce_last_column = false` the last
/// column is carried along but never used as a pivot (augmented systems).
pub fn to_reduced_row_echelon_form(
    a: &mut DMatrix<f64>,
    eps: f64,
    reduce_last_column: bool,
) -> (Vec<usize>, Vec<usize>) {
    let row_count = a.nrows();
    let column_count = if reduce_last_column {
        a.ncols()
    } else {
        a.ncols().saturating_sub(1)
    };
    let mut leads = Vec::new();
    let mut non_leads = Vec::new();
    let mut lead = 0;
    for r in 0..row_count {
        if lead >= column_count {
            return (leads, non_leads);
        }
        let mut i = r;
        while a[(i, lead)].abs() < eps {
            i += 1;
            if i == row_count {
                i = r;
                non_leads.push(lead);
                lead += 1;
                if lead == column_count {
                    return (leads, non_leads);
                }
            }
        }
        a.swap_rows(i, r);
        let pivot_row = a.row(r) / a[(r, lead)];
        a.set_row(r, &pivot_row);
        leads.push(lead);
        for i in 0..row_count {
            let factor = a[(i, lead)];
            if i != r && factor != 0.0 {
                let reduced = a.row(i) - &pivot_row * factor;
                a.set_row(i, &reduced);
            }
        }
        lead += 1;
    }
    non_leads.extend(lead..column_count);
    (leads, non_leads)
}

/// Solves the least squares problem, then adds a kernel combination so that each
/// `index -> value` constraint holds exactly. `A·x` is unchanged by the correction.
pub fn least_squares_with_fixed_points(
    a: &DMatrix<f64>,
    y: &DVector<f64>,
    index2value: &BTreeMap<usize, f64>,
    eps: f64,
) -> Result<(DVector<f64>, DMatrix<f64>), LinearRegressionError> {
    let RegressionResult {
        coefficients: mut x,
        nullspace: k,
        ..
    } = least_squares(a, y, false, eps)?;
    let m = x.len();
    if let Some(bad) = index2value.keys().find(|i| **i >= m) {
        return Err(LinearRegressionError::DimensionMismatch {
            rows: a.nrows(),
            columns: m,
            observations: *bad + 1,
        });
    }
    let indices: Vec<usize> = index2value.keys().copied().collect();
    let k_trunc = DMatrix::from_fn(indices.len(), k.nrows(), |row, col| k[(col, indices[row])]);
    let k_inv = pseudo_inverse(&k_trunc, eps)?;
    let rank = matrix_rank(&k_inv, eps);
    if rank < index2value.len() {
        return Err(LinearRegressionError::SingularConstraints {
            requested: index2value.len(),
            rank,
        });
    }
    let delta = DVector::from_iterator(
        indices.len(),
        index2value.iter().map(|(i, v)| v - x[*i]),
    );
    let shift = &k_inv * delta;
    x += k.transpose() * shift;
    Ok((x, k))
}

/// Exact solution of a consistent system: a least squares particular solution is turned
/// into RREF form of the augmented matrix, free variables are set to zero. Returns the
/// particular solution and a kernel basis (one vector per free column).
pub fn solve_linear_system(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    eps: f64,
) -> Result<(DVector<f64>, DMatrix<f64>), LinearRegressionError> {
    let (n, m) = a.shape();
    if b.len() != n {
        return Err(LinearRegressionError::DimensionMismatch {
            rows: n,
            columns: m,
            observations: b.len(),
        });
    }
    let x_ls = pseudo_inverse(a, eps)? * b;
    let new_b = a * &x_ls;
    let mut augmented = DMatrix::zeros(n, m + 1);
    augmented.columns_mut(0, m).copy_from(a);
    augmented.set_column(m, &new_b);
    let (leads, _) = to_reduced_row_echelon_form(&mut augmented, eps, false);

    let mut x = DVector::zeros(m);
    for (i, col) in leads.iter().enumerate() {
        x[*col] = augmented[(i, m)];
    }
    let mut k = DMatrix::zeros(m - leads.len(), m);
    let mut row = 0;
    for col in 0..m {
        if leads.contains(&col) {
            row += 1;
        } else {
            for i in 0..row {
                k[(col - row, leads[i])] = -augmented[(i, col)];
            }
            k[(col - row, col)] = 1.0;
        }
    }
    Ok((x, k))
}

pub fn find_kernel(a: &DMatrix<f64>, eps: f64) -> Result<DMatrix<f64>, LinearRegressionError> {
    let b = DVector::zeros(a.nrows());
    let (_, k) = solve_linear_system(a, &b, eps)?;
    Ok(k)
}

/// `(P_R, P_N)`: projections onto the row space of `a` and onto its null space, `P_R + P_N = I`
pub fn row_projection(
    a: &DMatrix<f64>,
    eps: f64,
) -> Result<(DMatrix<f64>, DMatrix<f64>), LinearRegressionError> {
    let m = a.ncols();
    if a.nrows() == 0 {
        return Ok((DMatrix::zeros(m, m), DMatrix::identity(m, m)));
    }
    let svd = full_svd(a)?;
    let r = svd.rank(eps);
    let v_r = svd.v_t.rows(0, r);
    let v_n = svd.v_t.rows(r, m - r);
    Ok((v_r.transpose() * v_r, v_n.transpose() * v_n))
}

/// `(P_C, P_L)`: projections onto the column space of `a` and onto its left null space
pub fn column_projection(
    a: &DMatrix<f64>,
    eps: f64,
) -> Result<(DMatrix<f64>, DMatrix<f64>), LinearRegressionError> {
    row_projection(&a.transpose(), eps)
}

fn lexicographic(x: &[f64], y: &[f64]) -> Ordering {
    x.iter()
        .zip(y.iter())
        .map(|(a, b)| a.total_cmp(b))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| x.len().cmp(&y.len()))
}

/// Distinct rows of `a` in lexicographic order, and for each of them the indices of the
/// rows of `a` equal to it. With `remove_zero` all-zero rows are dropped.
pub fn row_unique(a: &DMatrix<f64>, remove_zero: bool) -> (DMatrix<f64>, Vec<Vec<usize>>) {
    let rows: Vec<Vec<f64>> = a
        .row_iter()
        .map(|r| r.iter().copied().collect())
        .collect();
    let mut unique: Vec<Vec<f64>> = rows
        .iter()
        .filter(|r| !remove_zero || r.iter().any(|v| *v != 0.0))
        .cloned()
        .collect();
    unique.sort_by(|x, y| lexicographic(x, y));
    unique.dedup();
    let mapping: Vec<Vec<usize>> = unique
        .iter()
        .map(|u| {
            rows.iter()
                .enumerate()
                .filter(|(_, r)| *r == u)
                .map(|(i, _)| i)
                .collect()
        })
        .collect();
    let a_unique = DMatrix::from_fn(unique.len(), a.ncols(), |i, j| unique[i][j]);
    (a_unique, mapping)
}

pub fn column_unique(a: &DMatrix<f64>, remove_zero: bool) -> (DMatrix<f64>, Vec<Vec<usize>>) {
    let (unique, mapping) = row_unique(&a.transpose(), remove_zero);
    (unique.transpose(), mapping)
}

fn averaged(y: &DVector<f64>, mapping: &[Vec<usize>]) -> DVector<f64> {
    DVector::from_iterator(
        mapping.len(),
        mapping
            .iter()
            .map(|idx| idx.iter().map(|i| y[*i]).sum::<f64>() / idx.len() as f64),
    )
}

/// Collapses repeated rows of `a` and averages the corresponding observations.
pub fn row_unique_regression(
    a: &DMatrix<f64>,
    y: &DVector<f64>,
) -> Result<(DMatrix<f64>, DVector<f64>), LinearRegressionError> {
    if y.len() != a.nrows() {
        return Err(LinearRegressionError::DimensionMismatch {
            rows: a.nrows(),
            columns: a.ncols(),
            observations: y.len(),
        });
    }
    let (a_unique, mapping) = row_unique(a, false);
    if a_unique.nrows() < a.nrows() {
        info!(
            "merged {} repeated observations into {} distinct rows",
            a.nrows(),
            a_unique.nrows()
        );
    }
    Ok((a_unique, averaged(y, &mapping)))
}

/// Collapses repeated columns of `a` and averages the corresponding observations.
pub fn column_unique_regression(
    a: &DMatrix<f64>,
    y: &DVector<f64>,
) -> Result<(DMatrix<f64>, DVector<f64>), LinearRegressionError> {
    if y.len() != a.ncols() {
        return Err(LinearRegressionError::DimensionMismatch {
            rows: a.nrows(),
            columns: a.ncols(),
            observations: y.len(),
        });
    }
    let (a_unique, mapping) = column_unique(a, false);
    Ok((a_unique, averaged(y, &mapping)))
}
