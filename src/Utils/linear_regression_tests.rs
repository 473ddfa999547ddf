#[cfg(test)]
mod tests {
    use crate::Utils::linear_regression::*;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};
    use std::collections::BTreeMap;

    fn assert_small(m: &DMatrix<f64>, tol: f64) {
        for v in m.iter() {
            assert!(v.abs() < tol, "entry {} is not close to zero", v);
        }
    }

    #[test]
    fn test_least_squares_exactly_determined() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let y = DVector::from_vec(vec![10.0, 20.0, 30.5]);
        let res = least_squares(&a, &y, true, DEFAULT_EPS).unwrap();
        assert_eq!(res.rank, 3);
        assert_eq!(res.nullspace.nrows(), 0);
        assert_relative_eq!(res.coefficients[0], 10.5, epsilon = 1e-8);
        assert_relative_eq!(res.coefficients[1], 20.5, epsilon = 1e-8);
        assert_relative_eq!(res.coefficients[2], -0.5, epsilon = 1e-8);
        let fitted = &a * &res.coefficients;
        for i in 0..3 {
            assert_relative_eq!(fitted[i], y[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_least_squares_rank_deficient_kernel() {
        // the third column is the sum of the first two
        let a = DMatrix::from_row_slice(
            4,
            3,
            &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 1.0, 3.0],
        );
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let res = least_squares(&a, &y, false, DEFAULT_EPS).unwrap();
        assert_eq!(res.rank, 2);
        assert_eq!(res.nullspace.nrows(), 1);
        assert_small(&(&a * res.nullspace.transpose()), 1e-9);
        assert_relative_eq!(res.nullspace.row(0).norm(), 1.0, epsilon = 1e-9);
        // the minimum-norm solution is orthogonal to the kernel
        assert_relative_eq!(
            res.nullspace.row(0).dot(&res.coefficients.transpose()),
            0.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_least_squares_zero_columns_enter_kernel() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 0.0, 2.0]);
        let y = DVector::from_vec(vec![3.0, 4.0]);
        let res = least_squares(&a, &y, true, DEFAULT_EPS).unwrap();
        assert_relative_eq!(res.coefficients[0], 3.0, epsilon = 1e-10);
        assert_relative_eq!(res.coefficients[1], 0.0, epsilon = 1e-10);
        assert_relative_eq!(res.coefficients[2], 2.0, epsilon = 1e-10);
        assert_eq!(res.nullspace.nrows(), 1);
        assert_relative_eq!(res.nullspace[(0, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(res.nullspace[(0, 0)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_least_squares_dual_system() {
        // y has the length of the columns: A^T x = y is solved
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let res = least_squares(&a, &y, false, DEFAULT_EPS).unwrap();
        assert_eq!(res.coefficients.len(), 2);
        let fitted = a.transpose() * &res.coefficients;
        for i in 0..3 {
            assert_relative_eq!(fitted[i], y[i], epsilon = 1e-8);
        }
        assert_eq!(res.nullspace.nrows(), 0);
    }

    #[test]
    fn test_least_squares_dimension_mismatch() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            least_squares(&a, &y, false, DEFAULT_EPS),
            Err(LinearRegressionError::DimensionMismatch {
                rows: 2,
                columns: 3,
                observations: 4
            })
        );
        let empty = DMatrix::<f64>::zeros(0, 0);
        assert_eq!(
            least_squares(&empty, &DVector::zeros(0), false, DEFAULT_EPS),
            Err(LinearRegressionError::EmptyInput)
        );
    }

    #[test]
    fn test_reduced_row_echelon_form() {
        let mut a = DMatrix::from_row_slice(
            3,
            4,
            &[1.0, 2.0, -1.0, -4.0, 2.0, 3.0, -1.0, -11.0, -2.0, 0.0, -3.0, 22.0],
        );
        let (leads, non_leads) = to_reduced_row_echelon_form(&mut a, DEFAULT_EPS, true);
        assert_eq!(leads, vec![0, 1, 2]);
        assert_eq!(non_leads, vec![3]);
        let expected = [[1.0, 0.0, 0.0, -8.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0, 1.0, -2.0]];
        for (i, row) in expected.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                assert_relative_eq!(a[(i, j)], *v, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_reduced_row_echelon_pivot_structure() {
        let mut a = DMatrix::from_row_slice(
            3,
            4,
            &[0.0, 2.0, 4.0, 2.0, 0.0, 1.0, 2.0, 1.0, 1.0, 0.0, 1.0, 0.0],
        );
        let (leads, non_leads) = to_reduced_row_echelon_form(&mut a, DEFAULT_EPS, true);
        assert!(leads.windows(2).all(|w| w[0] < w[1]));
        for (row, col) in leads.iter().enumerate() {
            for i in 0..a.nrows() {
                let expected = if i == row { 1.0 } else { 0.0 };
                assert_relative_eq!(a[(i, *col)], expected, epsilon = 1e-10);
            }
        }
        assert_eq!(leads.len() + non_leads.len(), 4);
        assert_relative_eq!(a.row(2).norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_least_squares_with_fixed_points() {
        let s = DMatrix::from_row_slice(
            4,
            8,
            &[
                0.0, 0.0, 1.0, 0.0, -1.0, 1.0, 0.0, 0.0, //
                0.0, -1.0, 0.0, -1.0, 1.0, 0.0, 0.0, 0.0, //
                -2.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 1.0,
            ],
        );
        let b = DVector::from_vec(vec![10.0, 20.0, 30.0, 15.0]);
        let fixed = BTreeMap::from([(0, 5.0), (1, -99.0), (2, 1001.0), (6, 0.0)]);
        let (x, k) = least_squares_with_fixed_points(&s, &b, &fixed, DEFAULT_EPS).unwrap();
        for (i, v) in &fixed {
            assert_relative_eq!(x[*i], *v, epsilon = 1e-6);
        }
        let fitted = &s * &x;
        for i in 0..4 {
            assert_relative_eq!(fitted[i], b[i], epsilon = 1e-6);
        }
        assert_small(&(&s * k.transpose()), 1e-9);
    }

    #[test]
    fn test_fixed_points_fail_without_free_dimensions() {
        let a = DMatrix::<f64>::identity(3, 3);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let fixed = BTreeMap::from([(0, 5.0)]);
        assert!(matches!(
            least_squares_with_fixed_points(&a, &y, &fixed, DEFAULT_EPS),
            Err(LinearRegressionError::SingularConstraints { requested: 1, .. })
        ));
    }

    #[test]
    fn test_solve_linear_system_and_kernel() {
        let a = DMatrix::from_row_slice(3, 4, &[1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
        let w = DVector::from_vec(vec![1.0, 2.0, 0.5, -1.0]);
        let b = &a * &w;
        let (x, k) = solve_linear_system(&a, &b, DEFAULT_EPS).unwrap();
        let fitted = &a * &x;
        for i in 0..3 {
            assert_relative_eq!(fitted[i], b[i], epsilon = 1e-8);
        }
        assert_eq!(k.nrows(), 2);
        assert_small(&(&a * k.transpose()), 1e-9);

        let k2 = find_kernel(&a, DEFAULT_EPS).unwrap();
        assert_eq!(k2.nrows(), 2);
        assert_small(&(&a * k2.transpose()), 1e-9);
    }

    #[test]
    fn test_kernel_and_rank() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 6.0]);
        assert_eq!(matrix_rank(&a, DEFAULT_EPS), 1);
        let k = kernel(&a, false, DEFAULT_EPS).unwrap();
        assert_eq!(k.nrows(), 2);
        assert_small(&(&a * k.transpose()), 1e-9);
        let k_rref = kernel(&a, true, DEFAULT_EPS).unwrap();
        assert_small(&(&a * k_rref.transpose()), 1e-9);
    }

    #[test]
    fn test_projections_sum_to_identity() {
        let a = DMatrix::from_row_slice(
            6,
            3,
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        );
        let (p_r, p_n) = row_projection(&a, DEFAULT_EPS).unwrap();
        let sum = &p_r + &p_n;
        assert_small(&(sum - DMatrix::<f64>::identity(3, 3)), 1e-10);
        assert_eq!(matrix_rank(&p_r, 1e-8), 2);
        assert_eq!(matrix_rank(&p_n, 1e-8), 1);

        let (p_c, p_l) = column_projection(&a, DEFAULT_EPS).unwrap();
        assert_eq!(p_c.shape(), (6, 6));
        assert_small(&(&p_c + &p_l - DMatrix::<f64>::identity(6, 6)), 1e-10);
        // projector is idempotent
        assert_small(&(&p_c * &p_c - &p_c), 1e-10);
    }

    #[test]
    fn test_row_unique_regression() {
        let a = DMatrix::from_row_slice(
            6,
            3,
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        );
        let (unique, mapping) = row_unique(&a, true);
        assert_eq!(unique.nrows(), 2);
        assert_eq!(mapping, vec![vec![1, 4, 5], vec![0, 3]]);

        let y = DVector::from_vec(vec![1.0, 2.0, 1.0, 3.0, 4.0, 1.0]);
        let (a_u, y_u) = row_unique_regression(&a, &y).unwrap();
        assert_eq!(a_u.nrows(), 3);
        // rows sorted: zero row, [0,1,0], [1,0,0]
        assert_relative_eq!(y_u[0], 1.0);
        assert_relative_eq!(y_u[1], 7.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(y_u[2], 2.0);

        let (a_c, y_c) = column_unique_regression(&a.transpose(), &y).unwrap();
        assert_eq!(a_c.ncols(), 3);
        assert_relative_eq!(y_c[2], 2.0);
        assert!(row_unique_regression(&a, &DVector::zeros(2)).is_err());
    }
}
