//! Constraint forces for one state.
//!
//! Given positions and velocities, finds multipliers λ so that the
//! resulting accelerations `a = M⁻¹Jᵀλ + g` satisfy `J a = desired` for
//! every constraint row, then returns both λ and `a`.

use crate::constraint::{ConstraintModel, ConstraintSet, Kinematics};
use crate::linalg::{effective_mass_matrix, gaussian_solve, transpose_product, SparseRow};
use nalgebra::{DVector, Vector2};

/// Reusable scratch for the per-evaluation solve.
#[derive(Debug, Clone)]
pub struct ForceSolver {
    gravity: Vector2<f64>,
    rows: Vec<SparseRow>,
}

impl ForceSolver {
    pub fn new(gravity: Vector2<f64>) -> Self {
        Self {
            gravity,
            rows: Vec::new(),
        }
    }

    pub fn gravity(&self) -> Vector2<f64> {
        self.gravity
    }

    /// Solves for the constraint multipliers and writes the resulting
    /// accelerations (flattened, length `2N`) into `acceleration`.
    ///
    /// `masses` is the doubled mass vector `[m0, m0, m1, m1, ...]`. The
    /// returned vector has one entry per constraint in list order; a
    /// released constraint's entry equals its desired acceleration since
    /// its row is empty and its diagonal is regularized to 1.
    pub fn solve(
        &mut self,
        constraints: &ConstraintSet,
        kin: &Kinematics,
        masses: &[f64],
        acceleration: &mut [f64],
    ) -> Vec<f64> {
        let n = constraints.len();
        self.rows.resize_with(n, SparseRow::new);

        let mut desired = DVector::zeros(n);
        for (i, constraint) in constraints.iter().enumerate() {
            self.rows[i].clear();
            constraint.effect(kin, &mut self.rows[i]);
            desired[i] = constraint.desired_acceleration(kin, self.gravity);
        }

        let lambda = if n == 0 {
            DVector::zeros(0)
        } else {
            let matrix = effective_mass_matrix(&self.rows[..n], masses);
            gaussian_solve(matrix, desired)
        };

        transpose_product(&self.rows[..n], &lambda, acceleration);
        for (k, a) in acceleration.iter_mut().enumerate() {
            *a = *a / masses[k] + self.gravity[k % 2];
        }

        lambda.iter().copied().collect()
    }
}
