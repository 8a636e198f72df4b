//! Sparse constraint rows and the dense solve behind the force solver.
//!
//! A constraint only touches the 2–6 coordinates of the particles it links,
//! so each Jacobian row is stored as a short list of `(particle, value)`
//! pairs sorted by particle index. Coordinates not present in the list are
//! zero, and every operation here relies on that: untouched coordinates
//! contribute nothing to dot products or to the effective mass matrix.

use nalgebra::{DMatrix, DVector, Vector2};

/// One row of the constraint Jacobian, keyed by particle index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseRow {
    entries: Vec<(usize, Vector2<f64>)>,
}

impl SparseRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every entry. Keeps the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of particles the row touches.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Overwrites the 2D value for `particle`.
    pub fn set(&mut self, particle: usize, value: Vector2<f64>) {
        match self.search(particle) {
            Ok(pos) => self.entries[pos].1 = value,
            Err(pos) => self.entries.insert(pos, (particle, value)),
        }
    }

    /// Adds `value` to whatever is stored for `particle` (zero if untouched).
    pub fn add(&mut self, particle: usize, value: Vector2<f64>) {
        match self.search(particle) {
            Ok(pos) => self.entries[pos].1 += value,
            Err(pos) => self.entries.insert(pos, (particle, value)),
        }
    }

    /// Value for `particle`; zero when the row does not touch it.
    pub fn get(&self, particle: usize) -> Vector2<f64> {
        self.search(particle)
            .map(|pos| self.entries[pos].1)
            .unwrap_or_else(|_| Vector2::zeros())
    }

    pub fn entries(&self) -> &[(usize, Vector2<f64>)] {
        &self.entries
    }

    /// Dot product with a dense, flattened `[x0, y0, x1, y1, ...]` vector.
    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.entries
            .iter()
            .map(|(p, v)| v.x * dense[2 * p] + v.y * dense[2 * p + 1])
            .sum()
    }

    /// `Σ_k a_k b_k / m_k` over the coordinates both rows touch.
    pub fn mass_weighted_dot(&self, other: &SparseRow, masses: &[f64]) -> f64 {
        let mut acc = 0.0;
        let (mut i, mut j) = (0, 0);
        while i < self.entries.len() && j < other.entries.len() {
            let (pa, va) = &self.entries[i];
            let (pb, vb) = &other.entries[j];
            if pa < pb {
                i += 1;
            } else if pb < pa {
                j += 1;
            } else {
                acc += va.x / masses[2 * pa] * vb.x;
                acc += va.y / masses[2 * pa + 1] * vb.y;
                i += 1;
                j += 1;
            }
        }
        acc
    }

    fn search(&self, particle: usize) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&particle, |(p, _)| *p)
    }
}

/// Builds `J M⁻¹ Jᵀ` from the constraint rows and the doubled mass vector.
///
/// A zero diagonal (a row that vanished, typically a released constraint)
/// is replaced with 1 so its multiplier decouples and the system stays
/// solvable.
pub fn effective_mass_matrix(rows: &[SparseRow], masses: &[f64]) -> DMatrix<f64> {
    let n = rows.len();
    let mut matrix = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            matrix[(i, j)] = rows[i].mass_weighted_dot(&rows[j], masses);
        }
    }
    regularize_diagonal(&mut matrix);
    matrix
}

/// Substitutes 1 for every exactly-zero diagonal entry.
pub fn regularize_diagonal(matrix: &mut DMatrix<f64>) {
    for i in 0..matrix.nrows().min(matrix.ncols()) {
        if matrix[(i, i)] == 0.0 {
            matrix[(i, i)] = 1.0;
        }
    }
}

/// Solves `A x = b` by Gaussian elimination with partial pivoting.
///
/// Never fails: a zero pivot divides through and yields NaN/Infinity in the
/// affected entries, which the caller propagates.
pub fn gaussian_solve(mut a: DMatrix<f64>, mut b: DVector<f64>) -> DVector<f64> {
    let n = a.nrows();
    for i in 0..n {
        let mut max_el = a[(i, i)].abs();
        let mut max_row = i;
        for k in (i + 1)..n {
            if a[(k, i)].abs() > max_el {
                max_el = a[(k, i)].abs();
                max_row = k;
            }
        }
        if max_row != i {
            a.swap_rows(i, max_row);
            b.swap_rows(i, max_row);
        }

        for k in (i + 1)..n {
            let c = -a[(k, i)] / a[(i, i)];
            a[(k, i)] = 0.0;
            for j in (i + 1)..n {
                a[(k, j)] += c * a[(i, j)];
            }
            b[k] += c * b[i];
        }
    }

    let mut x = DVector::zeros(n);
    for i in (0..n).rev() {
        x[i] = b[i] / a[(i, i)];
        for k in 0..i {
            b[k] -= a[(k, i)] * x[i];
        }
    }
    x
}

/// Accumulates `Jᵀ λ` into a dense `2N` vector (overwriting `out`).
pub fn transpose_product(rows: &[SparseRow], lambda: &DVector<f64>, out: &mut [f64]) {
    out.iter_mut().for_each(|v| *v = 0.0);
    for (row, &l) in rows.iter().zip(lambda.iter()) {
        for (p, v) in row.entries() {
            out[2 * p] += l * v.x;
            out[2 * p + 1] += l * v.y;
        }
    }
}
