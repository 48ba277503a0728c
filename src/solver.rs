//! Weighted, constrained hierarchical task solver.
//!
//! Poses one control tick as a damped, weighted least-squares problem:
//! find `dq_full` minimising `sum_i w_i * ||A_i dq_full - b_i||^2` subject
//! to `A_c dq_full = b_c`. Solved by first extracting the base-velocity
//! component via a damped pseudoinverse of the constraint Jacobian, then
//! projecting the remaining soft tasks into its null space and solving the
//! reduced weighted least-squares problem — the same two-stage shape the
//! `ml/policy.rs` uses for a forward pass through fixed-size
//! layers (one matrix op per named task, composed in sequence), adapted
//! here from a feed-forward pipeline to a projected least-squares solve.

use nalgebra::{DMatrix, DVector};

use crate::error::SolverError;

const DAMPING: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Com,
    Foot,
    Posture,
}

struct Task {
    kind: TaskKind,
    a: DMatrix<f64>,
    b: DVector<f64>,
    weight: f64,
}

/// Damped pseudoinverse: `A^T (A A^T + lambda^2 I)^-1`, used both for the
/// constraint projection and (with `weight`-scaled rows) for each soft
/// task's contribution.
fn damped_pinv(a: &DMatrix<f64>, lambda: f64) -> DMatrix<f64> {
    let m = a.nrows();
    let gram = a * a.transpose() + DMatrix::identity(m, m) * (lambda * lambda);
    let gram_inv = gram
        .try_inverse()
        .unwrap_or_else(|| DMatrix::identity(m, m));
    a.transpose() * gram_inv
}

pub struct TaskSolver {
    k: usize,
    m: usize,
    constraint_a: DMatrix<f64>,
    constraint_b: DVector<f64>,
    tasks: Vec<Task>,
}

impl TaskSolver {
    pub fn new(k: usize, m: usize) -> Self {
        Self {
            k,
            m,
            constraint_a: DMatrix::zeros(k, m),
            constraint_b: DVector::zeros(k),
            tasks: Vec::new(),
        }
    }

    /// Resizes the solver to `k` constraint rows and `m = N + 6` columns,
    /// discarding all tasks: active-joint or support-phase changes
    /// re-initialise the solver with the new `(k, m)`.
    pub fn resize(&mut self, k: usize, m: usize) {
        *self = Self::new(k, m);
    }

    pub fn set_constraint(&mut self, a: DMatrix<f64>, b: DVector<f64>) -> Result<(), SolverError> {
        if a.ncols() != self.m || a.nrows() != self.k {
            return Err(SolverError::DimensionMismatch {
                task: "constraint",
                expected: self.m,
                got: a.ncols(),
            });
        }
        self.constraint_a = a;
        self.constraint_b = b;
        Ok(())
    }

    pub fn set_task(&mut self, kind: TaskKind, a: DMatrix<f64>, b: DVector<f64>, weight: f64) -> Result<(), SolverError> {
        if a.ncols() != self.m {
            return Err(SolverError::DimensionMismatch {
                task: task_name(kind),
                expected: self.m,
                got: a.ncols(),
            });
        }
        self.tasks.retain(|t| t.kind != kind);
        self.tasks.push(Task { kind, a, b, weight });
        Ok(())
    }

    /// Returns `dq_full` (size `m`). Deterministic: rank-deficient stacked
    /// Jacobians are handled by the damping term rather than failing.
    pub fn solve(&self) -> DVector<f64> {
        let constraint_pinv = damped_pinv(&self.constraint_a, DAMPING);
        let dq_constrained = &constraint_pinv * &self.constraint_b;

        if self.tasks.is_empty() {
            return dq_constrained;
        }

        let null_basis = null_space_projector(&self.constraint_a, self.m);

        // Stack weighted soft tasks projected into the constraint null
        // space: minimise || sqrt(w_i) (A_i N z - (b_i - A_i dq_constrained)) ||^2.
        let total_rows: usize = self.tasks.iter().map(|t| t.a.nrows()).sum();
        let mut stacked_a = DMatrix::<f64>::zeros(total_rows, null_basis.ncols());
        let mut stacked_b = DVector::<f64>::zeros(total_rows);
        let mut row = 0;
        for t in &self.tasks {
            let rows = t.a.nrows();
            let sw = t.weight.max(0.0).sqrt();
            let a_n = &t.a * &null_basis;
            let residual = &t.b - &t.a * &dq_constrained;
            stacked_a.view_mut((row, 0), (rows, null_basis.ncols())).copy_from(&(a_n * sw));
            stacked_b.rows_mut(row, rows).copy_from(&(residual * sw));
            row += rows;
        }

        let z = weighted_damped_solve(&stacked_a, &stacked_b, DAMPING);

        dq_constrained + &null_basis * z
    }
}

fn task_name(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Com => "com",
        TaskKind::Foot => "foot",
        TaskKind::Posture => "posture",
    }
}

/// An orthonormal basis for the null space of `a` (`m` columns), via the
/// projector `I - A^+ A` reduced to its column space by a thin SVD. Falls
/// back to the identity (no constraint) when `a` has zero rows.
fn null_space_projector(a: &DMatrix<f64>, m: usize) -> DMatrix<f64> {
    if a.nrows() == 0 {
        return DMatrix::identity(m, m);
    }
    let pinv = damped_pinv(a, DAMPING);
    let projector = DMatrix::identity(m, m) - &pinv * a;
    let svd = projector.clone().svd(true, true);
    let u = svd.u.expect("svd u");
    let tolerance = 1e-8;
    let rank = svd.singular_values.iter().filter(|&&s| s > tolerance).count();
    u.columns(0, rank.max(1)).into_owned()
}

fn weighted_damped_solve(a: &DMatrix<f64>, b: &DVector<f64>, lambda: f64) -> DVector<f64> {
    let n = a.ncols();
    let gram = a.transpose() * a + DMatrix::identity(n, n) * (lambda * lambda);
    let rhs = a.transpose() * b;
    gram.try_inverse().map(|inv| inv * &rhs).unwrap_or_else(|| DVector::zeros(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_discards_tasks() {
        let mut solver = TaskSolver::new(6, 12);
        solver
            .set_task(TaskKind::Posture, DMatrix::identity(12, 12), DVector::zeros(12), 1.0)
            .unwrap();
        solver.resize(12, 18);
        assert!(matches!(
            solver.set_task(TaskKind::Posture, DMatrix::identity(12, 12), DVector::zeros(12), 1.0),
            Err(SolverError::DimensionMismatch { expected: 18, got: 12, .. })
        ));
    }

    #[test]
    fn unconstrained_posture_task_tracks_target() {
        let m = 6;
        let mut solver = TaskSolver::new(0, m);
        let target = DVector::from_vec(vec![0.1, 0.2, -0.1, 0.0, 0.3, 0.05]);
        solver
            .set_task(TaskKind::Posture, DMatrix::identity(m, m), target.clone(), 1.0)
            .unwrap();
        let dq = solver.solve();
        for i in 0..m {
            assert!((dq[i] - target[i]).abs() < 1e-3, "row {i}: {} vs {}", dq[i], target[i]);
        }
    }

    #[test]
    fn constraint_is_satisfied_when_consistent() {
        let m = 4;
        let mut solver = TaskSolver::new(2, m);
        let mut a_c = DMatrix::<f64>::zeros(2, m);
        a_c[(0, 0)] = 1.0;
        a_c[(1, 1)] = 1.0;
        let b_c = DVector::from_vec(vec![0.3, -0.2]);
        solver.set_constraint(a_c.clone(), b_c.clone()).unwrap();

        let dq = solver.solve();
        let residual = &a_c * &dq - &b_c;
        assert!(residual.norm() < 1e-3);
    }
}
