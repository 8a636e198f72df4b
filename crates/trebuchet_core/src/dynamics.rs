//! The linkage as an ODE right-hand side.
//!
//! [`LinkageDynamics`] wraps a [`System`] and exposes it to the integrator.
//! Each evaluation logs the constraint list it started from, so when the
//! integrator comes back to an earlier time (a rejected step) the list is
//! restored to what it was then and transitions triggered by discarded
//! evaluations are undone.

use crate::constraint::{ConstraintSet, Kinematics};
use crate::solver::ForceSolver;
use crate::system::System;
use crate::traits::DynamicalSystem;
use crate::transition::Transition;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Decides when the projectile leaves the sling.
///
/// Called on every derivative evaluation; a `true` while the projectile is
/// still attached releases it.
pub trait Terminate {
    fn evaluate(&mut self, state: &[f64]) -> bool;

    /// The evaluation log was truncated to `len` entries.
    fn truncate(&mut self, _len: usize) {}
}

/// Predicate over the current state vector.
pub struct StatePredicate<F>(pub F);

impl<F: FnMut(&[f64]) -> bool> Terminate for StatePredicate<F> {
    fn evaluate(&mut self, state: &[f64]) -> bool {
        (self.0)(state)
    }
}

/// Predicate over every state evaluated so far, discarded evaluations
/// excluded.
pub struct HistoryPredicate<F> {
    predicate: F,
    history: Vec<Vec<f64>>,
}

impl<F: FnMut(&[Vec<f64>]) -> bool> HistoryPredicate<F> {
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Vec<f64>] {
        &self.history
    }
}

impl<F: FnMut(&[Vec<f64>]) -> bool> Terminate for HistoryPredicate<F> {
    fn evaluate(&mut self, state: &[f64]) -> bool {
        self.history.push(state.to_vec());
        (self.predicate)(&self.history)
    }

    fn truncate(&mut self, len: usize) {
        self.history.truncate(len);
    }
}

/// Never releases.
pub struct Never;

impl Terminate for Never {
    fn evaluate(&mut self, _state: &[f64]) -> bool {
        false
    }
}

/// Per-evaluation record: time, the constraint list the evaluation started
/// from, and the multipliers it solved.
///
/// Times are non-decreasing: an evaluation at an earlier time first pops
/// every later entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationLog {
    pub times: Vec<f64>,
    pub snapshots: Vec<Arc<ConstraintSet>>,
    pub forces: Vec<Vec<f64>>,
}

impl EvaluationLog {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Index of the last entry at or before `t`.
    pub fn index_at(&self, t: f64) -> Option<usize> {
        self.times.partition_point(|&logged| logged <= t).checked_sub(1)
    }

    /// Constraint list in force at `t`; the first snapshot for times before
    /// the log starts.
    pub fn snapshot_at(&self, t: f64) -> Option<&Arc<ConstraintSet>> {
        let index = self.index_at(t).unwrap_or(0);
        self.snapshots.get(index)
    }

    /// Snapshots matching each of `sample_times`, which must be sorted.
    pub fn align(&self, sample_times: &[f64]) -> Vec<Arc<ConstraintSet>> {
        let mut aligned = Vec::with_capacity(sample_times.len());
        if self.is_empty() {
            return aligned;
        }
        let mut cursor = 0;
        for &t in sample_times {
            while cursor + 1 < self.len() && self.times[cursor + 1] <= t {
                cursor += 1;
            }
            aligned.push(self.snapshots[cursor].clone());
        }
        aligned
    }

    fn push(&mut self, t: f64, snapshot: Arc<ConstraintSet>) {
        self.times.push(t);
        self.snapshots.push(snapshot);
    }

    /// Pops every entry logged after `t`, returning the earliest popped
    /// snapshot.
    fn rewind(&mut self, t: f64) -> Option<Arc<ConstraintSet>> {
        let mut restored = None;
        while self.times.last().is_some_and(|&last| t < last) {
            self.times.pop();
            self.forces.truncate(self.times.len());
            restored = self.snapshots.pop();
        }
        restored
    }
}

/// Constrained particle dynamics as a first-order system in
/// `[positions, velocities]`.
pub struct LinkageDynamics<P: Terminate> {
    system: System,
    solver: ForceSolver,
    log: EvaluationLog,
    terminate: P,
    projectile: usize,
    transitions: Vec<Transition>,
    evaluations: usize,
    rewinds: usize,
}

impl<P: Terminate> LinkageDynamics<P> {
    pub fn new(system: System, projectile: usize, terminate: P) -> Self {
        let solver = ForceSolver::new(system.gravity);
        Self {
            system,
            solver,
            log: EvaluationLog::default(),
            terminate,
            projectile,
            transitions: Vec::new(),
            evaluations: 0,
            rewinds: 0,
        }
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn log(&self) -> &EvaluationLog {
        &self.log
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn rewinds(&self) -> usize {
        self.rewinds
    }

    pub fn into_parts(self) -> (System, EvaluationLog, P) {
        (self.system, self.log, self.terminate)
    }

    fn rewind(&mut self, t: f64) {
        if let Some(snapshot) = self.log.rewind(t) {
            self.rewinds += 1;
            trace!(t, retained = self.log.len(), "rewound constraint log");
            self.system.restore(snapshot);
            self.terminate.truncate(self.log.len());
        }
    }

    fn report(&mut self, t: f64) {
        if self.transitions.is_empty() {
            return;
        }
        self.system.invalidate_snapshot();
        for transition in self.transitions.drain(..) {
            debug!(t, ?transition, "constraint transition");
        }
    }
}

impl<P: Terminate> DynamicalSystem<f64> for LinkageDynamics<P> {
    fn dimension(&self) -> usize {
        2 * self.system.masses.len()
    }

    fn apply(&mut self, t: f64, x: &[f64], out: &mut [f64]) {
        self.evaluations += 1;
        self.rewind(t);
        let snapshot = self.system.snapshot();
        self.log.push(t, snapshot);

        self.system.set_state(x);
        let kin = Kinematics::from_state(x);
        self.system
            .constraints
            .advance_geometry(&kin, &mut self.transitions);

        let (velocity_out, acceleration_out) = out.split_at_mut(x.len() / 2);
        velocity_out.copy_from_slice(kin.velocities);
        let forces = self.solver.solve(
            &self.system.constraints,
            &kin,
            &self.system.masses,
            acceleration_out,
        );

        if let Some(released) = self.system.constraints.release_one_way(&forces) {
            self.transitions.push(released);
        }
        self.log.forces.push(forces);

        let wants_release = self.terminate.evaluate(x);
        if wants_release && !self.system.constraints.projectile_released {
            if let Some(released) = self.system.constraints.release_projectile(self.projectile) {
                self.transitions.push(released);
            }
        }

        self.report(t);
    }
}
