use crate::constraint::{ConstraintSet, Kinematics};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A point mass at its starting position. Particles start at rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub mass: f64,
}

impl Particle {
    pub fn new(x: f64, y: f64, mass: f64) -> Self {
        Self { x, y, mass }
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// Particle state, masses and the live constraint list.
///
/// The serialized form of the constraint list is cached so that consecutive
/// evaluations without a transition share one snapshot.
#[derive(Debug, Clone)]
pub struct System {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    /// Doubled per coordinate: `[m0, m0, m1, m1, ...]`.
    pub masses: Vec<f64>,
    pub constraints: ConstraintSet,
    pub gravity: Vector2<f64>,
    snapshot: Option<Arc<ConstraintSet>>,
}

impl System {
    pub fn new(particles: &[Particle], constraints: ConstraintSet, gravity: Vector2<f64>) -> Self {
        let positions = particles.iter().flat_map(|p| [p.x, p.y]).collect();
        let masses = particles.iter().flat_map(|p| [p.mass, p.mass]).collect();
        Self {
            positions,
            velocities: vec![0.0; 2 * particles.len()],
            masses,
            constraints,
            gravity,
            snapshot: None,
        }
    }

    pub fn particle_count(&self) -> usize {
        self.masses.len() / 2
    }

    /// Flattened `positions ++ velocities`.
    pub fn state(&self) -> Vec<f64> {
        let mut state = Vec::with_capacity(2 * self.positions.len());
        state.extend_from_slice(&self.positions);
        state.extend_from_slice(&self.velocities);
        state
    }

    pub fn set_state(&mut self, state: &[f64]) {
        let (positions, velocities) = state.split_at(state.len() / 2);
        self.positions.copy_from_slice(positions);
        self.velocities.copy_from_slice(velocities);
    }

    pub fn kinematics(&self) -> Kinematics<'_> {
        Kinematics::new(&self.positions, &self.velocities)
    }

    /// Snapshot of the current constraint list, reused until invalidated.
    pub fn snapshot(&mut self) -> Arc<ConstraintSet> {
        let constraints = &self.constraints;
        self.snapshot
            .get_or_insert_with(|| Arc::new(constraints.clone()))
            .clone()
    }

    /// Must be called after any change to the constraint list.
    pub fn invalidate_snapshot(&mut self) {
        self.snapshot = None;
    }

    /// Replaces the constraint list with an earlier snapshot.
    pub fn restore(&mut self, snapshot: Arc<ConstraintSet>) {
        self.constraints = (*snapshot).clone();
        self.snapshot = Some(snapshot);
    }
}
