//! Post-processing of simulation output into design scores.
//!
//! Nothing in the engine depends on these; they read the trajectory and
//! the force log only.

use crate::scene::{Roles, Scene};
use crate::simulate::SimulationOutput;
use crate::system::Particle;
use nalgebra::Vector2;
use serde::Serialize;

/// Particles right of this x are considered thrown clear and ignored when
/// measuring how low the machine reaches.
const GROUND_SEARCH_LIMIT_X: f64 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub range: f64,
    pub peak_load: f64,
}

/// Throw distance normalized by machine height and scaled to `axleheight`.
///
/// The ballistic range of each sample is `2·vx·max(0, −vy)` (unit gravity,
/// y down). The machine height is the larger of the axle's highest point
/// above the lowest particle and three quarters of the initial tip-to-axle
/// reach.
pub fn range(
    trajectory: &[Vec<f64>],
    particles: &[Particle],
    roles: &Roles,
    axleheight: f64,
) -> f64 {
    let n = particles.len();
    let axle = &particles[roles.mainaxle];
    let mut axle_top = -axle.y;
    let mut lowest = -axle.y;
    let mut best = 0.0f64;

    for state in trajectory {
        for p in 0..n {
            if state[2 * p] < GROUND_SEARCH_LIMIT_X {
                lowest = lowest.min(-state[2 * p + 1]);
            }
        }
        axle_top = axle_top.max(-state[2 * roles.mainaxle + 1]);

        let vx = state[2 * n + 2 * roles.projectile];
        let vy = state[2 * n + 2 * roles.projectile + 1];
        best = best.max(2.0 * (-vy).max(0.0) * vx);
    }

    let tip = &particles[roles.armtip];
    let projectile = &particles[roles.projectile];
    let height = axle_top - lowest;
    let reach = (tip.x - axle.x).hypot(tip.y - projectile.y);
    best / height.max(0.75 * reach) * axleheight
}

/// Largest absolute constraint multiplier over every logged evaluation.
/// `-inf` for an empty log.
pub fn peak_load(forces: &[Vec<f64>]) -> f64 {
    forces
        .iter()
        .flatten()
        .fold(f64::NEG_INFINITY, |peak, f| peak.max(f.abs()))
}

/// Kinetic plus potential energy of `state` in the field `gravity`.
pub fn mechanical_energy(state: &[f64], particles: &[Particle], gravity: Vector2<f64>) -> f64 {
    let n = particles.len();
    particles
        .iter()
        .enumerate()
        .map(|(i, particle)| {
            let position = Vector2::new(state[2 * i], state[2 * i + 1]);
            let velocity = Vector2::new(state[2 * n + 2 * i], state[2 * n + 2 * i + 1]);
            particle.mass * (0.5 * velocity.norm_squared() - gravity.dot(&position))
        })
        .sum()
}

impl Scene {
    pub fn score(&self, output: &SimulationOutput) -> Score {
        Score {
            range: range(
                &output.trajectory,
                &self.particles,
                &self.roles,
                self.axleheight,
            ),
            peak_load: peak_load(&output.log.forces),
        }
    }
}
