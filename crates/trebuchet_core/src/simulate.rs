//! Top-level simulation entry points.

use crate::constraint::ConstraintSet;
use crate::dynamics::{EvaluationLog, HistoryPredicate, LinkageDynamics, StatePredicate, Terminate};
use crate::error::{Error, Result};
use crate::integrator::{Dopri5, IntegrationStatus, IntegratorSettings};
use crate::resample::{resample, sample_times};
use crate::scene::{ConstraintsSpec, Roles, Scene};
use crate::system::{Particle, System};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on the number of output samples a run may request.
pub const MAX_SAMPLES: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Spacing of the output samples.
    pub timestep: f64,
    pub duration: f64,
    /// Acceleration of the external field, y pointing down.
    pub gravity: Vector2<f64>,
    #[serde(default)]
    pub integrator: IntegratorSettings,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            timestep: 1.0,
            duration: 50.0,
            gravity: Vector2::new(0.0, 1.0),
            integrator: IntegratorSettings::default(),
        }
    }
}

impl SimulationSettings {
    pub fn new(timestep: f64, duration: f64) -> Self {
        Self {
            timestep,
            duration,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(Error::InvalidTimestep(self.timestep));
        }
        if !(self.duration.is_finite() && self.duration >= 0.0) {
            return Err(Error::InvalidDuration(self.duration));
        }
        if self.duration / self.timestep > MAX_SAMPLES as f64 {
            return Err(Error::TooManySamples {
                timestep: self.timestep,
                duration: self.duration,
                limit: MAX_SAMPLES,
            });
        }
        Ok(())
    }
}

/// Resampled trajectory plus the unsampled per-evaluation log.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutput {
    /// Sample times `0, timestep, …` below the duration.
    pub times: Vec<f64>,
    /// State `positions ++ velocities` at each sample time.
    pub trajectory: Vec<Vec<f64>>,
    /// One entry per derivative evaluation that survived rewinding.
    pub log: EvaluationLog,
    pub status: IntegrationStatus,
}

impl SimulationOutput {
    /// Constraint list in force at each sample time.
    pub fn sample_snapshots(&self) -> Vec<Arc<ConstraintSet>> {
        self.log.align(&self.times)
    }

    pub fn forces(&self) -> &[Vec<f64>] {
        &self.log.forces
    }
}

/// Runs a linkage from rest, releasing the projectile the first time
/// `terminate` holds for the current state vector.
pub fn simulate<F>(
    particles: &[Particle],
    constraints: &ConstraintsSpec,
    roles: &Roles,
    settings: &SimulationSettings,
    terminate: F,
) -> Result<SimulationOutput>
where
    F: FnMut(&[f64]) -> bool,
{
    run(particles, constraints, roles, settings, StatePredicate(terminate))
}

/// Like [`simulate`], but `terminate` sees every state evaluated so far
/// (evaluations discarded by step rejection excluded), newest last.
pub fn simulate_with_history<F>(
    particles: &[Particle],
    constraints: &ConstraintsSpec,
    roles: &Roles,
    settings: &SimulationSettings,
    terminate: F,
) -> Result<SimulationOutput>
where
    F: FnMut(&[Vec<f64>]) -> bool,
{
    run(
        particles,
        constraints,
        roles,
        settings,
        HistoryPredicate::new(terminate),
    )
}

fn run<P: Terminate>(
    particles: &[Particle],
    constraints: &ConstraintsSpec,
    roles: &Roles,
    settings: &SimulationSettings,
    terminate: P,
) -> Result<SimulationOutput> {
    settings.validate()?;
    roles.validate(particles.len())?;
    let constraints = constraints.compile(particles.len())?;

    let system = System::new(particles, constraints, settings.gravity);
    let initial = system.state();
    let mut dynamics = LinkageDynamics::new(system, roles.projectile, terminate);
    let mut solver = Dopri5::new(initial.len());
    let solution = solver.integrate(
        &mut dynamics,
        0.0,
        settings.duration,
        &initial,
        &settings.integrator,
    );

    if solution.status != IntegrationStatus::Completed {
        warn!(
            status = ?solution.status,
            reached = solution.end_time(),
            duration = settings.duration,
            "integration stopped early"
        );
    }

    let times = sample_times(settings.timestep, settings.duration);
    let trajectory = resample(&solution, &times);
    debug!(
        evaluations = dynamics.evaluations(),
        rewinds = dynamics.rewinds(),
        accepted = solution.steps(),
        rejected = solution.rejected,
        samples = times.len(),
        "simulation finished"
    );

    let (_, log, _) = dynamics.into_parts();
    Ok(SimulationOutput {
        times,
        trajectory,
        log,
        status: solution.status,
    })
}

impl Scene {
    pub fn settings(&self) -> SimulationSettings {
        SimulationSettings::new(self.timestep, self.duration)
    }

    pub fn simulate<F>(&self, terminate: F) -> Result<SimulationOutput>
    where
        F: FnMut(&[f64]) -> bool,
    {
        simulate(
            &self.particles,
            &self.constraints,
            &self.roles,
            &self.settings(),
            terminate,
        )
    }
}
