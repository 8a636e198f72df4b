pub mod constraint;
pub mod dynamics;
pub mod error;
pub mod integrator;
pub mod linalg;
pub mod resample;
pub mod scene;
pub mod scoring;
pub mod simulate;
pub mod solver;
pub mod system;
/// The `trebuchet_core` crate is the constrained multi-body engine behind the
/// trebuchet designer. Particles under gravity are tied together by rods,
/// sliders, track joints and ropes; constraint forces are solved as Lagrange
/// multipliers at every derivative evaluation.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (ODE right-hand sides).
/// - **Constraints**: `Constraint` variants with their Jacobian rows, and the irreversible transitions between their states.
/// - **Solver**: `ForceSolver`, the sparse-row assembly and dense solve for the multipliers.
/// - **Integrator**: `Dopri5`, adaptive Dormand–Prince 5(4) with dense output.
/// - **Dynamics**: `LinkageDynamics`, which logs and rewinds the constraint list as the integrator revisits earlier times.
/// - **Simulate**: `simulate` / `simulate_with_history`, plus scene loading and scoring.
pub mod traits;
pub mod transition;

pub use error::{Error, Result};
pub use scene::{ConstraintsSpec, Roles, Scene};
pub use simulate::{simulate, simulate_with_history, SimulationOutput, SimulationSettings};
pub use system::Particle;
