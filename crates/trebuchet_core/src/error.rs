use thiserror::Error;

/// Structural errors rejected before a simulation starts.
///
/// The physics path itself never fails: degenerate geometry and singular
/// constraint systems propagate as NaN/Infinity instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("timestep must be positive and finite, got {0}")]
    InvalidTimestep(f64),

    #[error("duration must be non-negative and finite, got {0}")]
    InvalidDuration(f64),

    #[error("timestep {timestep} over duration {duration} would produce more than {limit} samples")]
    TooManySamples {
        timestep: f64,
        duration: f64,
        limit: usize,
    },

    #[error("{kind} constraint #{index} references particle {particle}, but only {count} particles exist")]
    ParticleOutOfRange {
        kind: &'static str,
        index: usize,
        particle: usize,
        count: usize,
    },

    #[error("{role} index {index} is out of range for {count} particles")]
    RoleOutOfRange {
        role: &'static str,
        index: usize,
        count: usize,
    },

    #[error("scene JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
