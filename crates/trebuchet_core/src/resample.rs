use crate::integrator::DenseSolution;

/// `0, timestep, 2·timestep, …` strictly below `duration`, accumulated by
/// repeated addition. Stops early if an addition no longer advances `t`.
pub fn sample_times(timestep: f64, duration: f64) -> Vec<f64> {
    let mut times = Vec::new();
    let mut t = 0.0;
    while t < duration {
        times.push(t);
        let next = t + timestep;
        if next <= t {
            break;
        }
        t = next;
    }
    times
}

/// Evaluates the dense solution at each of `times`.
pub fn resample(solution: &DenseSolution<f64>, times: &[f64]) -> Vec<Vec<f64>> {
    times.iter().map(|&t| solution.at(t)).collect()
}
