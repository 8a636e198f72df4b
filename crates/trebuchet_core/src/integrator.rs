use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorSettings {
    /// Absolute bound on the inf-norm of the embedded error estimate.
    pub tolerance: f64,
    /// Step attempts (accepted or rejected) before giving up.
    pub max_iterations: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 10_000,
        }
    }
}

/// Why integration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Completed,
    IterationLimit,
    StepSizeUnderflow,
    /// The error estimate went NaN; the offending step was kept.
    NonFiniteError,
}

/// Continuous solution produced by [`Dopri5::integrate`].
///
/// Holds every accepted step with its derivative and midpoint so that any
/// time inside the integrated span can be evaluated with the quartic
/// Hermite interpolant of the Dormand–Prince pair.
#[derive(Debug, Clone)]
pub struct DenseSolution<T: Scalar> {
    times: Vec<T>,
    states: Vec<Vec<T>>,
    derivatives: Vec<Vec<T>>,
    midpoints: Vec<Vec<T>>,
    pub iterations: usize,
    pub rejected: usize,
    pub status: IntegrationStatus,
}

impl<T: Scalar> DenseSolution<T> {
    /// Times of the accepted steps, starting with the initial time.
    pub fn times(&self) -> &[T] {
        &self.times
    }

    pub fn states(&self) -> &[Vec<T>] {
        &self.states
    }

    /// Number of accepted steps.
    pub fn steps(&self) -> usize {
        self.times.len().saturating_sub(1)
    }

    pub fn end_time(&self) -> T {
        self.times[self.times.len() - 1]
    }

    /// Evaluates the solution at `t`. Times outside the integrated span are
    /// extrapolated from the nearest step.
    pub fn at(&self, t: T) -> Vec<T> {
        let n = self.times.len();
        if n < 2 {
            return self.states[0].clone();
        }
        let (mut i, mut j) = (0, n - 1);
        while j - i > 1 {
            let k = (i + j) / 2;
            if self.times[k] <= t {
                i = k;
            } else {
                j = k;
            }
        }
        self.interpolate(t, i)
    }

    fn interpolate(&self, xi: T, j: usize) -> Vec<T> {
        let half = T::from_f64(0.5).unwrap();
        let two = T::from_f64(2.0).unwrap();
        let one = T::one();
        let sqr = |v: T| v * v;

        let x0 = self.times[j];
        let x1 = self.times[j + 1];
        let y0 = &self.states[j];
        let y1 = &self.states[j + 1];
        let f0 = &self.derivatives[j];
        let f1 = &self.derivatives[j + 1];
        let yh = &self.midpoints[j];
        let h = x1 - x0;
        let xh = x0 + half * h;

        let c0 = one / (x0 - xh) + two / (x0 - x1);
        let c1 = one / (x1 - xh) + two / (x1 - x0);
        let w = [
            sqr(xi - x1) * (xi - xh) / sqr(x0 - x1) / (x0 - xh),
            sqr(xi - x0) * sqr(xi - x1) / sqr(x0 - xh) / sqr(x1 - xh),
            sqr(xi - x0) * (xi - xh) / sqr(x1 - x0) / (x1 - xh),
            (xi - x0) * sqr(xi - x1) * (xi - xh) / sqr(x0 - x1) / (x0 - xh),
            (xi - x1) * sqr(xi - x0) * (xi - xh) / sqr(x0 - x1) / (x1 - xh),
        ];

        (0..y0.len())
            .map(|i| {
                let p = f0[i] - y0[i] * c0;
                let q = f1[i] - y1[i] * c1;
                y0[i] * w[0] + yh[i] * w[1] + y1[i] * w[2] + p * w[3] + q * w[4]
            })
            .collect()
    }
}

/// Dormand–Prince 5(4) with first-same-as-last stages and dense output.
pub struct Dopri5<T: Scalar> {
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
    y1: Vec<T>,
}

impl<T: Scalar> Dopri5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
            y1: vec![z; dim],
        }
    }

    /// Integrates `system` from `t0` to `t1` starting at `y0`.
    ///
    /// Step control follows the classic scheme: the initial step is a tenth
    /// of the span, a rejected step shrinks by `0.2 (tol/err)^¼`, an accepted
    /// one grows by `0.8 (tol/err)^¼` capped at 4×. The system may be queried
    /// at times earlier than ones it has already seen whenever a step is
    /// rejected.
    pub fn integrate(
        &mut self,
        system: &mut impl DynamicalSystem<T>,
        t0: T,
        t1: T,
        y0: &[T],
        settings: &IntegratorSettings,
    ) -> DenseSolution<T> {
        let f = |v: f64| T::from_f64(v).unwrap();

        let c2 = f(1.0 / 5.0);
        let c3 = f(3.0 / 10.0);
        let c4 = f(4.0 / 5.0);
        let c5 = f(8.0 / 9.0);

        let a21 = f(1.0 / 5.0);

        let a31 = f(3.0 / 40.0);
        let a32 = f(9.0 / 40.0);

        let a41 = f(44.0 / 45.0);
        let a42 = f(-56.0 / 15.0);
        let a43 = f(32.0 / 9.0);

        let a51 = f(19372.0 / 6561.0);
        let a52 = f(-25360.0 / 2187.0);
        let a53 = f(64448.0 / 6561.0);
        let a54 = f(-212.0 / 729.0);

        let a61 = f(9017.0 / 3168.0);
        let a62 = f(-355.0 / 33.0);
        let a63 = f(46732.0 / 5247.0);
        let a64 = f(49.0 / 176.0);
        let a65 = f(-5103.0 / 18656.0);

        // b coefficients (5th order); b2 = 0
        let b1 = f(35.0 / 384.0);
        let b3 = f(500.0 / 1113.0);
        let b4 = f(125.0 / 192.0);
        let b5 = f(-2187.0 / 6784.0);
        let b6 = f(11.0 / 84.0);

        // Error coefficients (5th minus embedded 4th order); e2 = 0
        let e1 = f(-71.0 / 57600.0);
        let e3 = f(71.0 / 16695.0);
        let e4 = f(-71.0 / 1920.0);
        let e5 = f(17253.0 / 339200.0);
        let e6 = f(-22.0 / 525.0);
        let e7 = f(1.0 / 40.0);

        // Midpoint weights for dense output; m2 = 0
        let m1 = f(0.5 * 6025192743.0 / 30085553152.0);
        let m3 = f(0.5 * 51252292925.0 / 65400821598.0);
        let m4 = f(0.5 * -2691868925.0 / 45128329728.0);
        let m5 = f(0.5 * 187940372067.0 / 1594534317056.0);
        let m6 = f(0.5 * -1776094331.0 / 19743644256.0);
        let m7 = f(0.5 * 11237099.0 / 235043384.0);

        let tol = f(settings.tolerance);
        let quarter = f(0.25);
        let shrink = f(0.2);
        let safety = f(0.8);
        let max_growth = f(4.0);

        let dim = y0.len();
        let mut t = t0;
        let mut y = y0.to_vec();
        let mut k1 = vec![T::zero(); dim];
        system.apply(t, &y, &mut k1);

        let mut solution = DenseSolution {
            times: vec![t],
            states: vec![y.clone()],
            derivatives: vec![k1.clone()],
            midpoints: Vec::new(),
            iterations: 0,
            rejected: 0,
            status: IntegrationStatus::Completed,
        };

        let mut h = (t1 - t0) / f(10.0);
        while t < t1 {
            if solution.iterations >= settings.max_iterations {
                solution.status = IntegrationStatus::IterationLimit;
                break;
            }
            solution.iterations += 1;
            if t + h > t1 {
                h = t1 - t;
            }

            // k2
            for i in 0..dim {
                self.tmp[i] = y[i] + h * (a21 * k1[i]);
            }
            system.apply(t + c2 * h, &self.tmp, &mut self.k2);

            // k3
            for i in 0..dim {
                self.tmp[i] = y[i] + h * (a31 * k1[i] + a32 * self.k2[i]);
            }
            system.apply(t + c3 * h, &self.tmp, &mut self.k3);

            // k4
            for i in 0..dim {
                self.tmp[i] = y[i] + h * (a41 * k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
            }
            system.apply(t + c4 * h, &self.tmp, &mut self.k4);

            // k5
            for i in 0..dim {
                self.tmp[i] = y[i]
                    + h * (a51 * k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
            }
            system.apply(t + c5 * h, &self.tmp, &mut self.k5);

            // k6
            for i in 0..dim {
                self.tmp[i] = y[i]
                    + h * (a61 * k1[i]
                        + a62 * self.k2[i]
                        + a63 * self.k3[i]
                        + a64 * self.k4[i]
                        + a65 * self.k5[i]);
            }
            system.apply(t + h, &self.tmp, &mut self.k6);

            // 5th order solution, then k7 = f(t + h, y1) (reused as next k1)
            for i in 0..dim {
                self.y1[i] = y[i]
                    + h * (b1 * k1[i]
                        + b3 * self.k3[i]
                        + b4 * self.k4[i]
                        + b5 * self.k5[i]
                        + b6 * self.k6[i]);
            }
            system.apply(t + h, &self.y1, &mut self.k7);

            let err = norm_inf((0..dim).map(|i| {
                h * (e1 * k1[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * self.k7[i])
            }));

            if err > tol {
                solution.rejected += 1;
                h = shrink * h * (tol / err).powf(quarter);
                if t + h == t {
                    solution.status = IntegrationStatus::StepSizeUnderflow;
                    break;
                }
                continue;
            }

            let midpoint: Vec<T> = (0..dim)
                .map(|i| {
                    y[i] + h * (m1 * k1[i]
                        + m3 * self.k3[i]
                        + m4 * self.k4[i]
                        + m5 * self.k5[i]
                        + m6 * self.k6[i]
                        + m7 * self.k7[i])
                })
                .collect();

            t = t + h;
            y.copy_from_slice(&self.y1);
            k1.copy_from_slice(&self.k7);
            solution.times.push(t);
            solution.states.push(y.clone());
            solution.derivatives.push(k1.clone());
            solution.midpoints.push(midpoint);

            if err.is_nan() {
                solution.status = IntegrationStatus::NonFiniteError;
                break;
            }
            h = (safety * h * (tol / err).powf(quarter)).min(max_growth * h);
        }

        solution
    }
}

/// Max of absolute values; NaN once any entry is NaN.
fn norm_inf<T: Scalar>(values: impl Iterator<Item = T>) -> T {
    values.fold(T::zero(), |acc, v| {
        if acc.is_nan() || v.is_nan() {
            T::nan()
        } else {
            acc.max(v.abs())
        }
    })
}
