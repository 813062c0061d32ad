use crate::math::StatsHelper;
use crate::prelude::{expect_len, ProcessingStage, StageError, StageResult};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

/// Initial width guess in channels.
const INITIAL_SIGMA: f64 = 100.0;
const MAX_ITERATIONS: usize = 200;
const MAX_DAMPING: f64 = 1e12;
const TOLERANCE: f64 = 1e-10;

/// Centre (channel index) and variance of the fitted H I line.
///
/// Both are zero when the fit failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LineProfile {
    pub x0: f32,
    pub sigma2: f32,
}

/// Least-squares fit of `a * exp(-(x - x0)^2 / (2 sigma^2))` to a spectrum,
/// solved with Levenberg-Marquardt over the channel index axis.
pub struct LineFitter {
    vec_len: usize,
    logger: LogManager,
}

impl LineFitter {
    pub fn new(vec_len: usize) -> StageResult<Self> {
        if vec_len == 0 {
            return Err(StageError::Config("vector length must be positive".into()));
        }
        Ok(Self {
            vec_len,
            logger: LogManager::new("spectrocore::line_fit"),
        })
    }

    /// Fits the spectrum starting from `[max, vec_len / 2, 100]`.
    pub fn fit(&self, spectrum: &[f32]) -> StageResult<LineProfile> {
        expect_len("line fit", self.vec_len, spectrum.len())?;
        let y: Vec<f64> = spectrum.iter().map(|&v| f64::from(v)).collect();
        let peak = StatsHelper::argmax(&y).map_or(0.0, |idx| y[idx]);
        let guess = [peak, self.vec_len as f64 / 2.0, INITIAL_SIGMA];

        match levenberg_marquardt(&y, guess) {
            Some([_, x0, sigma]) => {
                let profile = LineProfile {
                    x0: x0 as f32,
                    sigma2: (sigma * sigma) as f32,
                };
                self.logger.detail(&format!(
                    "line fit x0 {:.2} sigma2 {:.2}",
                    profile.x0, profile.sigma2
                ));
                Ok(profile)
            }
            None => {
                self.logger.detail("line fit did not converge");
                Ok(LineProfile::default())
            }
        }
    }
}

impl ProcessingStage for LineFitter {
    type Input = [f32];
    type Output = LineProfile;

    fn execute(&mut self, input: &[f32]) -> StageResult<LineProfile> {
        self.fit(input)
    }

    fn cleanup(&mut self) {}
}

fn gaussian(x: f64, [a, x0, sigma]: [f64; 3]) -> f64 {
    let d = x - x0;
    a * (-d * d / (2.0 * sigma * sigma)).exp()
}

fn cost(y: &[f64], params: [f64; 3]) -> f64 {
    y.iter()
        .enumerate()
        .map(|(i, &yi)| {
            let r = yi - gaussian(i as f64, params);
            r * r
        })
        .sum()
}

/// Normal equations `J^T J` and `J^T r` at `params`.
fn normal_equations(y: &[f64], params: [f64; 3]) -> ([[f64; 3]; 3], [f64; 3]) {
    let [a, x0, sigma] = params;
    let s2 = sigma * sigma;
    let mut jtj = [[0.0; 3]; 3];
    let mut jtr = [0.0; 3];

    for (i, &yi) in y.iter().enumerate() {
        let d = i as f64 - x0;
        let e = (-d * d / (2.0 * s2)).exp();
        let g = a * e;
        let jac = [e, g * d / s2, g * d * d / (s2 * sigma)];
        let r = yi - g;
        for row in 0..3 {
            jtr[row] += jac[row] * r;
            for col in 0..3 {
                jtj[row][col] += jac[row] * jac[col];
            }
        }
    }
    (jtj, jtr)
}

fn solve3(m: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let det = |m: &[[f64; 3]; 3]| {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let d = det(&m);
    if !d.is_normal() {
        return None;
    }
    let mut out = [0.0; 3];
    for (col, slot) in out.iter_mut().enumerate() {
        let mut replaced = m;
        for row in 0..3 {
            replaced[row][col] = b[row];
        }
        *slot = det(&replaced) / d;
    }
    Some(out)
}

fn levenberg_marquardt(y: &[f64], mut params: [f64; 3]) -> Option<[f64; 3]> {
    let mut current = cost(y, params);
    let mut damping = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        let (jtj, jtr) = normal_equations(y, params);
        if jtj[0][0] == 0.0 || jtj[1][1] == 0.0 || jtj[2][2] == 0.0 {
            return None;
        }

        loop {
            let mut damped = jtj;
            for k in 0..3 {
                damped[k][k] += damping * jtj[k][k];
            }
            let step = solve3(damped, jtr)?;
            let scale = params.iter().map(|p| p.abs()).fold(0.0, f64::max);
            if step.iter().all(|s| s.abs() <= TOLERANCE * (scale + TOLERANCE)) {
                return accept(params);
            }

            let candidate = [params[0] + step[0], params[1] + step[1], params[2] + step[2]];
            let next = cost(y, candidate);
            if next.is_finite() && next <= current {
                let converged = current - next <= TOLERANCE * current;
                params = candidate;
                current = next;
                damping = (damping / 10.0).max(1e-12);
                if converged {
                    return accept(params);
                }
                break;
            }

            damping *= 10.0;
            if damping > MAX_DAMPING {
                return None;
            }
        }
    }
    None
}

fn accept(params: [f64; 3]) -> Option<[f64; 3]> {
    let finite = params.iter().all(|p| p.is_finite());
    (finite && params[2] != 0.0).then_some(params)
}
