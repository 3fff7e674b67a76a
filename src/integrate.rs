//! Adaptive explicit Runge-Kutta 4(5) integration
//!
//! Dormand-Prince pair with local extrapolation, embedded error control,
//! a hard cap on the internal step and a quartic continuous extension used
//! to report the solution on a caller-supplied sample grid.
//!
//! The right-hand side is fallible and may carry state (the beat
//! scheduler), so it is taken as `FnMut` returning `Result`.

use crate::SimError;

const STAGES: usize = 6;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;
const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

const C: [f64; STAGES] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0];

const A: [[f64; 5]; STAGES] = [
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
    ],
];

const B: [f64; STAGES] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
];

const E: [f64; STAGES + 1] = [
    -71.0 / 57600.0,
    0.0,
    71.0 / 16695.0,
    -71.0 / 1920.0,
    17253.0 / 339200.0,
    -22.0 / 525.0,
    1.0 / 40.0,
];

// Continuous extension: y(t + x h) = y + h * sum_j K_j * (P_j . [x, x^2, x^3, x^4])
const P: [[f64; 4]; STAGES + 1] = [
    [
        1.0,
        -8048581381.0 / 2820520608.0,
        8663915743.0 / 2820520608.0,
        -12715105075.0 / 11282082432.0,
    ],
    [0.0, 0.0, 0.0, 0.0],
    [
        0.0,
        131558114200.0 / 32700410799.0,
        -68118460800.0 / 10900136933.0,
        87487479700.0 / 32700410799.0,
    ],
    [
        0.0,
        -1754552775.0 / 470086768.0,
        14199869525.0 / 1410260304.0,
        -10690763975.0 / 1880347072.0,
    ],
    [
        0.0,
        127303824393.0 / 49829197408.0,
        -318862633887.0 / 49829197408.0,
        701980252875.0 / 199316789632.0,
    ],
    [
        0.0,
        -282668133.0 / 205662961.0,
        2019193451.0 / 616988883.0,
        -1453857185.0 / 822651844.0,
    ],
    [
        0.0,
        40617522.0 / 29380423.0,
        -110615467.0 / 29380423.0,
        69997945.0 / 29380423.0,
    ],
];

/// Step-control settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rk45Options {
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
    /// Largest internal step the solver may take
    pub max_step: f64,
}

impl Default for Rk45Options {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            max_step: f64::INFINITY,
        }
    }
}

/// Solution sampled on the requested grid
#[derive(Debug, Clone, Default)]
pub struct Trajectory<const N: usize> {
    pub t: Vec<f64>,
    pub y: Vec<[f64; N]>,
    pub accepted_steps: usize,
    pub rejected_steps: usize,
}

impl<const N: usize> Trajectory<N> {
    /// One state component across all samples
    pub fn component(&self, index: usize) -> Vec<f64> {
        self.y.iter().map(|y| y[index]).collect()
    }
}

/// Integrate `dy/dt = rhs(t, y)` from `t_eval[0]` to the last grid point.
///
/// `t_eval` must be non-decreasing; the first entry is the initial time.
pub fn integrate<const N: usize, F>(
    mut rhs: F,
    y0: [f64; N],
    t_eval: &[f64],
    opts: &Rk45Options,
) -> Result<Trajectory<N>, SimError>
where
    F: FnMut(f64, &[f64; N]) -> Result<[f64; N], SimError>,
{
    validate_options(opts)?;

    let mut out = Trajectory {
        t: Vec::with_capacity(t_eval.len()),
        y: Vec::with_capacity(t_eval.len()),
        accepted_steps: 0,
        rejected_steps: 0,
    };

    let (t0, t_bound) = match (t_eval.first(), t_eval.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Ok(out),
    };
    if t_eval.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(SimError::InvalidConfig(
            "sample grid must be non-decreasing".to_string(),
        ));
    }

    out.t.push(t0);
    out.y.push(y0);
    let mut next = 1;
    while next < t_eval.len() && t_eval[next] <= t0 {
        out.t.push(t_eval[next]);
        out.y.push(y0);
        next += 1;
    }
    if t_bound <= t0 {
        return Ok(out);
    }

    let mut t = t0;
    let mut y = y0;
    let mut f = rhs(t, &y)?;
    let mut h_abs = initial_step(&mut rhs, t0, &y0, &f, opts)?.min(opts.max_step);

    while t < t_bound {
        let min_step = 10.0 * spacing(t);
        if h_abs > opts.max_step {
            h_abs = opts.max_step;
        } else if h_abs < min_step {
            h_abs = min_step;
        }

        let mut rejected = false;
        let (t_new, y_new, k) = loop {
            if h_abs < min_step {
                return Err(SimError::StepSizeUnderflow { t, h: h_abs });
            }

            let t_new = (t + h_abs).min(t_bound);
            let h = t_new - t;
            h_abs = h;

            let (y_new, k) = rk_step(&mut rhs, t, &y, &f, h)?;
            let err = error_norm(&k, &y, &y_new, h, opts);

            if err < 1.0 {
                let mut factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    MAX_FACTOR.min(SAFETY * err.powf(ERROR_EXPONENT))
                };
                if rejected {
                    factor = factor.min(1.0);
                }
                h_abs *= factor;
                out.accepted_steps += 1;
                break (t_new, y_new, k);
            }

            h_abs *= MIN_FACTOR.max(SAFETY * err.powf(ERROR_EXPONENT));
            rejected = true;
            out.rejected_steps += 1;
        };

        let h = t_new - t;
        while next < t_eval.len() && t_eval[next] <= t_new {
            let te = t_eval[next];
            let ye = if te == t_new {
                y_new
            } else {
                dense_output(&k, &y, h, (te - t) / h)
            };
            out.t.push(te);
            out.y.push(ye);
            next += 1;
        }

        t = t_new;
        y = y_new;
        f = k[STAGES];
    }

    Ok(out)
}

fn validate_options(opts: &Rk45Options) -> Result<(), SimError> {
    if !(opts.rtol > 0.0 && opts.rtol.is_finite()) {
        return Err(SimError::InvalidConfig("rtol must be finite and > 0".to_string()));
    }
    if !(opts.atol > 0.0 && opts.atol.is_finite()) {
        return Err(SimError::InvalidConfig("atol must be finite and > 0".to_string()));
    }
    if !(opts.max_step > 0.0) {
        return Err(SimError::InvalidConfig("max_step must be > 0".to_string()));
    }
    Ok(())
}

/// Distance from `t` to the next representable float, floored at the
/// smallest normal value.
fn spacing(t: f64) -> f64 {
    (t.abs() * f64::EPSILON).max(f64::MIN_POSITIVE)
}

fn rms<const N: usize>(v: &[f64; N]) -> f64 {
    (v.iter().map(|x| x * x).sum::<f64>() / N as f64).sqrt()
}

fn scaled<const N: usize>(v: &[f64; N], y: &[f64; N], opts: &Rk45Options) -> [f64; N] {
    let mut out = [0.0; N];
    for i in 0..N {
        out[i] = v[i] / (opts.atol + y[i].abs() * opts.rtol);
    }
    out
}

fn initial_step<const N: usize, F>(
    rhs: &mut F,
    t0: f64,
    y0: &[f64; N],
    f0: &[f64; N],
    opts: &Rk45Options,
) -> Result<f64, SimError>
where
    F: FnMut(f64, &[f64; N]) -> Result<[f64; N], SimError>,
{
    let d0 = rms(&scaled(y0, y0, opts));
    let d1 = rms(&scaled(f0, y0, opts));
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    }
    .min(opts.max_step);

    let mut y1 = [0.0; N];
    for i in 0..N {
        y1[i] = y0[i] + h0 * f0[i];
    }
    let f1 = rhs(t0 + h0, &y1)?;

    let mut df = [0.0; N];
    for i in 0..N {
        df[i] = f1[i] - f0[i];
    }
    let d2 = rms(&scaled(&df, y0, opts)) / h0;

    let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(-ERROR_EXPONENT)
    };

    Ok((100.0 * h0).min(h1))
}

type Stages<const N: usize> = [[f64; N]; STAGES + 1];

fn rk_step<const N: usize, F>(
    rhs: &mut F,
    t: f64,
    y: &[f64; N],
    f: &[f64; N],
    h: f64,
) -> Result<([f64; N], Stages<N>), SimError>
where
    F: FnMut(f64, &[f64; N]) -> Result<[f64; N], SimError>,
{
    let mut k = [[0.0; N]; STAGES + 1];
    k[0] = *f;

    for s in 1..STAGES {
        let mut ys = *y;
        for i in 0..N {
            let dy: f64 = (0..s).map(|j| A[s][j] * k[j][i]).sum();
            ys[i] += h * dy;
        }
        k[s] = rhs(t + C[s] * h, &ys)?;
    }

    let mut y_new = *y;
    for i in 0..N {
        let dy: f64 = (0..STAGES).map(|j| B[j] * k[j][i]).sum();
        y_new[i] += h * dy;
    }
    k[STAGES] = rhs(t + h, &y_new)?;

    Ok((y_new, k))
}

fn error_norm<const N: usize>(
    k: &Stages<N>,
    y: &[f64; N],
    y_new: &[f64; N],
    h: f64,
    opts: &Rk45Options,
) -> f64 {
    let mut ratio = [0.0; N];
    for i in 0..N {
        let err: f64 = h * (0..=STAGES).map(|j| E[j] * k[j][i]).sum::<f64>();
        let scale = opts.atol + y[i].abs().max(y_new[i].abs()) * opts.rtol;
        ratio[i] = err / scale;
    }
    rms(&ratio)
}

fn dense_output<const N: usize>(k: &Stages<N>, y: &[f64; N], h: f64, x: f64) -> [f64; N] {
    let powers = [x, x * x, x * x * x, x * x * x * x];
    let mut out = *y;
    for i in 0..N {
        let mut acc = 0.0;
        for (j, row) in P.iter().enumerate() {
            let weight: f64 = row.iter().zip(powers.iter()).map(|(p, xp)| p * xp).sum();
            acc += k[j][i] * weight;
        }
        out[i] += h * acc;
    }
    out
}
