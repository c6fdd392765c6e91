use rand::Rng;

use crate::bail;
use crate::error::Result;

// Scalar numeric helpers shared by the array engine and the layer
// initializers: approximate equality, non-negative modulo, the error
// function, and normal-distribution sampling via the inverse CDF.

const RTOL: f64 = 1e-2;
const ATOL: f64 = 1e-2;

/// Approximate equality: `|a - b| <= atol + rtol * |b|` with rtol = atol =
/// 1e-2. The second argument is the reference value.
pub fn isclose(a: f64, b: f64) -> bool {
    (a - b).abs() <= ATOL + RTOL * b.abs()
}

/// Modulo with a non-negative result: `modulo(-1, 3) == 2`.
///
/// # Panics
/// Panics when `d` is 0.
pub fn modulo(a: isize, d: usize) -> usize {
    assert!(d > 0, "modulo divisor must be positive");
    a.rem_euclid(d as isize) as usize
}

/// Draw from a normal distribution by pushing a uniform sample through the
/// inverse CDF (bisection to a fixed tolerance of 0.01).
pub fn sample_normal(mu: f64, sigma: f64) -> f64 {
    let r = rand::thread_rng().gen::<f64>();
    inverse_normal_cdf(r, mu, sigma, 0.01)
}

/// Inverse of [`normal_cdf`] by bisection over z in [-10, 10].
pub fn inverse_normal_cdf(p: f64, mu: f64, sigma: f64, tolerance: f64) -> f64 {
    if mu != 0.0 || sigma != 1.0 {
        return mu + sigma * inverse_normal_cdf(p, 0.0, 1.0, tolerance);
    }

    let mut low_z = -10.0f64;
    let mut hi_z = 10.0f64;
    loop {
        let mid_z = (low_z + hi_z) / 2.0;
        if hi_z - low_z <= tolerance {
            return mid_z;
        }
        let mid_p = normal_cdf(mid_z, 0.0, 1.0);
        if mid_p < p {
            low_z = mid_z;
        } else {
            hi_z = mid_z;
        }
    }
}

/// Cumulative distribution function of N(mu, sigma).
pub fn normal_cdf(x: f64, mu: f64, sigma: f64) -> f64 {
    (1.0 + erf((x - mu) / 2.0f64.sqrt() / sigma)) / 2.0
}

/// A uniform random integer in `[0, max)`.
pub fn random_int(max: usize) -> usize {
    rand::thread_rng().gen_range(0..max)
}

/// A uniformly random element of a slice.
///
/// # Panics
/// Panics on an empty slice.
pub fn random_choice<T>(items: &[T]) -> &T {
    &items[random_int(items.len())]
}

/// Sample an index according to a discrete probability distribution.
///
/// Fails when the probabilities do not accumulate to approximately 1, or
/// when the uniform draw lands past the final cumulative value.
pub fn random_int_weighted(probas: &[f64]) -> Result<usize> {
    let mut acc = Vec::with_capacity(probas.len());
    let mut total = 0.0;
    for &p in probas {
        total += p;
        acc.push(total);
    }
    if acc.is_empty() || !isclose(total, 1.0) {
        bail!("probabilities sum to {}, expected 1", total);
    }

    let r = rand::thread_rng().gen::<f64>();
    for (i, &threshold) in acc.iter().enumerate() {
        if r < threshold {
            return Ok(i);
        }
    }
    bail!("weighted draw {} fell outside the cumulative distribution", r)
}

// Error function, via rational approximations over three regimes.
// Coefficient tables from W. J. Cody's rational Chebyshev approximation.

/// The error function erf(x).
pub fn erf(x: f64) -> f64 {
    let y = x.abs();

    if y >= MAX_NUM {
        return x.signum();
    }
    if y <= THRESH {
        return x.signum() * erf1(y);
    }
    if y <= 4.0 {
        return x.signum() * (1.0 - erfc2(y));
    }
    x.signum() * (1.0 - erfc3(y))
}

fn erf1(y: f64) -> f64 {
    let ysq = y * y;
    let mut xnum = P[0][4] * ysq;
    let mut xden = ysq;

    for i in 0..3 {
        xnum = (xnum + P[0][i]) * ysq;
        xden = (xden + Q[0][i]) * ysq;
    }
    y * (xnum + P[0][3]) / (xden + Q[0][3])
}

fn erfc2(y: f64) -> f64 {
    let mut xnum = P[1][8] * y;
    let mut xden = y;

    for i in 0..7 {
        xnum = (xnum + P[1][i]) * y;
        xden = (xden + Q[1][i]) * y;
    }
    let result = (xnum + P[1][7]) / (xden + Q[1][7]);
    let ysq = (y * 16.0).floor() / 16.0;
    let del = (y - ysq) * (y + ysq);
    (-ysq * ysq).exp() * (-del).exp() * result
}

fn erfc3(y: f64) -> f64 {
    let mut ysq = 1.0 / (y * y);
    let mut xnum = P[2][5] * ysq;
    let mut xden = ysq;

    for i in 0..4 {
        xnum = (xnum + P[2][i]) * ysq;
        xden = (xden + Q[2][i]) * ysq;
    }
    let mut result = ysq * (xnum + P[2][4]) / (xden + Q[2][4]);
    result = (SQRPI - result) / y;
    ysq = (y * 16.0).floor() / 16.0;
    let del = (y - ysq) * (y + ysq);
    (-ysq * ysq).exp() * (-del).exp() * result
}

const THRESH: f64 = 0.46875;

const SQRPI: f64 = 5.6418958354775628695e-1;

const MAX_NUM: f64 = 9007199254740992.0; // 2^53

const P: [&[f64]; 3] = [
    &[
        3.16112374387056560e00,
        1.13864154151050156e02,
        3.77485237685302021e02,
        3.20937758913846947e03,
        1.85777706184603153e-1,
    ],
    &[
        5.64188496988670089e-1,
        8.88314979438837594e00,
        6.61191906371416295e01,
        2.98635138197400131e02,
        8.81952221241769090e02,
        1.71204761263407058e03,
        2.05107837782607147e03,
        1.23033935479799725e03,
        2.15311535474403846e-8,
    ],
    &[
        3.05326634961232344e-1,
        3.60344899949804439e-1,
        1.25781726111229246e-1,
        1.60837851487422766e-2,
        6.58749161529837803e-4,
        1.63153871373020978e-2,
    ],
];

const Q: [&[f64]; 3] = [
    &[
        2.36012909523441209e01,
        2.44024637934444173e02,
        1.28261652607737228e03,
        2.84423683343917062e03,
    ],
    &[
        1.57449261107098347e01,
        1.17693950891312499e02,
        5.37181101862009858e02,
        1.62138957456669019e03,
        3.29079923573345963e03,
        4.36261909014324716e03,
        3.43936767414372164e03,
        1.23033935480374942e03,
    ],
    &[
        2.56852019228982242e00,
        1.87295284992346047e00,
        5.27905102951428412e-1,
        6.05183413124413191e-2,
        2.33520497626869185e-3,
    ],
];
