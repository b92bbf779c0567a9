// src/stats.rs
//
// Numeric primitives backing the poll engine. Everything here is a total
// function over finite inputs and fully deterministic.

/// Arithmetic mean. Zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linear-interpolated quantile (numpy's default). `q` in `[0, 1]`.
/// Zero for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Shannon entropy (natural log) of a distribution. The input is normalized
/// to sum to one first, so raw counts and probabilities both work. Zero-mass
/// entries contribute nothing; an empty or zero-sum input has entropy zero.
pub fn shannon_entropy(dist: &[f64]) -> f64 {
    let total: f64 = dist.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    -dist
        .iter()
        .filter(|&&x| x > 0.0)
        .map(|&x| {
            let p = x / total;
            p * p.ln()
        })
        .sum::<f64>()
}

/// Biased sample skewness g1 = m3 / m2^(3/2). Zero when the variance is zero.
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mu = mean(values);
    let m2 = values.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / n;
    let m3 = values.iter().map(|x| (x - mu).powi(3)).sum::<f64>() / n;
    if m2 <= 0.0 {
        0.0
    } else {
        m3 / m2.powf(1.5)
    }
}

/// D'Agostino skewness significance test. Returns `(z, p)` where `p` is the
/// two-sided p-value against the null hypothesis that the sample was drawn
/// from a normal distribution. Requires at least 8 samples; the caller pads
/// shorter inputs.
pub fn skew_test(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 8 {
        return None;
    }
    let nf = n as f64;
    let b2 = skewness(values);
    let mut y = b2 * (((nf + 1.0) * (nf + 3.0)) / (6.0 * (nf - 2.0))).sqrt();
    let beta2 = 3.0 * (nf * nf + 27.0 * nf - 70.0) * (nf + 1.0) * (nf + 3.0)
        / ((nf - 2.0) * (nf + 5.0) * (nf + 7.0) * (nf + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    if y == 0.0 {
        y = 1.0;
    }
    let z = delta * (y / alpha + ((y / alpha).powi(2) + 1.0).sqrt()).ln();
    let p = 2.0 * normal_sf(z.abs());
    Some((z, p))
}

/// Standard normal survival function P(X > x).
pub fn normal_sf(x: f64) -> f64 {
    0.5 * erfc(x / std::f64::consts::SQRT_2)
}

// Rational Chebyshev approximation to the complementary error function;
// fractional error below 1.2e-7 everywhere.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let ans = t
        * (-z * z - 1.26551223
            + t * (1.00002368
                + t * (0.37409196
                    + t * (0.09678418
                        + t * (-0.18628806
                            + t * (0.27886807
                                + t * (-1.13520398
                                    + t * (1.48851587
                                        + t * (-0.82215223 + t * 0.17087277)))))))))
        .exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}
